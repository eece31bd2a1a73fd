// ============================================================================
// STROKES & PATH SMOOTHING
// ============================================================================
//
// Raw touch samples arrive as `StrokePoint`s. `PathSmoother` turns them into
// a `Path` of line / quadratic segments ready for `Compositor::render_stroke`.

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{CoreError, Result};
use crate::geometry::{Point, perpendicular_distance, point_bounds};
use crate::log_warn;

// ============================================================================
// STROKE SAMPLES
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StrokePoint {
    pub x: f32,
    pub y: f32,
    /// 0.0 – 1.0
    pub pressure: f32,
    pub timestamp_ms: u64,
}

impl StrokePoint {
    pub fn new(x: f32, y: f32, pressure: f32, timestamp_ms: u64) -> Self {
        Self { x, y, pressure, timestamp_ms }
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    fn node(&self) -> PathNode {
        PathNode { point: self.position(), pressure: self.pressure }
    }
}

/// Accumulates samples for one stroke; timestamps must not go backwards.
#[derive(Clone, Debug, Default)]
pub struct StrokeBuilder {
    points: Vec<StrokePoint>,
}

impl StrokeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample. Pressure is clamped to [0, 1].
    pub fn push(&mut self, point: StrokePoint) -> Result<()> {
        if !point.x.is_finite() || !point.y.is_finite() || !point.pressure.is_finite() {
            return Err(CoreError::arg("stroke sample has non-finite coordinates"));
        }
        if let Some(last) = self.points.last()
            && point.timestamp_ms < last.timestamp_ms
        {
            return Err(CoreError::arg(format!(
                "stroke timestamp {} precedes previous sample {}",
                point.timestamp_ms, last.timestamp_ms
            )));
        }
        self.points.push(StrokePoint { pressure: point.pressure.clamp(0.0, 1.0), ..point });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn finish(self) -> Stroke {
        Stroke { points: self.points }
    }
}

/// A finished, immutable stroke. Deserialized strokes pass through
/// `StrokeBuilder`, so loaded samples obey the same ordering rules.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StrokeSamples")]
pub struct Stroke {
    points: Vec<StrokePoint>,
}

#[derive(Deserialize)]
struct StrokeSamples {
    points: Vec<StrokePoint>,
}

impl TryFrom<StrokeSamples> for Stroke {
    type Error = CoreError;

    fn try_from(raw: StrokeSamples) -> Result<Self> {
        let mut builder = StrokeBuilder::new();
        for point in raw.points {
            if let Err(e) = builder.push(point) {
                log_warn!("Rejected stored stroke: {}", e);
                return Err(e);
            }
        }
        Ok(builder.finish())
    }
}

impl Stroke {
    pub fn points(&self) -> &[StrokePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Polyline length in pixels.
    pub fn length(&self) -> f32 {
        self.points.windows(2).map(|w| w[0].position().distance(w[1].position())).sum()
    }

    pub fn duration_ms(&self) -> u64 {
        match (self.points.first(), self.points.last()) {
            (Some(a), Some(b)) => b.timestamp_ms.saturating_sub(a.timestamp_ms),
            _ => 0,
        }
    }
}

// ============================================================================
// PATH
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PathNode {
    pub point: Point,
    pub pressure: f32,
}

impl PathNode {
    fn lerp(&self, other: &PathNode, t: f32) -> PathNode {
        PathNode {
            point: self.point.lerp(other.point, t),
            pressure: self.pressure + (other.pressure - self.pressure) * t,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Segment {
    Line { from: PathNode, to: PathNode },
    Quad { from: PathNode, ctrl: PathNode, to: PathNode },
}

impl Segment {
    pub fn start(&self) -> PathNode {
        match self {
            Segment::Line { from, .. } | Segment::Quad { from, .. } => *from,
        }
    }

    pub fn end(&self) -> PathNode {
        match self {
            Segment::Line { to, .. } | Segment::Quad { to, .. } => *to,
        }
    }

    /// Node at parameter `t` in [0, 1].
    pub fn eval(&self, t: f32) -> PathNode {
        match self {
            Segment::Line { from, to } => from.lerp(to, t),
            Segment::Quad { from, ctrl, to } => {
                let a = from.lerp(ctrl, t);
                let b = ctrl.lerp(to, t);
                a.lerp(&b, t)
            }
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Path {
    segments: Vec<Segment>,
}

impl Path {
    pub fn new(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Sample every segment at `steps` subdivisions (quads) or endpoints (lines).
    /// Shared endpoints appear once.
    pub fn flatten(&self, steps: usize) -> Vec<PathNode> {
        let steps = steps.max(1);
        let mut out: Vec<PathNode> = Vec::new();
        for seg in &self.segments {
            if out.is_empty() {
                out.push(seg.start());
            }
            match seg {
                Segment::Line { to, .. } => out.push(*to),
                Segment::Quad { .. } => {
                    for i in 1..=steps {
                        out.push(seg.eval(i as f32 / steps as f32));
                    }
                }
            }
        }
        out
    }

    /// (min, max) of all segment endpoints and control points.
    pub fn bounds(&self) -> Option<(Point, Point)> {
        let pts: Vec<Point> = self
            .segments
            .iter()
            .flat_map(|s| match s {
                Segment::Line { from, to } => vec![from.point, to.point],
                Segment::Quad { from, ctrl, to } => vec![from.point, ctrl.point, to.point],
            })
            .collect();
        point_bounds(&pts)
    }
}

// ============================================================================
// TOOL PROFILES
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolKind {
    Pen,
    Pencil,
    Brush,
    Marker,
    Airbrush,
}

/// Per-tool smoothing and stamping settings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolProfile {
    /// 0 disables smoothing; ≥ 0.3 selects Catmull-Rom with this tension.
    pub smoothing: f32,
    /// Douglas-Peucker tolerance in pixels; 0 keeps every sample.
    pub simplify_epsilon: f32,
    /// Nominal brush diameter in pixels.
    pub size: f32,
    /// Dab spacing as a fraction of `size`.
    pub spacing: f32,
}

impl Default for ToolProfile {
    fn default() -> Self {
        ToolKind::Brush.profile()
    }
}

impl ToolKind {
    pub fn all() -> &'static [ToolKind] {
        &[ToolKind::Pen, ToolKind::Pencil, ToolKind::Brush, ToolKind::Marker, ToolKind::Airbrush]
    }

    pub fn profile(&self) -> ToolProfile {
        match self {
            ToolKind::Pen => ToolProfile { smoothing: 0.5, simplify_epsilon: 0.5, size: 3.0, spacing: 0.1 },
            ToolKind::Pencil => ToolProfile { smoothing: 0.0, simplify_epsilon: 0.0, size: 1.0, spacing: 0.1 },
            ToolKind::Brush => ToolProfile { smoothing: 0.35, simplify_epsilon: 1.0, size: 12.0, spacing: 0.15 },
            ToolKind::Marker => ToolProfile { smoothing: 0.2, simplify_epsilon: 1.0, size: 8.0, spacing: 0.2 },
            ToolKind::Airbrush => ToolProfile { smoothing: 0.6, simplify_epsilon: 2.0, size: 30.0, spacing: 0.05 },
        }
    }
}

// ============================================================================
// SMOOTHER
// ============================================================================

const QUAD_SMOOTHING_MIN: f32 = 0.1;
const CATMULL_ROM_MIN: f32 = 0.3;

#[derive(Clone, Debug)]
pub struct PathSmoother {
    catmull_rom_steps: usize,
}

impl Default for PathSmoother {
    fn default() -> Self {
        Self { catmull_rom_steps: EngineConfig::default().catmull_rom_steps }
    }
}

impl PathSmoother {
    pub fn new(config: &EngineConfig) -> Self {
        Self { catmull_rom_steps: config.catmull_rom_steps.max(1) }
    }

    /// Fit a path through the samples according to the profile's smoothing.
    pub fn smooth(&self, points: &[StrokePoint], profile: &ToolProfile) -> Path {
        let nodes: Vec<PathNode> = points.iter().map(StrokePoint::node).collect();
        match nodes.len() {
            0 => return Path::default(),
            1 => return Path::new(vec![Segment::Line { from: nodes[0], to: nodes[0] }]),
            2 => return polyline(&nodes),
            _ => {}
        }

        if profile.smoothing < QUAD_SMOOTHING_MIN {
            polyline(&nodes)
        } else if profile.smoothing < CATMULL_ROM_MIN {
            quad_midpoints(&nodes)
        } else {
            catmull_rom(&nodes, profile.smoothing.clamp(0.0, 1.0), self.catmull_rom_steps)
        }
    }

    /// Simplify with the profile's epsilon, then smooth.
    pub fn process(&self, points: &[StrokePoint], profile: &ToolProfile) -> Path {
        if profile.simplify_epsilon > 0.0 {
            self.smooth(&Self::optimize(points, profile.simplify_epsilon), profile)
        } else {
            self.smooth(points, profile)
        }
    }

    /// Douglas-Peucker simplification. Endpoints always survive; an interior
    /// point survives when it deviates by more than `epsilon`.
    pub fn optimize(points: &[StrokePoint], epsilon: f32) -> Vec<StrokePoint> {
        if points.len() < 3 {
            return points.to_vec();
        }
        let mut keep = vec![false; points.len()];
        keep[0] = true;
        keep[points.len() - 1] = true;

        let mut stack = vec![(0usize, points.len() - 1)];
        while let Some((start, end)) = stack.pop() {
            if end <= start + 1 {
                continue;
            }
            let a = points[start].position();
            let b = points[end].position();
            let mut max_d = -1.0f32;
            let mut max_i = start;
            for (i, p) in points.iter().enumerate().take(end).skip(start + 1) {
                let d = perpendicular_distance(p.position(), a, b);
                if d > max_d {
                    max_d = d;
                    max_i = i;
                }
            }
            if max_d > epsilon {
                keep[max_i] = true;
                stack.push((start, max_i));
                stack.push((max_i, end));
            }
        }

        points.iter().zip(&keep).filter(|(_, k)| **k).map(|(p, _)| *p).collect()
    }
}

fn polyline(nodes: &[PathNode]) -> Path {
    Path::new(nodes.windows(2).map(|w| Segment::Line { from: w[0], to: w[1] }).collect())
}

/// Each interior sample becomes the control point of a quad that ends at the
/// midpoint between it and the next sample.
fn quad_midpoints(nodes: &[PathNode]) -> Path {
    let n = nodes.len();
    let mut segments = Vec::with_capacity(n);
    let mut current = nodes[0];
    for i in 1..n - 1 {
        let end = nodes[i].lerp(&nodes[i + 1], 0.5);
        segments.push(Segment::Quad { from: current, ctrl: nodes[i], to: end });
        current = end;
    }
    segments.push(Segment::Line { from: current, to: nodes[n - 1] });
    Path::new(segments)
}

/// Catmull-Rom through every sample with the endpoints duplicated as phantom
/// neighbours. `alpha` is the knot exponent (0 uniform, 0.5 centripetal, 1 chordal).
fn catmull_rom(nodes: &[PathNode], alpha: f32, steps: usize) -> Path {
    let mut padded = Vec::with_capacity(nodes.len() + 2);
    padded.push(nodes[0]);
    padded.extend_from_slice(nodes);
    padded.push(nodes[nodes.len() - 1]);

    let mut samples: Vec<PathNode> = Vec::with_capacity(nodes.len() * steps + 1);
    for w in padded.windows(4) {
        for j in 0..steps {
            samples.push(catmull_rom_point(&w[0], &w[1], &w[2], &w[3], alpha, j as f32 / steps as f32));
        }
    }
    samples.push(nodes[nodes.len() - 1]);
    polyline(&samples)
}

/// Barry-Goldman evaluation of the segment between `p1` and `p2` at `u` in [0, 1).
fn catmull_rom_point(p0: &PathNode, p1: &PathNode, p2: &PathNode, p3: &PathNode, alpha: f32, u: f32) -> PathNode {
    const EPS: f32 = 1e-4;
    let knot = |a: &PathNode, b: &PathNode| a.point.distance(b.point).powf(alpha);

    let t0 = 0.0f32;
    let t1 = t0 + knot(p0, p1);
    let t2 = t1 + knot(p1, p2);
    let t3 = t2 + knot(p2, p3);

    let pressure = p1.pressure + (p2.pressure - p1.pressure) * u;
    if t2 - t1 < EPS {
        return PathNode { point: p1.point, pressure };
    }
    let t = t1 + (t2 - t1) * u;

    let mix = |a: Point, b: Point, ta: f32, tb: f32| -> Point {
        if tb - ta < EPS {
            return b;
        }
        let wa = (tb - t) / (tb - ta);
        let wb = (t - ta) / (tb - ta);
        Point::new(a.x * wa + b.x * wb, a.y * wa + b.y * wb)
    };

    let a1 = if t1 - t0 < EPS { p1.point } else { mix(p0.point, p1.point, t0, t1) };
    let a2 = mix(p1.point, p2.point, t1, t2);
    let a3 = if t3 - t2 < EPS { p2.point } else { mix(p2.point, p3.point, t2, t3) };
    let b1 = mix(a1, a2, t0, t2);
    let b2 = mix(a2, a3, t1, t3);
    let c = mix(b1, b2, t1, t2);

    PathNode { point: c, pressure }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts(coords: &[(f32, f32)]) -> Vec<StrokePoint> {
        coords.iter().enumerate().map(|(i, &(x, y))| StrokePoint::new(x, y, 0.5, i as u64)).collect()
    }

    #[test]
    fn builder_rejects_time_travel() {
        let mut b = StrokeBuilder::new();
        b.push(StrokePoint::new(0.0, 0.0, 1.0, 10)).unwrap();
        assert!(b.push(StrokePoint::new(1.0, 0.0, 1.0, 5)).is_err());
        b.push(StrokePoint::new(3.0, 4.0, 2.0, 20)).unwrap();
        let s = b.finish();
        assert_eq!(s.len(), 2);
        assert_eq!(s.points()[1].pressure, 1.0);
        assert_eq!(s.length(), 5.0);
        assert_eq!(s.duration_ms(), 10);
    }

    #[test]
    fn stored_stroke_with_reversed_timestamps_is_rejected() {
        let reversed = Stroke { points: vec![StrokePoint::new(0.0, 0.0, 0.5, 100), StrokePoint::new(4.0, 0.0, 0.5, 50)] };
        assert_eq!(reversed.duration_ms(), 0);

        let bytes = bincode::serialize(&reversed).unwrap();
        assert!(bincode::deserialize::<Stroke>(&bytes).is_err());

        let ordered = Stroke { points: pts(&[(0.0, 0.0), (3.0, 4.0)]) };
        let bytes = bincode::serialize(&ordered).unwrap();
        assert_eq!(bincode::deserialize::<Stroke>(&bytes).unwrap(), ordered);
    }

    #[test]
    fn quad_mode_ends_on_last_sample() {
        let profile = ToolProfile { smoothing: 0.2, ..ToolProfile::default() };
        let path = PathSmoother::default().smooth(&pts(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (20.0, 10.0)]), &profile);
        assert!(matches!(path.segments()[0], Segment::Quad { .. }));
        let last = path.segments().last().unwrap().end();
        assert_eq!(last.point, Point::new(20.0, 10.0));
    }

    #[test]
    fn catmull_rom_passes_through_samples() {
        let input = pts(&[(0.0, 0.0), (10.0, 5.0), (20.0, 0.0), (30.0, 5.0)]);
        let profile = ToolProfile { smoothing: 0.5, ..ToolProfile::default() };
        let path = PathSmoother::default().smooth(&input, &profile);
        assert_eq!(path.len(), 3 * 10);
        let nodes = path.flatten(1);
        for p in &input {
            assert!(nodes.iter().any(|n| n.point.distance(p.position()) < 1e-3));
        }
    }

    #[test]
    fn optimize_drops_collinear_points() {
        let input = pts(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0), (3.0, 0.0)]);
        let out = PathSmoother::optimize(&input, 0.1);
        assert_eq!(out.len(), 2);
    }
}
