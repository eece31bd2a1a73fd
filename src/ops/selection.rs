// ============================================================================
// SELECTION: flood select, contour tracing, refinement and set operations
// ============================================================================
//
// A selection carries both its boundary (closed contours, outer or hole) and
// a binary coverage mask of canvas size. Raster refinements (grow, shrink,
// invert, combine) work on the mask and re-trace the boundary; geometric ones
// (smooth, transform) move contour vertices and re-rasterize.
// ============================================================================

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::geometry::{Affine, Point};
use crate::log_debug;
use crate::ops::filters::blur_channels;
use crate::pixels::{Mask, PixelBuffer, Rect};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SelectionMode {
    /// Discard any existing selection, then use the new shape.
    #[default]
    New,
    /// Union with the existing selection.
    Add,
    /// Remove the new shape from the existing selection.
    Subtract,
    /// Keep only what both selections cover.
    Intersect,
}

impl SelectionMode {
    pub fn all() -> &'static [SelectionMode] {
        &[SelectionMode::New, SelectionMode::Add, SelectionMode::Subtract, SelectionMode::Intersect]
    }

    pub fn name(&self) -> &'static str {
        match self {
            SelectionMode::New => "New",
            SelectionMode::Add => "Add",
            SelectionMode::Subtract => "Subtract",
            SelectionMode::Intersect => "Intersect",
        }
    }
}

/// One closed boundary. Vertices are pixel coordinates; a hole contour runs
/// over the pixels of an enclosed unselected region.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Contour {
    pub points: Vec<Point>,
    pub hole: bool,
}

/// Coverage value treated as "inside".
const INSIDE: u8 = 128;

// ============================================================================
// SELECTION
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct Selection {
    contours: Vec<Contour>,
    mask: Mask,
    bounds: Rect,
    feather: f32,
    anti_alias: bool,
    transform: Affine,
    mode: SelectionMode,
}

impl Selection {
    /// Nothing selected on a `width × height` canvas.
    pub fn empty(width: u32, height: u32) -> Self {
        Self::from_mask(Mask::new(width, height))
    }

    /// Selection covering every mask pixel >= 128.
    pub fn from_mask(mask: Mask) -> Self {
        let mut mask = mask;
        for v in mask.as_raw_mut() {
            *v = if *v >= INSIDE { 255 } else { 0 };
        }
        let contours = trace_contours(&mask);
        let bounds = mask.bounds().unwrap_or_default();
        Self {
            contours,
            mask,
            bounds,
            feather: 0.0,
            anti_alias: false,
            transform: Affine::IDENTITY,
            mode: SelectionMode::New,
        }
    }

    /// Rebuild coverage from contours (after moving vertices).
    fn from_contours(&self, contours: Vec<Contour>, transform: Affine) -> Self {
        let mask = rasterize_contours(&contours, self.mask.width(), self.mask.height());
        let bounds = mask.bounds().unwrap_or_default();
        Self { contours, mask, bounds, transform, ..self.clone() }
    }

    /// Keep feather/anti-alias/transform settings while swapping the coverage.
    fn with_coverage(&self, mask: Mask) -> Self {
        let fresh = Self::from_mask(mask);
        Self { feather: self.feather, anti_alias: self.anti_alias, transform: self.transform, mode: self.mode, ..fresh }
    }

    pub fn rectangle(width: u32, height: u32, rect: Rect) -> Self {
        let mut mask = Mask::new(width, height);
        let clipped = rect.intersect(&Rect::new(0, 0, width, height));
        for y in clipped.y..clipped.bottom() {
            for x in clipped.x..clipped.right() {
                mask.set(x, y, 255);
            }
        }
        Self::from_mask(mask)
    }

    /// Pixels whose centre lies inside the ellipse.
    pub fn ellipse(width: u32, height: u32, center: Point, rx: f32, ry: f32) -> Self {
        let mut mask = Mask::new(width, height);
        if rx > 0.0 && ry > 0.0 {
            for y in 0..height {
                for x in 0..width {
                    let dx = (x as f32 + 0.5 - center.x) / rx;
                    let dy = (y as f32 + 0.5 - center.y) / ry;
                    if dx * dx + dy * dy <= 1.0 {
                        mask.set(x, y, 255);
                    }
                }
            }
        }
        Self::from_mask(mask)
    }

    /// Lasso: scanline fill of a free-form polygon sampled at pixel centres.
    pub fn from_polygon(width: u32, height: u32, points: &[Point]) -> Self {
        let mut mask = Mask::new(width, height);
        let n = points.len();
        if n >= 3 {
            for y in 0..height {
                let yf = y as f32 + 0.5;
                let mut nodes = edge_crossings(points, yf);
                nodes.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                for pair in nodes.chunks_exact(2) {
                    let x_start = (pair[0] - 0.5).ceil().max(0.0) as u32;
                    let x_end = ((pair[1] - 0.5).floor() + 1.0).clamp(0.0, width as f32) as u32;
                    for x in x_start..x_end {
                        mask.set(x, y, 255);
                    }
                }
            }
        }
        Self::from_mask(mask)
    }

    // ---- accessors ----------------------------------------------------------

    pub fn contours(&self) -> &[Contour] {
        &self.contours
    }

    /// Binary coverage, 0 or 255.
    pub fn mask(&self) -> &Mask {
        &self.mask
    }

    /// Tight bounds of the covered pixels; empty when nothing is selected.
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn feather_radius(&self) -> f32 {
        self.feather
    }

    pub fn anti_alias(&self) -> bool {
        self.anti_alias
    }

    pub fn transform(&self) -> &Affine {
        &self.transform
    }

    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    pub fn width(&self) -> u32 {
        self.mask.width()
    }

    pub fn height(&self) -> u32 {
        self.mask.height()
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        self.mask.get(x, y) >= INSIDE
    }

    pub fn with_anti_alias(mut self, anti_alias: bool) -> Self {
        self.anti_alias = anti_alias;
        self
    }

    /// Soft coverage for compositing: feathered when a radius is stored,
    /// lightly smoothed when anti-aliasing is on, binary otherwise.
    pub fn alpha_mask(&self) -> Mask {
        if self.feather > 0.0 {
            smooth_mask(&self.mask, self.feather / 2.0).alpha
        } else if self.anti_alias {
            smooth_mask(&self.mask, 0.5).alpha
        } else {
            self.mask.clone()
        }
    }

    // ---- refinement ---------------------------------------------------------

    /// Store a soft-edge radius. Coverage is unchanged until `alpha_mask`.
    pub fn feather(&self, radius: f32) -> Result<Selection> {
        if !radius.is_finite() || radius < 0.0 {
            return Err(CoreError::arg(format!("feather radius {} must be >= 0", radius)));
        }
        Ok(Selection { feather: radius, ..self.clone() })
    }

    /// Grow the boundary outward by `px` pixels (round joins).
    pub fn expand(&self, px: u32) -> Selection {
        if px == 0 {
            return self.clone();
        }
        self.with_coverage(morph(&self.mask, px, Morph::Dilate))
    }

    /// Pull the boundary inward by `px` pixels.
    pub fn contract(&self, px: u32) -> Selection {
        if px == 0 {
            return self.clone();
        }
        self.with_coverage(morph(&self.mask, px, Morph::Erode))
    }

    /// One [1, 2, 1] / 4 low-pass pass over every closed contour.
    pub fn smooth(&self) -> Selection {
        let contours = self
            .contours
            .iter()
            .map(|c| {
                let n = c.points.len();
                if n < 3 {
                    return c.clone();
                }
                let points = (0..n)
                    .map(|i| {
                        let prev = c.points[(i + n - 1) % n];
                        let cur = c.points[i];
                        let next = c.points[(i + 1) % n];
                        Point::new(
                            (prev.x + 2.0 * cur.x + next.x) / 4.0,
                            (prev.y + 2.0 * cur.y + next.y) / 4.0,
                        )
                    })
                    .collect();
                Contour { points, hole: c.hole }
            })
            .collect();
        self.from_contours(contours, self.transform)
    }

    /// Complement within `canvas_bounds`; nothing outside it is selected.
    pub fn invert(&self, canvas_bounds: Rect) -> Selection {
        let mut mask = self.mask.clone();
        let (w, h) = mask.dimensions();
        for y in 0..h {
            for x in 0..w {
                let v = if canvas_bounds.contains(x, y) { 255 - self.mask.get(x, y) } else { 0 };
                mask.set(x, y, v);
            }
        }
        self.with_coverage(mask)
    }

    /// Map every contour vertex through `affine` and re-rasterize.
    pub fn transformed(&self, affine: &Affine) -> Result<Selection> {
        let mut contours = Vec::with_capacity(self.contours.len());
        for c in &self.contours {
            let points = c
                .points
                .iter()
                .map(|&p| affine.apply(p))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| CoreError::arg("transform maps a selection vertex to infinity"))?;
            contours.push(Contour { points, hole: c.hole });
        }
        Ok(self.from_contours(contours, affine.after(&self.transform)))
    }

    /// Set operation with another selection of the same canvas size.
    pub fn combine(&self, other: &Selection, mode: SelectionMode) -> Result<Selection> {
        if self.mask.dimensions() != other.mask.dimensions() {
            return Err(CoreError::arg(format!(
                "cannot combine {:?} selection with {:?} selection",
                self.mask.dimensions(),
                other.mask.dimensions()
            )));
        }
        let mask = match mode {
            SelectionMode::New => return Ok(Selection { mode, ..other.clone() }),
            SelectionMode::Add => self.mask.zip_with(&other.mask, u8::max),
            SelectionMode::Subtract => self.mask.zip_with(&other.mask, u8::saturating_sub),
            SelectionMode::Intersect => self.mask.zip_with(&other.mask, u8::min),
        };
        let mut out = self.with_coverage(mask);
        out.mode = mode;
        Ok(out)
    }
}

// ============================================================================
// FLOOD SELECT
// ============================================================================

/// Every channel, alpha included, within `tol` of the target. Two fully
/// transparent pixels always match.
#[inline(always)]
fn matches(p: [u8; 4], tc: [u8; 4], tol: u8) -> bool {
    if tc[3] == 0 && p[3] == 0 {
        return true;
    }
    (0..4).all(|c| p[c].abs_diff(tc[c]) <= tol)
}

#[inline(always)]
fn pix(flat: &[u8], idx: usize) -> [u8; 4] {
    let o = idx * 4;
    [flat[o], flat[o + 1], flat[o + 2], flat[o + 3]]
}

/// Magic wand. Contiguous mode grows a 4-connected region from the seed;
/// global mode takes every matching pixel. An out-of-bounds seed yields an
/// empty selection.
pub fn flood_select(buffer: &PixelBuffer, seed: (i64, i64), tolerance: u8, contiguous: bool) -> Selection {
    let (w, h) = buffer.dimensions();
    let (sx, sy) = seed;
    if sx < 0 || sy < 0 || sx >= w as i64 || sy >= h as i64 {
        log_debug!("flood select seed ({}, {}) outside {}×{}", sx, sy, w, h);
        return Selection::empty(w, h);
    }

    let wu = w as usize;
    let hu = h as usize;
    let flat = buffer.as_raw();
    let seed_idx = sy as usize * wu + sx as usize;
    let tc = pix(flat, seed_idx);
    let mut data = vec![0u8; wu * hu];

    if contiguous {
        // mask doubles as the visited set
        let mut stack: Vec<usize> = Vec::with_capacity(4096);
        data[seed_idx] = 255;
        stack.push(seed_idx);
        while let Some(idx) = stack.pop() {
            let x = idx % wu;
            let y = idx / wu;
            let mut visit = |ni: usize| {
                if data[ni] == 0 && matches(pix(flat, ni), tc, tolerance) {
                    data[ni] = 255;
                    stack.push(ni);
                }
            };
            if x > 0 {
                visit(idx - 1);
            }
            if x + 1 < wu {
                visit(idx + 1);
            }
            if y > 0 {
                visit(idx - wu);
            }
            if y + 1 < hu {
                visit(idx + wu);
            }
        }
    } else {
        data.par_chunks_mut(wu).enumerate().for_each(|(y, row)| {
            for (x, v) in row.iter_mut().enumerate() {
                if matches(pix(flat, y * wu + x), tc, tolerance) {
                    *v = 255;
                }
            }
        });
    }

    match Mask::from_raw(w, h, data) {
        Ok(mask) => Selection::from_mask(mask),
        Err(_) => Selection::empty(w, h),
    }
}

// ============================================================================
// CONTOUR TRACING
// ============================================================================

/// Moore neighbourhood, clockwise from west (y grows downward).
const NEIGHBORS: [(i64, i64); 8] = [(-1, 0), (-1, -1), (0, -1), (1, -1), (1, 0), (1, 1), (0, 1), (-1, 1)];

/// Follow the boundary of the region containing `start`, which must be the
/// region's first pixel in row-major order. Stops when the walk leaves the
/// start pixel the same way it first did.
fn moore_trace(start: (i64, i64), inside: impl Fn(i64, i64) -> bool, max_steps: usize) -> Vec<Point> {
    let to_point = |p: (i64, i64)| Point::new(p.0 as f32, p.1 as f32);
    let mut points = Vec::new();
    let mut current = start;
    // West of a row-major first pixel is outside.
    let mut back = 0usize;
    let mut first_move = None;

    for _ in 0..max_steps {
        let next = (1..=8).map(|k| (back + k) % 8).find_map(|d| {
            let n = (current.0 + NEIGHBORS[d].0, current.1 + NEIGHBORS[d].1);
            inside(n.0, n.1).then_some((d, n))
        });
        let Some((dir, next)) = next else {
            return vec![to_point(start)];
        };
        if current == start {
            match first_move {
                Some(m) if m == next => break,
                Some(_) => {}
                None => first_move = Some(next),
            }
        }
        points.push(to_point(current));

        // New backtrack: the ring cell examined just before `next`.
        let prev = NEIGHBORS[(dir + 7) % 8];
        let rel = (current.0 + prev.0 - next.0, current.1 + prev.1 - next.1);
        back = NEIGHBORS.iter().position(|&o| o == rel).unwrap_or(0);
        current = next;
    }
    points
}

/// Flood-label components. `connect8` picks 8- over 4-connectivity.
/// Returns (labels, per-label (first pixel, size, touches border)), label 0 = none.
fn label_components(
    member: &[bool],
    w: usize,
    h: usize,
    connect8: bool,
) -> (Vec<u32>, Vec<(usize, usize, bool)>) {
    let mut labels = vec![0u32; w * h];
    let mut info = vec![(0usize, 0usize, false)];
    let mut stack = Vec::new();
    for start in 0..w * h {
        if !member[start] || labels[start] != 0 {
            continue;
        }
        let label = info.len() as u32;
        let mut size = 0usize;
        let mut border = false;
        labels[start] = label;
        stack.push(start);
        while let Some(idx) = stack.pop() {
            size += 1;
            let (x, y) = ((idx % w) as i64, (idx / w) as i64);
            if x == 0 || y == 0 || x == w as i64 - 1 || y == h as i64 - 1 {
                border = true;
            }
            for (k, &(dx, dy)) in NEIGHBORS.iter().enumerate() {
                if !connect8 && k % 2 == 1 {
                    continue;
                }
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                    continue;
                }
                let ni = ny as usize * w + nx as usize;
                if member[ni] && labels[ni] == 0 {
                    labels[ni] = label;
                    stack.push(ni);
                }
            }
        }
        info.push((start, size, border));
    }
    (labels, info)
}

/// Closed boundaries of every selected region (8-connected) plus a hole
/// contour for every unselected region (4-connected) not touching the canvas
/// edge. Ordered by start pixel in row-major order.
pub fn trace_contours(mask: &Mask) -> Vec<Contour> {
    let (w, h) = (mask.width() as usize, mask.height() as usize);
    if w == 0 || h == 0 {
        return Vec::new();
    }
    let inside: Vec<bool> = mask.as_raw().iter().map(|&v| v >= INSIDE).collect();
    let outside: Vec<bool> = inside.iter().map(|&v| !v).collect();

    let (fg_labels, fg_info) = label_components(&inside, w, h, true);
    let (bg_labels, bg_info) = label_components(&outside, w, h, false);

    let mut found: Vec<(usize, Contour)> = Vec::new();
    let mut trace = |labels: &[u32], label: u32, start: usize, size: usize, hole: bool| {
        let member = |x: i64, y: i64| {
            x >= 0 && y >= 0 && x < w as i64 && y < h as i64 && labels[y as usize * w + x as usize] == label
        };
        let points = moore_trace(((start % w) as i64, (start / w) as i64), member, 8 * size + 8);
        found.push((start, Contour { points, hole }));
    };

    for (label, &(start, size, _)) in fg_info.iter().enumerate().skip(1) {
        trace(&fg_labels, label as u32, start, size, false);
    }
    for (label, &(start, size, border)) in bg_info.iter().enumerate().skip(1) {
        if !border {
            trace(&bg_labels, label as u32, start, size, true);
        }
    }

    found.sort_by_key(|(start, _)| *start);
    found.into_iter().map(|(_, c)| c).collect()
}

// ============================================================================
// RASTERIZATION
// ============================================================================

/// x positions where the polygon's edges cross the horizontal line `yf`
/// (half-open in y so shared vertices count once).
fn edge_crossings(points: &[Point], yf: f32) -> Vec<f32> {
    let n = points.len();
    let mut nodes = Vec::new();
    for i in 0..n {
        let a = points[i];
        let b = points[(i + 1) % n];
        if (a.y <= yf && b.y > yf) || (b.y <= yf && a.y > yf) {
            let t = (yf - a.y) / (b.y - a.y);
            nodes.push(a.x + t * (b.x - a.x));
        }
    }
    nodes
}

/// Paint the polygon through pixel centres, its edges included, with `value`.
fn fill_contour(mask: &mut Mask, points: &[Point], value: u8) {
    let (w, h) = mask.dimensions();
    let Some((min, max)) = crate::geometry::point_bounds(points) else {
        return;
    };

    // Interior
    let y0 = min.y.ceil().max(0.0) as u32;
    let y1 = (max.y.floor().min(h as f32 - 1.0)).max(-1.0);
    if y1 >= 0.0 {
        for y in y0..=y1 as u32 {
            let mut nodes = edge_crossings(points, y as f32);
            nodes.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            for pair in nodes.chunks_exact(2) {
                let xs = pair[0].ceil().max(0.0);
                let xe = pair[1].floor().min(w as f32 - 1.0);
                if xe < xs {
                    continue;
                }
                for x in xs as u32..=xe as u32 {
                    mask.set(x, y, value);
                }
            }
        }
    }

    // Edges
    let n = points.len();
    for i in 0..n {
        let a = points[i];
        let b = points[(i + 1) % n];
        let steps = (b.x - a.x).abs().max((b.y - a.y).abs()).ceil().max(1.0) as u32;
        for s in 0..=steps {
            let p = a.lerp(b, s as f32 / steps as f32);
            let (px, py) = (p.x.round(), p.y.round());
            if px >= 0.0 && py >= 0.0 && px < w as f32 && py < h as f32 {
                mask.set(px as u32, py as u32, value);
            }
        }
    }
}

/// Outer contours paint 255, holes paint 0, in order.
fn rasterize_contours(contours: &[Contour], width: u32, height: u32) -> Mask {
    let mut mask = Mask::new(width, height);
    for contour in contours {
        fill_contour(&mut mask, &contour.points, if contour.hole { 0 } else { 255 });
    }
    mask
}

// ============================================================================
// MASK FILTERS
// ============================================================================

#[derive(Clone, Copy, PartialEq, Eq)]
enum Morph {
    Dilate,
    Erode,
}

/// Disc-shaped dilation or erosion; edges are clamped.
fn morph(mask: &Mask, radius: u32, op: Morph) -> Mask {
    let (w, h) = (mask.width() as usize, mask.height() as usize);
    if w == 0 || h == 0 {
        return mask.clone();
    }
    let data = mask.as_raw();
    let r = radius as i64;
    let mut out = mask.clone();
    out.as_raw_mut().par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        for (x, slot) in row.iter_mut().enumerate() {
            let selected = data[y * w + x] >= INSIDE;
            // Only boundary changes: dilation grows unselected pixels, erosion
            // shrinks selected ones.
            if selected == (op == Morph::Dilate) {
                continue;
            }
            let mut hit = false;
            'scan: for dy in -r..=r {
                for dx in -r..=r {
                    if dx * dx + dy * dy > r * r {
                        continue;
                    }
                    let sx = (x as i64 + dx).clamp(0, w as i64 - 1) as usize;
                    let sy = (y as i64 + dy).clamp(0, h as i64 - 1) as usize;
                    let other = data[sy * w + sx] >= INSIDE;
                    if other != selected {
                        hit = true;
                        break 'scan;
                    }
                }
            }
            if hit {
                *slot = if selected { 0 } else { 255 };
            }
        }
    });
    out
}

/// Result of `smooth_mask`.
#[derive(Clone, Debug, PartialEq)]
pub struct SmoothedMask {
    /// Blurred coverage thresholded at 0.5.
    pub binary: Mask,
    /// Continuous blurred coverage.
    pub alpha: Mask,
}

/// Gaussian-blur the mask as 1 (inside) / 0 (outside).
pub fn smooth_mask(mask: &Mask, sigma: f32) -> SmoothedMask {
    let (w, h) = mask.dimensions();
    let data: Vec<f32> = mask.as_raw().iter().map(|&v| if v >= INSIDE { 1.0 } else { 0.0 }).collect();
    let blurred = blur_channels(&data, w as usize, h as usize, 1, sigma, None).unwrap_or(data);

    let mut binary = Mask::new(w, h);
    let mut alpha = Mask::new(w, h);
    for ((b, a), &v) in binary.as_raw_mut().iter_mut().zip(alpha.as_raw_mut().iter_mut()).zip(&blurred) {
        *b = if v >= 0.5 { 255 } else { 0 };
        *a = (v * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    SmoothedMask { binary, alpha }
}

// ============================================================================
// ENGINE
// ============================================================================

/// Holds at most one active selection for a canvas session.
#[derive(Clone, Debug, Default)]
pub struct SelectionEngine {
    active: Option<Selection>,
}

impl SelectionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `selection` into the active one according to `mode`. Subtract or
    /// intersect with nothing active leaves nothing active.
    pub fn apply(&mut self, selection: Selection, mode: SelectionMode) -> Result<Option<&Selection>> {
        let next = match (&self.active, mode) {
            (_, SelectionMode::New) | (None, SelectionMode::Add) => Some(Selection { mode, ..selection }),
            (None, SelectionMode::Subtract | SelectionMode::Intersect) => None,
            (Some(current), _) => Some(current.combine(&selection, mode)?),
        };
        self.active = next.filter(|s| !s.is_empty());
        Ok(self.active.as_ref())
    }

    pub fn active(&self) -> Option<&Selection> {
        self.active.as_ref()
    }

    /// Replace the active selection with a refinement of it.
    pub fn refine(&mut self, f: impl FnOnce(&Selection) -> Result<Selection>) -> Result<Option<&Selection>> {
        if let Some(current) = &self.active {
            let refined = f(current)?;
            self.active = Some(refined).filter(|s| !s.is_empty());
        }
        Ok(self.active.as_ref())
    }

    pub fn clear(&mut self) {
        self.active = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect_mask(w: u32, h: u32, r: Rect) -> Mask {
        Selection::rectangle(w, h, r).mask().clone()
    }

    #[test]
    fn rectangle_traces_one_outer_contour() {
        let sel = Selection::rectangle(20, 20, Rect::new(5, 5, 6, 4));
        assert_eq!(sel.contours().len(), 1);
        assert!(!sel.contours()[0].hole);
        // perimeter pixels of a 6×4 block
        assert_eq!(sel.contours()[0].points.len(), 2 * 6 + 2 * 4 - 4);
    }

    #[test]
    fn ring_has_hole_contour() {
        let mut mask = rect_mask(12, 12, Rect::new(2, 2, 8, 8));
        for y in 4..8 {
            for x in 4..8 {
                mask.set(x, y, 0);
            }
        }
        let contours = trace_contours(&mask);
        assert_eq!(contours.len(), 2);
        assert!(!contours[0].hole);
        assert!(contours[1].hole);
    }

    #[test]
    fn contours_rasterize_back_to_mask() {
        let mut mask = rect_mask(16, 16, Rect::new(2, 2, 10, 10));
        for y in 5..8 {
            for x in 5..8 {
                mask.set(x, y, 0);
            }
        }
        mask.set(14, 14, 255);
        let contours = trace_contours(&mask);
        assert_eq!(rasterize_contours(&contours, 16, 16), mask);
    }

    #[test]
    fn diagonal_pair_terminates() {
        let mut mask = Mask::new(4, 4);
        mask.set(0, 0, 255);
        mask.set(1, 1, 255);
        let contours = trace_contours(&mask);
        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0].points.len(), 2);
    }

    #[test]
    fn expand_then_contract_restores_rect() {
        let sel = Selection::rectangle(30, 30, Rect::new(10, 10, 8, 8));
        let grown = sel.expand(2);
        assert_eq!(grown.bounds(), Rect::new(8, 8, 12, 12));
        assert_eq!(grown.contract(2).bounds(), sel.bounds());
    }

    #[test]
    fn invert_within_bounds() {
        let sel = Selection::rectangle(10, 10, Rect::new(0, 0, 5, 10));
        let inv = sel.invert(Rect::new(0, 0, 10, 10));
        assert_eq!(inv.bounds(), Rect::new(5, 0, 5, 10));
    }

    #[test]
    fn translate_moves_bounds() {
        let sel = Selection::rectangle(20, 20, Rect::new(2, 2, 4, 4));
        let moved = sel.transformed(&Affine::translate(5.0, 3.0)).unwrap();
        assert_eq!(moved.bounds(), Rect::new(7, 5, 4, 4));
        assert!(!moved.transform().is_identity());
    }

    #[test]
    fn combine_modes() {
        let a = Selection::rectangle(10, 10, Rect::new(0, 0, 6, 10));
        let b = Selection::rectangle(10, 10, Rect::new(4, 0, 6, 10));
        assert_eq!(a.combine(&b, SelectionMode::Add).unwrap().bounds(), Rect::new(0, 0, 10, 10));
        assert_eq!(a.combine(&b, SelectionMode::Intersect).unwrap().bounds(), Rect::new(4, 0, 2, 10));
        assert_eq!(a.combine(&b, SelectionMode::Subtract).unwrap().bounds(), Rect::new(0, 0, 4, 10));
        let other_size = Selection::empty(5, 5);
        assert!(a.combine(&other_size, SelectionMode::Add).is_err());
    }

    #[test]
    fn smooth_mask_thresholds_at_half() {
        let mask = rect_mask(20, 20, Rect::new(5, 5, 10, 10));
        let out = smooth_mask(&mask, 1.0);
        assert_eq!(out.binary.get(10, 10), 255);
        assert_eq!(out.binary.get(0, 0), 0);
        let edge = out.alpha.get(5, 10);
        assert!(edge > 0 && edge < 255);
    }

    #[test]
    fn engine_subtract_from_nothing_stays_empty() {
        let mut engine = SelectionEngine::new();
        let sel = Selection::rectangle(10, 10, Rect::new(0, 0, 3, 3));
        assert!(engine.apply(sel.clone(), SelectionMode::Subtract).unwrap().is_none());
        assert!(engine.apply(sel, SelectionMode::Add).unwrap().is_some());
        engine.clear();
        assert!(engine.active().is_none());
    }
}
