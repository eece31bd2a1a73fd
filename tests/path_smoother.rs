use paintcore::stroke::Segment;
use paintcore::{EngineConfig, PathSmoother, StrokeBuilder, StrokePoint, ToolKind, ToolProfile};
use proptest::prelude::*;

fn samples(coords: &[(f32, f32)]) -> Vec<StrokePoint> {
    coords
        .iter()
        .enumerate()
        .map(|(i, &(x, y))| StrokePoint::new(x, y, 1.0, i as u64 * 8))
        .collect()
}

fn profile(smoothing: f32) -> ToolProfile {
    ToolProfile { smoothing, ..ToolProfile::default() }
}

proptest! {
    #[test]
    fn douglas_peucker_is_idempotent(
        coords in prop::collection::vec((-500.0f32..500.0, -500.0f32..500.0), 0..60),
        epsilon in 0.0f32..25.0,
    ) {
        let points = samples(&coords);
        let once = PathSmoother::optimize(&points, epsilon);
        let twice = PathSmoother::optimize(&once, epsilon);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn douglas_peucker_keeps_endpoints(
        coords in prop::collection::vec((-500.0f32..500.0, -500.0f32..500.0), 2..60),
        epsilon in 0.0f32..25.0,
    ) {
        let points = samples(&coords);
        let out = PathSmoother::optimize(&points, epsilon);
        prop_assert_eq!(out.first(), points.first());
        prop_assert_eq!(out.last(), points.last());
    }
}

#[test]
fn trivial_inputs_do_not_panic() {
    let smoother = PathSmoother::default();
    for smoothing in [0.0, 0.2, 0.8] {
        assert!(smoother.smooth(&[], &profile(smoothing)).is_empty());
        let single = smoother.smooth(&samples(&[(3.0, 4.0)]), &profile(smoothing));
        assert_eq!(single.len(), 1);
    }
    assert!(PathSmoother::optimize(&[], 1.0).is_empty());
}

#[test]
fn smoothing_thresholds_pick_the_segment_shape() {
    let smoother = PathSmoother::default();
    let pts = samples(&[(0.0, 0.0), (10.0, 5.0), (20.0, 0.0), (30.0, 5.0)]);

    let lines = smoother.smooth(&pts, &profile(0.05));
    assert!(lines.segments().iter().all(|s| matches!(s, Segment::Line { .. })));
    assert_eq!(lines.len(), 3);

    let quads = smoother.smooth(&pts, &profile(0.2));
    assert!(quads.segments().iter().any(|s| matches!(s, Segment::Quad { .. })));

    let curve = smoother.smooth(&pts, &profile(0.5));
    let nodes = curve.flatten(1);
    assert!(nodes.len() > pts.len());
    let last = nodes.last().unwrap();
    assert!((last.point.x - 30.0).abs() < 1e-3 && (last.point.y - 5.0).abs() < 1e-3);
}

#[test]
fn catmull_rom_steps_follow_config() {
    let config = EngineConfig { catmull_rom_steps: 4, ..EngineConfig::default() };
    let coarse = PathSmoother::new(&config);
    let fine = PathSmoother::default();
    let pts = samples(&[(0.0, 0.0), (10.0, 10.0), (20.0, 0.0)]);
    assert!(coarse.smooth(&pts, &profile(0.5)).len() < fine.smooth(&pts, &profile(0.5)).len());
}

#[test]
fn builder_produces_measured_stroke() {
    let mut builder = StrokeBuilder::new();
    builder.push(StrokePoint::new(0.0, 0.0, 0.5, 100)).unwrap();
    builder.push(StrokePoint::new(3.0, 4.0, 0.7, 140)).unwrap();
    assert!(builder.push(StrokePoint::new(6.0, 8.0, 0.7, 120)).is_err());
    let stroke = builder.finish();
    assert_eq!(stroke.len(), 2);
    assert!((stroke.length() - 5.0).abs() < 1e-5);
    assert_eq!(stroke.duration_ms(), 40);
}

#[test]
fn every_tool_has_a_usable_profile() {
    let pts = samples(&[(0.0, 0.0), (5.0, 1.0), (10.0, 0.0), (15.0, 2.0)]);
    for tool in ToolKind::all() {
        let p = tool.profile();
        assert!(p.size > 0.0 && p.spacing > 0.0, "{:?}", tool);
        assert!(!PathSmoother::default().process(&pts, &p).is_empty());
    }
}
