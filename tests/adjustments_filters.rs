use std::sync::Arc;

use paintcore::ops::adjustments::{CurveChannel, Curves, HueSaturation, Levels, auto_levels, band_weight, histogram};
use paintcore::ops::filters::NoiseType;
use paintcore::{
    AdjustmentLayer, AdjustmentPipeline, CancelToken, Color, CoreError, EngineConfig, FilterEngine, FilterKind,
    FilterSpec, Mask, PixelBuffer, TaskOutcome,
};

/// 256 wide: rows 0..8 step through every gray level once per column, rows
/// 8..16 are a solid 128 spike.
fn spike_and_ramp() -> PixelBuffer {
    let mut buf = PixelBuffer::new(256, 16).unwrap();
    for y in 0..16 {
        for x in 0..256u32 {
            let v = if y < 8 { x as u8 } else { 128 };
            buf.put_pixel(x, y, image::Rgba([v, v, v, 255]));
        }
    }
    buf
}

fn gradient() -> PixelBuffer {
    let mut buf = PixelBuffer::new(32, 8).unwrap();
    for y in 0..8 {
        for x in 0..32u32 {
            buf.put_pixel(x, y, image::Rgba([(x * 8) as u8, (y * 30) as u8, 90, 255]));
        }
    }
    buf
}

#[test]
fn auto_levels_clips_one_percent_tails() {
    let buf = spike_and_ramp();
    let levels = Levels::auto(&buf);
    let black = levels.master.input_black;
    let white = levels.master.input_white;
    assert!(black > 0.0 && black < 12.0, "black point {}", black);
    assert!(white < 255.0 && white > 243.0, "white point {}", white);
    assert!(matches!(auto_levels(&buf), AdjustmentLayer::Levels(l) if l == levels));
}

#[test]
fn auto_levels_on_flat_image_is_identity() {
    let flat = PixelBuffer::filled(8, 8, Color::rgb(77, 77, 77)).unwrap();
    assert!(!auto_levels(&flat).has_effect());
}

#[test]
fn histogram_skips_transparent_pixels() {
    let mut buf = PixelBuffer::filled(4, 4, Color::rgb(10, 10, 10)).unwrap();
    buf.put_pixel(0, 0, image::Rgba([200, 200, 200, 0]));
    let hist = histogram(&buf);
    assert_eq!(hist.total(), 15);
    assert_eq!(hist.red[10], 15);
}

#[test]
fn levels_gamma_and_output_range() {
    let mut layer = AdjustmentLayer::Levels(Levels::default());
    assert!(!layer.has_effect());
    layer.set_params([("output_black", 100.0), ("output_white", 200.0)]).unwrap();
    let out = layer.apply(&PixelBuffer::filled(1, 1, Color::BLACK).unwrap());
    assert_eq!(out.pixel(0, 0), Some(image::Rgba([100, 100, 100, 255])));
}

#[test]
fn out_of_range_parameters_are_rejected_atomically() {
    let mut layer = AdjustmentLayer::brightness_contrast();
    assert!(matches!(layer.set_param("brightness", 101.0), Err(CoreError::InvalidArgument(_))));
    assert!(matches!(layer.set_param("sparkle", 1.0), Err(CoreError::InvalidArgument(_))));
    assert!(layer.set_params([("brightness", 20.0), ("contrast", 500.0)]).is_err());
    assert_eq!(layer.param("brightness"), Some(0.0));
    layer.set_params([("brightness", 20.0), ("contrast", 10.0)]).unwrap();
    assert_eq!(layer.param("contrast"), Some(10.0));
}

#[test]
fn hue_saturation_exposes_band_parameters() {
    let mut layer = AdjustmentLayer::HueSaturation(HueSaturation::default());
    let names: Vec<String> = layer.params().into_iter().map(|(n, _)| n).collect();
    assert!(names.iter().any(|n| n == "blues.saturation"));
    layer.set_param("reds.saturation", -100.0).unwrap();
    let red = PixelBuffer::filled(1, 1, Color::rgb(220, 20, 20)).unwrap();
    let out = layer.apply(&red).pixel(0, 0).unwrap();
    assert!(out[0].abs_diff(out[1]) <= 1 && out[1].abs_diff(out[2]) <= 1, "{:?}", out);

    // Blue sits outside the reds band and is untouched.
    let blue = PixelBuffer::filled(1, 1, Color::rgb(20, 20, 220)).unwrap();
    assert_eq!(layer.apply(&blue), blue);
}

#[test]
fn neighbouring_bands_share_weight() {
    for hue in [0.0f32, 20.0, 30.0, 44.0, 90.0, 359.0] {
        let total: f32 = [0.0, 60.0, 120.0, 180.0, 240.0, 300.0].iter().map(|&c| band_weight(hue, c)).sum();
        assert!((total - 1.0).abs() < 1e-5, "hue {} total {}", hue, total);
    }
}

#[test]
fn curves_validate_and_apply() {
    let mut curves = Curves::default();
    assert!(curves.set_points(CurveChannel::Master, vec![(0.0, 0.0), (0.0, 10.0)]).is_err());
    assert!(curves.set_points(CurveChannel::Red, vec![(0.0, 0.0), (300.0, 10.0)]).is_err());
    curves.set_points(CurveChannel::Master, vec![(0.0, 255.0), (255.0, 0.0)]).unwrap();
    let layer = AdjustmentLayer::Curves(curves);
    let out = layer.apply(&PixelBuffer::filled(1, 1, Color::rgb(0, 255, 40)).unwrap());
    assert_eq!(out.pixel(0, 0), Some(image::Rgba([255, 0, 215, 255])));
}

#[test]
fn pipeline_runs_in_order_and_skips_no_ops() {
    let mut pipeline = AdjustmentPipeline::new();
    pipeline.push(AdjustmentLayer::exposure());
    pipeline.push(AdjustmentLayer::Invert);
    pipeline.push(AdjustmentLayer::Threshold { level: 128.0 });
    assert!(pipeline.has_effect());
    let out = pipeline.apply(&PixelBuffer::filled(1, 1, Color::rgb(30, 30, 30)).unwrap());
    assert_eq!(out.pixel(0, 0), Some(image::Rgba([255, 255, 255, 255])));

    let idle = AdjustmentPipeline::new();
    let src = gradient();
    assert_eq!(idle.apply(&src), src);
}

#[test]
fn posterize_256_is_identity() {
    let layer = AdjustmentLayer::Posterize { levels: 256.0 };
    assert!(!layer.has_effect());
    let src = gradient();
    assert_eq!(layer.apply(&src), src);
}

#[test]
fn filters_are_pure_and_cached() {
    let engine = FilterEngine::default();
    let src = gradient();
    for kind in [
        FilterKind::GaussianBlur,
        FilterKind::Sharpen,
        FilterKind::EdgeDetect,
        FilterKind::Emboss,
        FilterKind::Noise(NoiseType::Gaussian),
        FilterKind::OilPaint,
        FilterKind::Watercolor,
        FilterKind::Vintage,
    ] {
        let spec = FilterSpec::new(kind).with_seed(9);
        let a = engine.apply(&src, &spec).unwrap();
        let b = engine.apply(&src, &spec).unwrap();
        assert!(Arc::ptr_eq(&a, &b), "{} not served from cache", kind.name());

        let fresh = FilterEngine::default().apply(&src, &spec).unwrap();
        assert_eq!(*a, *fresh, "{} is not deterministic", kind.name());
        assert_eq!(a.dimensions(), src.dimensions());
    }
}

#[test]
fn noise_seed_changes_output() {
    let engine = FilterEngine::default();
    let src = PixelBuffer::filled(16, 16, Color::rgb(128, 128, 128)).unwrap();
    let base = FilterSpec::new(FilterKind::Noise(NoiseType::Uniform)).with_param("amount", 50.0);
    let a = engine.apply(&src, &base.clone().with_seed(1)).unwrap();
    let b = engine.apply(&src, &base.with_seed(2)).unwrap();
    assert_ne!(*a, *b);
}

#[test]
fn invalid_filter_parameters_are_rejected() {
    let engine = FilterEngine::default();
    let src = gradient();
    let bad = FilterSpec::new(FilterKind::GaussianBlur).with_param("sigma", 0.0);
    assert!(matches!(engine.apply(&src, &bad), Err(CoreError::InvalidArgument(_))));
    let unknown = FilterSpec::new(FilterKind::Vintage).with_param("grain", 1.0);
    assert!(engine.apply(&src, &unknown).is_err());
}

#[test]
fn cancelled_filter_is_not_cached() {
    let engine = FilterEngine::new(&EngineConfig::default());
    let token = CancelToken::new();
    token.cancel();
    let spec = FilterSpec::new(FilterKind::Sharpen);
    let outcome = engine.apply_cancellable(&gradient(), &spec, &token).unwrap();
    assert!(matches!(outcome, TaskOutcome::Cancelled));
    assert_eq!(engine.cached_results(), 0);
}

#[test]
fn masked_filter_leaves_unselected_pixels() {
    let engine = FilterEngine::default();
    let src = gradient();
    let mut mask = Mask::new(32, 8);
    mask.set(5, 5, 255);
    let spec = FilterSpec::new(FilterKind::Vintage);
    let out = engine.apply_masked(&src, &spec, &mask).unwrap();
    assert_eq!(out.pixel(0, 0), src.pixel(0, 0));
    assert_ne!(out.pixel(5, 5), src.pixel(5, 5));
    assert!(engine.apply_masked(&src, &spec, &Mask::new(2, 2)).is_err());
}
