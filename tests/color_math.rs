use paintcore::color::{
    self, Color, ColorHarmony, HarmonyType, blend, contrast_ratio, hsl_to_rgb, hsv_to_rgb, is_accessible_contrast,
    rgb_to_hsl, rgb_to_hsv,
};
use paintcore::{BlendMode, CoreError, EngineConfig, PixelBuffer};
use proptest::prelude::*;

fn within_one(a: [f32; 3], b: [f32; 3]) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() <= 1.0)
}

proptest! {
    #[test]
    fn hsv_round_trip_within_one(r in 0u8..=255, g in 0u8..=255, b in 0u8..=255) {
        let rgb = [r as f32, g as f32, b as f32];
        let back = hsv_to_rgb(&rgb_to_hsv(&rgb).unwrap()).unwrap();
        prop_assert!(within_one(rgb, back), "{:?} -> {:?}", rgb, back);
    }

    #[test]
    fn hsl_round_trip_within_one(r in 0u8..=255, g in 0u8..=255, b in 0u8..=255) {
        let rgb = [r as f32, g as f32, b as f32];
        let back = hsl_to_rgb(&rgb_to_hsl(&rgb).unwrap()).unwrap();
        prop_assert!(within_one(rgb, back), "{:?} -> {:?}", rgb, back);
    }

    #[test]
    fn hue_stays_in_range(r in 0u8..=255, g in 0u8..=255, b in 0u8..=255) {
        let [h, s, v] = rgb_to_hsv(&[r as f32, g as f32, b as f32]).unwrap();
        prop_assert!((0.0..360.0).contains(&h));
        prop_assert!((0.0..=1.0).contains(&s));
        prop_assert!((0.0..=1.0).contains(&v));
    }

    #[test]
    fn contrast_with_itself_is_one(r in 0u8..=255, g in 0u8..=255, b in 0u8..=255) {
        let c = Color::rgb(r, g, b);
        prop_assert!((contrast_ratio(c, c) - 1.0).abs() < 1e-6);
    }
}

#[test]
fn wrong_length_vectors_are_rejected() {
    assert!(matches!(rgb_to_hsv(&[1.0, 2.0]), Err(CoreError::InvalidArgument(_))));
    assert!(matches!(rgb_to_hsl(&[1.0, 2.0, 3.0, 4.0, 5.0]), Err(CoreError::InvalidArgument(_))));
    assert!(rgb_to_hsv(&[1.0, 2.0, 3.0, 255.0]).is_ok());
}

#[test]
fn every_harmony_starts_with_its_base() {
    let base = Color::rgb(200, 40, 90);
    for &kind in HarmonyType::all() {
        let harmony = ColorHarmony::generate(base, kind);
        assert_eq!(harmony.colors.first(), Some(&base), "{}", kind.name());
        assert!((0.0..=1.0).contains(&harmony.score));
    }
}

#[test]
fn complementary_is_opposite_hue() {
    let colors = color::complementary(Color::rgb(255, 0, 0));
    assert_eq!(colors[1], Color::rgb(0, 255, 255));
    assert!((color::harmony_score(&colors) - 1.0).abs() < 1e-6);
}

#[test]
fn black_on_white_is_maximal_contrast() {
    let ratio = contrast_ratio(Color::BLACK, Color::WHITE);
    assert!((ratio - 21.0).abs() < 0.01);
    assert!(is_accessible_contrast(Color::BLACK, Color::WHITE, false));
    assert!(!is_accessible_contrast(Color::rgb(120, 120, 120), Color::rgb(140, 140, 140), true));
}

#[test]
fn multiply_red_by_blue_is_black() {
    let out = blend(Color::rgb(255, 0, 0), Color::rgb(0, 0, 255), BlendMode::Multiply, 1.0);
    assert_eq!((out.r, out.g, out.b), (0, 0, 0));
}

#[test]
fn zero_opacity_blend_keeps_base() {
    let base = Color::rgb(10, 120, 200);
    assert_eq!(blend(base, Color::rgb(255, 255, 0), BlendMode::Screen, 0.0), base);
}

#[test]
fn dominant_colors_are_deterministic_for_a_seed() {
    let mut buf = PixelBuffer::filled(16, 16, Color::rgb(250, 0, 0)).unwrap();
    for y in 0..16 {
        for x in 0..4 {
            buf.put_pixel(x, y, image::Rgba([0, 0, 250, 255]));
        }
    }
    let a = color::dominant_colors(&buf, 2, 7).unwrap();
    let b = color::dominant_colors(&buf, 2, 7).unwrap();
    assert_eq!(a, b);
    // Red covers three quarters, so it leads.
    assert_eq!(a[0], Color::rgb(250, 0, 0));
}

#[test]
fn kmeans_iteration_cap_comes_from_config() {
    let mut buf = PixelBuffer::new(7, 1).unwrap();
    for (x, v) in [0u8, 0, 100, 255, 255, 255, 255].into_iter().enumerate() {
        buf.put_pixel(x as u32, 0, image::Rgba([v, v, v, 255]));
    }
    let config = EngineConfig::default();
    let converged = color::dominant_colors_for(&buf, 2, 9, &config).unwrap();
    assert_eq!(converged, color::dominant_colors(&buf, 2, 9).unwrap());
    assert_eq!(converged, vec![Color::rgb(255, 255, 255), Color::rgb(33, 33, 33)]);

    // One pass stops before the 100 sample moves over to the dark cluster.
    let single = EngineConfig { kmeans_max_iterations: 1, ..EngineConfig::default() };
    let rough = color::dominant_colors_for(&buf, 2, 9, &single).unwrap();
    assert_eq!(rough, vec![Color::rgb(224, 224, 224), Color::rgb(0, 0, 0)]);
}
