// ============================================================================
// COLOR MATH: color spaces, harmonies, contrast, blending, palette extraction
// ============================================================================

use image::Rgba;
use serde::{Deserialize, Serialize};

use crate::canvas::{BlendMode, blend_pixel};
use crate::config::EngineConfig;
use crate::error::{CoreError, Result};
use crate::ops::hash_u32;
use crate::pixels::PixelBuffer;

/// Iteration cap for `dominant_colors`.
pub const DEFAULT_KMEANS_ITERATIONS: usize = 20;

/// Most samples k-means looks at; larger images are strided.
const KMEANS_MAX_SAMPLES: usize = 20_000;

/// D65 reference white (2° observer).
const WHITE_X: f32 = 0.950_47;
const WHITE_Y: f32 = 1.0;
const WHITE_Z: f32 = 1.088_83;

/// 8-bit straight-alpha RGBA color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Default for Color {
    fn default() -> Self {
        Color::BLACK
    }
}

impl From<Color> for Rgba<u8> {
    fn from(c: Color) -> Self {
        Rgba([c.r, c.g, c.b, c.a])
    }
}

impl From<Rgba<u8>> for Color {
    fn from(p: Rgba<u8>) -> Self {
        Color::rgba(p[0], p[1], p[2], p[3])
    }
}

impl Color {
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn with_alpha(self, a: u8) -> Self {
        Self { a, ..self }
    }

    /// Parse `#RGB`, `#RRGGBB` or `#RRGGBBAA` (leading `#` optional).
    pub fn from_hex(hex: &str) -> Result<Self> {
        let digits = hex.trim().trim_start_matches('#');
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CoreError::arg(format!("'{}' is not a hex color", hex)));
        }
        let byte = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16);
        let parsed = match digits.len() {
            3 => {
                let nib = |i: usize| u8::from_str_radix(&digits[i..i + 1], 16).map(|v| v * 17);
                (nib(0), nib(1), nib(2), Ok(255))
            }
            6 => (byte(0), byte(2), byte(4), Ok(255)),
            8 => (byte(0), byte(2), byte(4), byte(6)),
            n => return Err(CoreError::arg(format!("hex color must have 3, 6 or 8 digits, got {}", n))),
        };
        match parsed {
            (Ok(r), Ok(g), Ok(b), Ok(a)) => Ok(Color::rgba(r, g, b, a)),
            _ => Err(CoreError::arg(format!("'{}' is not a hex color", hex))),
        }
    }

    /// `#RRGGBB`, or `#RRGGBBAA` when not fully opaque.
    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
        } else {
            format!("#{:02X}{:02X}{:02X}{:02X}", self.r, self.g, self.b, self.a)
        }
    }

    /// HSL with hue in degrees.
    pub fn to_hsl(&self) -> [f32; 3] {
        let (h, s, l) = rgb_to_hsl_unit(self.r as f32 / 255.0, self.g as f32 / 255.0, self.b as f32 / 255.0);
        [normalize_hue(h * 360.0), s, l]
    }

    pub fn from_hsl(h: f32, s: f32, l: f32, a: u8) -> Self {
        let (r, g, b) = hsl_to_rgb_unit(normalize_hue(h) / 360.0, s.clamp(0.0, 1.0), l.clamp(0.0, 1.0));
        Color::rgba(unit_to_u8(r), unit_to_u8(g), unit_to_u8(b), a)
    }

    /// Rotate hue, keeping saturation, lightness and alpha.
    pub fn rotate_hue(&self, degrees: f32) -> Self {
        let [h, s, l] = self.to_hsl();
        Color::from_hsl(h + degrees, s, l, self.a)
    }
}

#[inline]
fn unit_to_u8(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Wrap into [0, 360).
#[inline]
pub fn normalize_hue(h: f32) -> f32 {
    let h = h.rem_euclid(360.0);
    if h >= 360.0 { 0.0 } else { h }
}

// ============================================================================
// UNIT-RANGE HSL HELPERS (shared with the adjustment pipeline)
// ============================================================================

/// RGB (0..1) → HSL (H: 0..1, S: 0..1, L: 0..1)
pub(crate) fn rgb_to_hsl_unit(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;

    if (max - min).abs() < 1e-6 {
        return (0.0, 0.0, l);
    }

    let d = max - min;
    let s = if l > 0.5 { d / (2.0 - max - min) } else { d / (max + min) };

    let h = if (max - r).abs() < 1e-6 {
        let mut h = (g - b) / d;
        if h < 0.0 {
            h += 6.0;
        }
        h / 6.0
    } else if (max - g).abs() < 1e-6 {
        ((b - r) / d + 2.0) / 6.0
    } else {
        ((r - g) / d + 4.0) / 6.0
    };

    (h, s, l)
}

/// HSL (all 0..1) → RGB (0..1)
pub(crate) fn hsl_to_rgb_unit(h: f32, s: f32, l: f32) -> (f32, f32, f32) {
    if s.abs() < 1e-6 {
        return (l, l, l);
    }

    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;

    (hue_to_rgb(p, q, h + 1.0 / 3.0), hue_to_rgb(p, q, h), hue_to_rgb(p, q, h - 1.0 / 3.0))
}

fn hue_to_rgb(p: f32, q: f32, mut t: f32) -> f32 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        return p + (q - p) * 6.0 * t;
    }
    if t < 1.0 / 2.0 {
        return q;
    }
    if t < 2.0 / 3.0 {
        return p + (q - p) * (2.0 / 3.0 - t) * 6.0;
    }
    p
}

// ============================================================================
// SLICE CONVERSIONS
// ============================================================================

/// Validate a component slice: accepted lengths and finite values.
fn components<'a>(what: &str, values: &'a [f32], lengths: &[usize]) -> Result<&'a [f32]> {
    if !lengths.contains(&values.len()) {
        return Err(CoreError::arg(format!(
            "{} expects {:?} components, got {}",
            what,
            lengths,
            values.len()
        )));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(CoreError::arg(format!("{} components must be finite", what)));
    }
    Ok(values)
}

fn rgb_unit(v: &[f32]) -> (f32, f32, f32) {
    (
        v[0].clamp(0.0, 255.0) / 255.0,
        v[1].clamp(0.0, 255.0) / 255.0,
        v[2].clamp(0.0, 255.0) / 255.0,
    )
}

/// RGB (0..255) → HSV (H degrees, S/V 0..1). A 4th (alpha) component is ignored.
pub fn rgb_to_hsv(rgb: &[f32]) -> Result<[f32; 3]> {
    let v = components("rgb_to_hsv", rgb, &[3, 4])?;
    let (r, g, b) = rgb_unit(v);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let d = max - min;

    let h = if d < 1e-6 {
        0.0
    } else if max == r {
        60.0 * ((g - b) / d)
    } else if max == g {
        60.0 * ((b - r) / d + 2.0)
    } else {
        60.0 * ((r - g) / d + 4.0)
    };
    let s = if max <= 0.0 { 0.0 } else { d / max };
    Ok([normalize_hue(h), s.clamp(0.0, 1.0), max.clamp(0.0, 1.0)])
}

/// HSV (H degrees, S/V 0..1) → RGB (0..255).
pub fn hsv_to_rgb(hsv: &[f32]) -> Result<[f32; 3]> {
    let v = components("hsv_to_rgb", hsv, &[3, 4])?;
    let h = normalize_hue(v[0]);
    let s = v[1].clamp(0.0, 1.0);
    let val = v[2].clamp(0.0, 1.0);

    let c = val * s;
    let hp = h / 60.0;
    let x = c * (1.0 - (hp % 2.0 - 1.0).abs());
    let (r1, g1, b1) = match hp as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = val - c;
    Ok([
        ((r1 + m) * 255.0).clamp(0.0, 255.0),
        ((g1 + m) * 255.0).clamp(0.0, 255.0),
        ((b1 + m) * 255.0).clamp(0.0, 255.0),
    ])
}

/// RGB (0..255) → HSL (H degrees, S/L 0..1).
pub fn rgb_to_hsl(rgb: &[f32]) -> Result<[f32; 3]> {
    let v = components("rgb_to_hsl", rgb, &[3, 4])?;
    let (r, g, b) = rgb_unit(v);
    let (h, s, l) = rgb_to_hsl_unit(r, g, b);
    Ok([normalize_hue(h * 360.0), s.clamp(0.0, 1.0), l.clamp(0.0, 1.0)])
}

/// HSL (H degrees, S/L 0..1) → RGB (0..255).
pub fn hsl_to_rgb(hsl: &[f32]) -> Result<[f32; 3]> {
    let v = components("hsl_to_rgb", hsl, &[3, 4])?;
    let (r, g, b) = hsl_to_rgb_unit(normalize_hue(v[0]) / 360.0, v[1].clamp(0.0, 1.0), v[2].clamp(0.0, 1.0));
    Ok([
        (r * 255.0).clamp(0.0, 255.0),
        (g * 255.0).clamp(0.0, 255.0),
        (b * 255.0).clamp(0.0, 255.0),
    ])
}

/// RGB (0..255) → CMYK (all 0..1).
pub fn rgb_to_cmyk(rgb: &[f32]) -> Result<[f32; 4]> {
    let v = components("rgb_to_cmyk", rgb, &[3, 4])?;
    let (r, g, b) = rgb_unit(v);
    let k = 1.0 - r.max(g).max(b);
    if k >= 1.0 - 1e-6 {
        return Ok([0.0, 0.0, 0.0, 1.0]);
    }
    let inv = 1.0 - k;
    Ok([
        ((1.0 - r - k) / inv).clamp(0.0, 1.0),
        ((1.0 - g - k) / inv).clamp(0.0, 1.0),
        ((1.0 - b - k) / inv).clamp(0.0, 1.0),
        k.clamp(0.0, 1.0),
    ])
}

/// CMYK (all 0..1, exactly four components) → RGB (0..255).
pub fn cmyk_to_rgb(cmyk: &[f32]) -> Result<[f32; 3]> {
    let v = components("cmyk_to_rgb", cmyk, &[4])?;
    let [c, m, y, k] = [v[0], v[1], v[2], v[3]].map(|x| x.clamp(0.0, 1.0));
    Ok([
        (255.0 * (1.0 - c) * (1.0 - k)).clamp(0.0, 255.0),
        (255.0 * (1.0 - m) * (1.0 - k)).clamp(0.0, 255.0),
        (255.0 * (1.0 - y) * (1.0 - k)).clamp(0.0, 255.0),
    ])
}

#[inline]
fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.040_45 { c / 12.92 } else { ((c + 0.055) / 1.055).powf(2.4) }
}

#[inline]
fn linear_to_srgb(c: f32) -> f32 {
    if c <= 0.003_130_8 { c * 12.92 } else { 1.055 * c.powf(1.0 / 2.4) - 0.055 }
}

#[inline]
fn lab_f(t: f32) -> f32 {
    const DELTA: f32 = 6.0 / 29.0;
    if t > DELTA * DELTA * DELTA { t.cbrt() } else { t / (3.0 * DELTA * DELTA) + 4.0 / 29.0 }
}

#[inline]
fn lab_f_inv(t: f32) -> f32 {
    const DELTA: f32 = 6.0 / 29.0;
    if t > DELTA { t * t * t } else { 3.0 * DELTA * DELTA * (t - 4.0 / 29.0) }
}

/// RGB (0..255) → CIELAB (L 0..100, a/b −128..127), D65 white.
pub fn rgb_to_lab(rgb: &[f32]) -> Result<[f32; 3]> {
    let v = components("rgb_to_lab", rgb, &[3, 4])?;
    let (r, g, b) = rgb_unit(v);
    let (r, g, b) = (srgb_to_linear(r), srgb_to_linear(g), srgb_to_linear(b));

    let x = 0.412_456_4 * r + 0.357_576_1 * g + 0.180_437_5 * b;
    let y = 0.212_672_9 * r + 0.715_152_2 * g + 0.072_175 * b;
    let z = 0.019_333_9 * r + 0.119_192 * g + 0.950_304_1 * b;

    let fx = lab_f(x / WHITE_X);
    let fy = lab_f(y / WHITE_Y);
    let fz = lab_f(z / WHITE_Z);

    Ok([
        (116.0 * fy - 16.0).clamp(0.0, 100.0),
        (500.0 * (fx - fy)).clamp(-128.0, 127.0),
        (200.0 * (fy - fz)).clamp(-128.0, 127.0),
    ])
}

/// CIELAB (D65) → RGB (0..255). Out-of-gamut results are clamped.
pub fn lab_to_rgb(lab: &[f32]) -> Result<[f32; 3]> {
    let v = components("lab_to_rgb", lab, &[3, 4])?;
    let l = v[0].clamp(0.0, 100.0);
    let a = v[1].clamp(-128.0, 127.0);
    let b = v[2].clamp(-128.0, 127.0);

    let fy = (l + 16.0) / 116.0;
    let fx = fy + a / 500.0;
    let fz = fy - b / 200.0;
    let x = WHITE_X * lab_f_inv(fx);
    let y = WHITE_Y * lab_f_inv(fy);
    let z = WHITE_Z * lab_f_inv(fz);

    let r = 3.240_454_2 * x - 1.537_138_5 * y - 0.498_531_4 * z;
    let g = -0.969_266 * x + 1.876_010_8 * y + 0.041_556 * z;
    let bl = 0.055_643_4 * x - 0.204_025_9 * y + 1.057_225_2 * z;

    let out = |c: f32| (linear_to_srgb(c.clamp(0.0, 1.0)) * 255.0).clamp(0.0, 255.0);
    Ok([out(r), out(g), out(bl)])
}

// ============================================================================
// HARMONIES
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HarmonyType {
    Complementary,
    Analogous,
    Triadic,
    Tetradic,
    SplitComplementary,
    Monochromatic,
}

impl HarmonyType {
    pub fn all() -> &'static [HarmonyType] {
        &[
            HarmonyType::Complementary,
            HarmonyType::Analogous,
            HarmonyType::Triadic,
            HarmonyType::Tetradic,
            HarmonyType::SplitComplementary,
            HarmonyType::Monochromatic,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            HarmonyType::Complementary => "Complementary",
            HarmonyType::Analogous => "Analogous",
            HarmonyType::Triadic => "Triadic",
            HarmonyType::Tetradic => "Tetradic",
            HarmonyType::SplitComplementary => "Split Complementary",
            HarmonyType::Monochromatic => "Monochromatic",
        }
    }
}

pub fn complementary(base: Color) -> Vec<Color> {
    vec![base, base.rotate_hue(180.0)]
}

pub fn analogous(base: Color, angle: f32) -> Vec<Color> {
    vec![base, base.rotate_hue(-angle), base.rotate_hue(angle)]
}

pub fn triadic(base: Color) -> Vec<Color> {
    vec![base, base.rotate_hue(120.0), base.rotate_hue(240.0)]
}

pub fn tetradic(base: Color) -> Vec<Color> {
    vec![base, base.rotate_hue(90.0), base.rotate_hue(180.0), base.rotate_hue(270.0)]
}

pub fn split_complementary(base: Color, angle: f32) -> Vec<Color> {
    vec![base, base.rotate_hue(180.0 - angle), base.rotate_hue(180.0 + angle)]
}

/// Base followed by `count - 1` lightness variations of the same hue.
pub fn monochromatic(base: Color, count: usize) -> Vec<Color> {
    let [h, s, _] = base.to_hsl();
    let mut out = vec![base];
    let extra = count.saturating_sub(1);
    for i in 1..=extra {
        let l = 0.1 + 0.8 * i as f32 / (extra + 1) as f32;
        out.push(Color::from_hsl(h, s, l, base.a));
    }
    out
}

/// Harmonic hue gaps, in degrees.
const HARMONIC_ANGLES: [f32; 7] = [0.0, 30.0, 60.0, 90.0, 120.0, 150.0, 180.0];

/// How closely the pairwise hue gaps of `colors` sit on harmonic angles, in [0, 1].
/// Fewer than two colors score 1.
pub fn harmony_score(colors: &[Color]) -> f32 {
    if colors.len() < 2 {
        return 1.0;
    }
    let hues: Vec<f32> = colors.iter().map(|c| c.to_hsl()[0]).collect();
    let mut total = 0.0f32;
    let mut pairs = 0u32;
    for i in 0..hues.len() {
        for j in i + 1..hues.len() {
            let mut gap = (hues[i] - hues[j]).abs();
            if gap > 180.0 {
                gap = 360.0 - gap;
            }
            let nearest = HARMONIC_ANGLES.iter().map(|a| (gap - a).abs()).fold(f32::MAX, f32::min);
            // Harmonic angles are 30° apart, so the worst miss is 15°.
            total += (1.0 - nearest / 15.0).clamp(0.0, 1.0);
            pairs += 1;
        }
    }
    (total / pairs as f32).clamp(0.0, 1.0)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColorHarmony {
    pub base: Color,
    pub kind: HarmonyType,
    pub colors: Vec<Color>,
    pub score: f32,
}

impl ColorHarmony {
    /// Spread used for analogous and split-complementary schemes.
    pub const DEFAULT_ANGLE: f32 = 30.0;
    pub const DEFAULT_MONO_COUNT: usize = 5;

    pub fn generate(base: Color, kind: HarmonyType) -> Self {
        let colors = match kind {
            HarmonyType::Complementary => complementary(base),
            HarmonyType::Analogous => analogous(base, Self::DEFAULT_ANGLE),
            HarmonyType::Triadic => triadic(base),
            HarmonyType::Tetradic => tetradic(base),
            HarmonyType::SplitComplementary => split_complementary(base, Self::DEFAULT_ANGLE),
            HarmonyType::Monochromatic => monochromatic(base, Self::DEFAULT_MONO_COUNT),
        };
        let score = harmony_score(&colors);
        Self { base, kind, colors, score }
    }
}

// ============================================================================
// CONTRAST (WCAG 2.x)
// ============================================================================

pub fn relative_luminance(c: Color) -> f32 {
    let lin = |v: u8| srgb_to_linear(v as f32 / 255.0);
    0.2126 * lin(c.r) + 0.7152 * lin(c.g) + 0.0722 * lin(c.b)
}

/// Ratio in [1, 21].
pub fn contrast_ratio(c1: Color, c2: Color) -> f32 {
    let l1 = relative_luminance(c1);
    let l2 = relative_luminance(c2);
    let (hi, lo) = if l1 >= l2 { (l1, l2) } else { (l2, l1) };
    (hi + 0.05) / (lo + 0.05)
}

/// AA thresholds: 4.5 for body text, 3.0 for large text.
pub fn is_accessible_contrast(c1: Color, c2: Color, large_text: bool) -> bool {
    let threshold = if large_text { 3.0 } else { 4.5 };
    contrast_ratio(c1, c2) >= threshold
}

// ============================================================================
// BLENDING
// ============================================================================

/// Blend `c2` over `c1` with `mode`, then mix toward `c1` by `1 - opacity`.
pub fn blend(c1: Color, c2: Color, mode: BlendMode, opacity: f32) -> Color {
    blend_pixel(c1.into(), c2.into(), mode, opacity).into()
}

// ============================================================================
// DOMINANT COLORS (k-means)
// ============================================================================

/// Small deterministic generator driven by the integer hash used for noise.
struct HashRng {
    state: u32,
}

impl HashRng {
    fn new(seed: u64) -> Self {
        Self { state: (seed ^ (seed >> 32)) as u32 }
    }

    fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_add(0x9E37_79B9);
        hash_u32(self.state)
    }

    fn below(&mut self, n: usize) -> usize {
        (self.next_u32() as u64 * n as u64 >> 32) as usize
    }
}

#[inline]
fn dist2(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    let dr = a[0] - b[0];
    let dg = a[1] - b[1];
    let db = a[2] - b[2];
    dr * dr + dg * dg + db * db
}

/// Up to `k` representative colors of the opaque pixels, most populous first.
pub fn dominant_colors(buffer: &PixelBuffer, k: usize, seed: u64) -> Result<Vec<Color>> {
    dominant_colors_with(buffer, k, seed, DEFAULT_KMEANS_ITERATIONS)
}

/// `dominant_colors` with the iteration cap taken from `config`.
pub fn dominant_colors_for(buffer: &PixelBuffer, k: usize, seed: u64, config: &EngineConfig) -> Result<Vec<Color>> {
    dominant_colors_with(buffer, k, seed, config.kmeans_max_iterations)
}

pub fn dominant_colors_with(buffer: &PixelBuffer, k: usize, seed: u64, max_iterations: usize) -> Result<Vec<Color>> {
    if k == 0 {
        return Err(CoreError::arg("dominant_colors needs k >= 1"));
    }

    let opaque = buffer.as_raw().chunks_exact(4).filter(|p| p[3] == 255).count();
    if opaque == 0 {
        return Ok(Vec::new());
    }
    let stride = opaque.div_ceil(KMEANS_MAX_SAMPLES).max(1);
    let samples: Vec<[f32; 3]> = buffer
        .as_raw()
        .chunks_exact(4)
        .filter(|p| p[3] == 255)
        .step_by(stride)
        .map(|p| [p[0] as f32, p[1] as f32, p[2] as f32])
        .collect();

    // Seed centroids from distinct sample values.
    let mut rng = HashRng::new(seed);
    let mut centroids: Vec<[f32; 3]> = Vec::with_capacity(k);
    for _ in 0..k * 8 {
        if centroids.len() == k {
            break;
        }
        let cand = samples[rng.below(samples.len())];
        if !centroids.contains(&cand) {
            centroids.push(cand);
        }
    }
    for s in &samples {
        if centroids.len() == k {
            break;
        }
        if !centroids.contains(s) {
            centroids.push(*s);
        }
    }

    let n = centroids.len();
    let mut assignment = vec![usize::MAX; samples.len()];
    let mut counts = vec![0usize; n];
    for iter in 0..max_iterations.max(1) {
        let mut changed = false;
        for (slot, s) in assignment.iter_mut().zip(&samples) {
            let mut best = 0;
            let mut best_d = f32::MAX;
            for (ci, c) in centroids.iter().enumerate() {
                let d = dist2(s, c);
                if d < best_d {
                    best_d = d;
                    best = ci;
                }
            }
            if *slot != best {
                *slot = best;
                changed = true;
            }
        }

        let mut sums = vec![[0.0f64; 3]; n];
        counts = vec![0usize; n];
        for (&ci, s) in assignment.iter().zip(&samples) {
            sums[ci][0] += s[0] as f64;
            sums[ci][1] += s[1] as f64;
            sums[ci][2] += s[2] as f64;
            counts[ci] += 1;
        }
        for ci in 0..n {
            if counts[ci] > 0 {
                let c = counts[ci] as f64;
                centroids[ci] = [(sums[ci][0] / c) as f32, (sums[ci][1] / c) as f32, (sums[ci][2] / c) as f32];
            }
        }

        if !changed {
            crate::log_debug!("k-means converged after {} iterations", iter + 1);
            break;
        }
    }

    let mut order: Vec<usize> = (0..n).filter(|&ci| counts[ci] > 0).collect();
    order.sort_by(|&a, &b| counts[b].cmp(&counts[a]).then(a.cmp(&b)));

    let mut out: Vec<Color> = Vec::with_capacity(order.len());
    for ci in order {
        let c = centroids[ci];
        let color = Color::rgb(
            c[0].round().clamp(0.0, 255.0) as u8,
            c[1].round().clamp(0.0, 255.0) as u8,
            c[2].round().clamp(0.0, 255.0) as u8,
        );
        if !out.contains(&color) {
            out.push(color);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip_forms() {
        assert_eq!(Color::from_hex("#fff").unwrap(), Color::WHITE);
        assert_eq!(Color::from_hex("00FF00").unwrap(), Color::rgb(0, 255, 0));
        assert_eq!(Color::from_hex("#11223344").unwrap(), Color::rgba(0x11, 0x22, 0x33, 0x44));
        assert_eq!(Color::rgba(1, 2, 3, 4).to_hex(), "#01020304");
        assert!(Color::from_hex("#12345").is_err());
        assert!(Color::from_hex("#gggggg").is_err());
    }

    #[test]
    fn gray_has_zero_hue() {
        let hsv = rgb_to_hsv(&[128.0, 128.0, 128.0]).unwrap();
        assert_eq!(hsv[0], 0.0);
        assert_eq!(hsv[1], 0.0);
    }

    #[test]
    fn cmyk_needs_four_components() {
        assert!(cmyk_to_rgb(&[0.0, 0.0, 0.0]).is_err());
        assert_eq!(cmyk_to_rgb(&[0.0, 0.0, 0.0, 1.0]).unwrap(), [0.0, 0.0, 0.0]);
        assert!(rgb_to_hsv(&[1.0, 2.0]).is_err());
    }

    #[test]
    fn lab_of_white_is_full_lightness() {
        let lab = rgb_to_lab(&[255.0, 255.0, 255.0]).unwrap();
        assert!((lab[0] - 100.0).abs() < 0.1);
        assert!(lab[1].abs() < 0.5 && lab[2].abs() < 0.5);
        let back = lab_to_rgb(&lab).unwrap();
        assert!(back.iter().all(|&v| v > 254.0));
    }

    #[test]
    fn kmeans_finds_two_blocks() {
        let mut buf = PixelBuffer::filled(10, 10, Color::rgb(200, 0, 0)).unwrap();
        for y in 0..3 {
            for x in 0..10 {
                buf.put_pixel(x, y, Rgba([0, 0, 200, 255]));
            }
        }
        let colors = dominant_colors(&buf, 2, 7).unwrap();
        assert_eq!(colors, vec![Color::rgb(200, 0, 0), Color::rgb(0, 0, 200)]);
    }

    #[test]
    fn kmeans_ignores_transparent_pixels() {
        let buf = PixelBuffer::new(4, 4).unwrap();
        assert!(dominant_colors(&buf, 3, 1).unwrap().is_empty());
    }
}
