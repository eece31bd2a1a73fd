// ============================================================================
// ADJUSTMENTS: non-destructive tonal / colour corrections
// ============================================================================
//
// Every adjustment is a pure function of its input buffer and its current
// parameters. Parameters are named floats with a declared range; setting a
// value outside that range is an error rather than a silent clamp.
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::color::{hsl_to_rgb_unit, normalize_hue, rgb_to_hsl_unit};
use crate::error::{CoreError, Result};
use crate::ops::{ParamDef, map_pixels, param};
use crate::pixels::PixelBuffer;

// ============================================================================
// HISTOGRAM
// ============================================================================

/// Per-channel counts over every pixel with non-zero alpha.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Histogram {
    pub red: [u32; 256],
    pub green: [u32; 256],
    pub blue: [u32; 256],
    pub luminance: [u32; 256],
}

impl Histogram {
    pub fn total(&self) -> u64 {
        self.luminance.iter().map(|&c| c as u64).sum()
    }
}

#[inline]
fn luminance(r: f32, g: f32, b: f32) -> f32 {
    0.2126 * r + 0.7152 * g + 0.0722 * b
}

pub fn histogram(buffer: &PixelBuffer) -> Histogram {
    let mut hist = Histogram { red: [0; 256], green: [0; 256], blue: [0; 256], luminance: [0; 256] };
    for px in buffer.as_raw().chunks_exact(4) {
        if px[3] == 0 {
            continue;
        }
        hist.red[px[0] as usize] += 1;
        hist.green[px[1] as usize] += 1;
        hist.blue[px[2] as usize] += 1;
        let l = luminance(px[0] as f32, px[1] as f32, px[2] as f32).round().clamp(0.0, 255.0);
        hist.luminance[l as usize] += 1;
    }
    hist
}

// ============================================================================
// LEVELS
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LevelsChannel {
    pub input_black: f32,
    pub input_white: f32,
    pub gamma: f32,
    pub output_black: f32,
    pub output_white: f32,
}

impl Default for LevelsChannel {
    fn default() -> Self {
        Self { input_black: 0.0, input_white: 255.0, gamma: 1.0, output_black: 0.0, output_white: 255.0 }
    }
}

impl LevelsChannel {
    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }

    /// Normalize against the input range, apply `1/gamma`, rescale to the
    /// output range. A collapsed input range counts as width 1.
    pub fn build_lut(&self) -> [u8; 256] {
        let mut lut = [0u8; 256];
        let in_range = (self.input_white - self.input_black).max(1.0);
        let out_range = self.output_white - self.output_black;
        let inv_gamma = 1.0 / self.gamma.max(0.01);

        for (i, slot) in lut.iter_mut().enumerate() {
            let normalized = ((i as f32 - self.input_black) / in_range).clamp(0.0, 1.0);
            let output = self.output_black + normalized.powf(inv_gamma) * out_range;
            *slot = output.round().clamp(0.0, 255.0) as u8;
        }
        lut
    }
}

/// Master curve followed by per-channel R/G/B curves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Levels {
    pub master: LevelsChannel,
    pub red: LevelsChannel,
    pub green: LevelsChannel,
    pub blue: LevelsChannel,
}

/// Fraction of pixels discarded from each histogram tail by `Levels::auto`.
const AUTO_LEVELS_CLIP: f64 = 0.01;

impl Levels {
    /// Master input points placed where 1 % of the luminance histogram is
    /// clipped from each tail. Fully transparent pixels are ignored.
    pub fn auto(buffer: &PixelBuffer) -> Self {
        let hist = histogram(buffer);
        let total = hist.total();
        let mut levels = Levels::default();
        if total == 0 {
            return levels;
        }
        let clip = total as f64 * AUTO_LEVELS_CLIP;

        let mut acc = 0u64;
        let mut black = 0usize;
        for (v, &count) in hist.luminance.iter().enumerate() {
            acc += count as u64;
            if acc as f64 > clip {
                black = v;
                break;
            }
        }
        acc = 0;
        let mut white = 255usize;
        for (v, &count) in hist.luminance.iter().enumerate().rev() {
            acc += count as u64;
            if acc as f64 > clip {
                white = v;
                break;
            }
        }

        if white > black {
            levels.master.input_black = black as f32;
            levels.master.input_white = white as f32;
        }
        levels
    }

    fn luts(&self) -> [[u8; 256]; 4] {
        [self.master.build_lut(), self.red.build_lut(), self.green.build_lut(), self.blue.build_lut()]
    }
}

/// Levels adjustment layer stretched to `buffer`'s luminance range.
pub fn auto_levels(buffer: &PixelBuffer) -> AdjustmentLayer {
    AdjustmentLayer::Levels(Levels::auto(buffer))
}

// ============================================================================
// CURVES
// ============================================================================

/// Control points `(input, output)` in 0..=255 with strictly increasing input.
/// Fewer than two points means identity.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Curves {
    pub master: Vec<(f32, f32)>,
    pub red: Vec<(f32, f32)>,
    pub green: Vec<(f32, f32)>,
    pub blue: Vec<(f32, f32)>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CurveChannel {
    Master,
    Red,
    Green,
    Blue,
}

impl Curves {
    pub fn set_points(&mut self, channel: CurveChannel, points: Vec<(f32, f32)>) -> Result<()> {
        for (i, &(x, y)) in points.iter().enumerate() {
            if !(0.0..=255.0).contains(&x) || !(0.0..=255.0).contains(&y) {
                return Err(CoreError::arg(format!("curve point ({}, {}) outside 0..=255", x, y)));
            }
            if i > 0 && x <= points[i - 1].0 {
                return Err(CoreError::arg("curve inputs must be strictly increasing"));
            }
        }
        *self.channel_mut(channel) = points;
        Ok(())
    }

    pub fn points(&self, channel: CurveChannel) -> &[(f32, f32)] {
        match channel {
            CurveChannel::Master => &self.master,
            CurveChannel::Red => &self.red,
            CurveChannel::Green => &self.green,
            CurveChannel::Blue => &self.blue,
        }
    }

    fn channel_mut(&mut self, channel: CurveChannel) -> &mut Vec<(f32, f32)> {
        match channel {
            CurveChannel::Master => &mut self.master,
            CurveChannel::Red => &mut self.red,
            CurveChannel::Green => &mut self.green,
            CurveChannel::Blue => &mut self.blue,
        }
    }

    pub fn is_identity(&self) -> bool {
        let lut_is_identity = |pts: &[(f32, f32)]| {
            build_curves_lut(pts).iter().enumerate().all(|(i, &v)| v as usize == i)
        };
        [&self.master, &self.red, &self.green, &self.blue].into_iter().all(|c| lut_is_identity(c.as_slice()))
    }

    fn luts(&self) -> [[u8; 256]; 4] {
        [
            build_curves_lut(&self.master),
            build_curves_lut(&self.red),
            build_curves_lut(&self.green),
            build_curves_lut(&self.blue),
        ]
    }
}

/// 256-entry table through the control points using monotone cubic
/// (Fritsch-Carlson) interpolation. Flat outside the first/last point.
pub fn build_curves_lut(points: &[(f32, f32)]) -> [u8; 256] {
    let mut lut = [0u8; 256];
    if points.len() < 2 {
        for (i, slot) in lut.iter_mut().enumerate() {
            *slot = i as u8;
        }
        return lut;
    }

    let n = points.len();
    let delta: Vec<f32> = points
        .windows(2)
        .map(|p| {
            let dx = p[1].0 - p[0].0;
            if dx.abs() < 1e-6 { 0.0 } else { (p[1].1 - p[0].1) / dx }
        })
        .collect();

    // Tangents
    let mut m = vec![0.0f32; n];
    m[0] = delta[0];
    m[n - 1] = delta[n - 2];
    for i in 1..n - 1 {
        m[i] = if delta[i - 1] * delta[i] <= 0.0 { 0.0 } else { (delta[i - 1] + delta[i]) / 2.0 };
    }

    // Monotonicity constraint
    for i in 0..n - 1 {
        if delta[i].abs() < 1e-6 {
            m[i] = 0.0;
            m[i + 1] = 0.0;
        } else {
            let alpha = m[i] / delta[i];
            let beta = m[i + 1] / delta[i];
            let s = alpha * alpha + beta * beta;
            if s > 9.0 {
                let tau = 3.0 / s.sqrt();
                m[i] = tau * alpha * delta[i];
                m[i + 1] = tau * beta * delta[i];
            }
        }
    }

    for (i, slot) in lut.iter_mut().enumerate() {
        let x = i as f32;
        let val = if x <= points[0].0 {
            points[0].1
        } else if x >= points[n - 1].0 {
            points[n - 1].1
        } else {
            let seg = points.iter().rposition(|p| x >= p.0).unwrap_or(0).min(n - 2);
            let (x0, y0) = points[seg];
            let (x1, y1) = points[seg + 1];
            let h = x1 - x0;
            if h.abs() < 1e-6 {
                y0
            } else {
                let t = (x - x0) / h;
                let t2 = t * t;
                let t3 = t2 * t;
                let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
                let h10 = t3 - 2.0 * t2 + t;
                let h01 = -2.0 * t3 + 3.0 * t2;
                let h11 = t3 - t2;
                h00 * y0 + h10 * h * m[seg] + h01 * y1 + h11 * h * m[seg + 1]
            }
        };
        *slot = val.round().clamp(0.0, 255.0) as u8;
    }
    lut
}

// ============================================================================
// HUE / SATURATION
// ============================================================================

/// Shift applied to pixels near one hue band.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HueBand {
    pub hue: f32,        // -180..180 degrees
    pub saturation: f32, // -100..100
    pub lightness: f32,  // -100..100
}

impl HueBand {
    fn is_identity(&self) -> bool {
        self.hue == 0.0 && self.saturation == 0.0 && self.lightness == 0.0
    }
}

/// Reds, Yellows, Greens, Cyans, Blues, Magentas
pub const BAND_NAMES: [&str; 6] = ["reds", "yellows", "greens", "cyans", "blues", "magentas"];
const BAND_CENTERS: [f32; 6] = [0.0, 60.0, 120.0, 180.0, 240.0, 300.0];

/// Full weight within ±15° of the band centre, linear falloff over the next
/// 30°. Neighbouring bands sum to 1 everywhere on the wheel.
pub fn band_weight(pixel_hue_deg: f32, band_center_deg: f32) -> f32 {
    let mut dist = (pixel_hue_deg - band_center_deg).abs() % 360.0;
    if dist > 180.0 {
        dist = 360.0 - dist;
    }
    if dist <= 15.0 {
        1.0
    } else if dist < 45.0 {
        1.0 - (dist - 15.0) / 30.0
    } else {
        0.0
    }
}

/// Master HSL shift plus six hue-localized shifts. In colorize mode `hue` is
/// the absolute target hue and `saturation` maps -100..100 onto 0..1.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HueSaturation {
    pub hue: f32,
    pub saturation: f32,
    pub lightness: f32,
    pub bands: [HueBand; 6],
    pub colorize: bool,
}

impl HueSaturation {
    pub fn is_identity(&self) -> bool {
        !self.colorize
            && self.hue == 0.0
            && self.saturation == 0.0
            && self.lightness == 0.0
            && self.bands.iter().all(HueBand::is_identity)
    }

    fn apply_pixel(&self, r: f32, g: f32, b: f32) -> [f32; 3] {
        let (h, s, l) = rgb_to_hsl_unit(r / 255.0, g / 255.0, b / 255.0);
        let light = self.lightness * 255.0 / 100.0;

        if self.colorize {
            let nh = normalize_hue(self.hue) / 360.0;
            let ns = ((self.saturation + 100.0) / 200.0).clamp(0.0, 1.0);
            let (nr, ng, nb) = hsl_to_rgb_unit(nh, ns, l);
            return [nr * 255.0 + light, ng * 255.0 + light, nb * 255.0 + light];
        }

        let h_deg = h * 360.0;
        let mut hue_shift = self.hue;
        let mut sat_factor = 1.0 + self.saturation / 100.0;
        let mut light_offset = light;
        // Achromatic pixels have no meaningful hue band.
        if s > 1e-6 {
            for (band, &center) in self.bands.iter().zip(BAND_CENTERS.iter()) {
                let w = band_weight(h_deg, center);
                if w > 0.0 {
                    hue_shift += band.hue * w;
                    sat_factor += band.saturation / 100.0 * w;
                    light_offset += band.lightness * 255.0 / 100.0 * w;
                }
            }
        }

        let nh = normalize_hue(h_deg + hue_shift) / 360.0;
        let ns = (s * sat_factor).clamp(0.0, 1.0);
        let (nr, ng, nb) = hsl_to_rgb_unit(nh, ns, l);
        [nr * 255.0 + light_offset, ng * 255.0 + light_offset, nb * 255.0 + light_offset]
    }
}

// ============================================================================
// ADJUSTMENT LAYER
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AdjustmentLayer {
    /// brightness, contrast: -100..100
    BrightnessContrast { brightness: f32, contrast: f32 },
    Levels(Levels),
    Curves(Curves),
    HueSaturation(HueSaturation),
    /// EV stops, -5..5
    Exposure { exposure: f32 },
    Invert,
    /// Luminance cut-off, 0..255
    Threshold { level: f32 },
    /// Tonal levels per channel, 2..256 (256 = identity)
    Posterize { levels: f32 },
}

const BC_PARAMS: &[ParamDef] = &[param("brightness", -100.0, 100.0, 0.0), param("contrast", -100.0, 100.0, 0.0)];
const EXPOSURE_PARAMS: &[ParamDef] = &[param("exposure", -5.0, 5.0, 0.0)];
const THRESHOLD_PARAMS: &[ParamDef] = &[param("level", 0.0, 255.0, 128.0)];
const POSTERIZE_PARAMS: &[ParamDef] = &[param("levels", 2.0, 256.0, 8.0)];

/// A live, named handle on one parameter.
struct Slot<'a> {
    name: String,
    min: f32,
    max: f32,
    value: &'a mut f32,
}

impl<'a> Slot<'a> {
    fn new(name: impl Into<String>, min: f32, max: f32, value: &'a mut f32) -> Self {
        Self { name: name.into(), min, max, value }
    }
}

fn fixed<'a>(defs: &'static [ParamDef], values: Vec<&'a mut f32>) -> Vec<Slot<'a>> {
    defs.iter().zip(values).map(|(d, v)| Slot::new(d.name, d.min, d.max, v)).collect()
}

fn levels_slots<'a>(prefix: &str, ch: &'a mut LevelsChannel) -> [Slot<'a>; 5] {
    let LevelsChannel { input_black, input_white, gamma, output_black, output_white } = ch;
    [
        Slot::new(format!("{prefix}input_black"), 0.0, 255.0, input_black),
        Slot::new(format!("{prefix}input_white"), 0.0, 255.0, input_white),
        Slot::new(format!("{prefix}gamma"), 0.1, 10.0, gamma),
        Slot::new(format!("{prefix}output_black"), 0.0, 255.0, output_black),
        Slot::new(format!("{prefix}output_white"), 0.0, 255.0, output_white),
    ]
}

impl AdjustmentLayer {
    pub fn brightness_contrast() -> Self {
        AdjustmentLayer::BrightnessContrast { brightness: 0.0, contrast: 0.0 }
    }

    pub fn exposure() -> Self {
        AdjustmentLayer::Exposure { exposure: 0.0 }
    }

    pub fn threshold() -> Self {
        AdjustmentLayer::Threshold { level: 128.0 }
    }

    pub fn posterize() -> Self {
        AdjustmentLayer::Posterize { levels: 8.0 }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AdjustmentLayer::BrightnessContrast { .. } => "Brightness/Contrast",
            AdjustmentLayer::Levels(_) => "Levels",
            AdjustmentLayer::Curves(_) => "Curves",
            AdjustmentLayer::HueSaturation(_) => "Hue/Saturation",
            AdjustmentLayer::Exposure { .. } => "Exposure",
            AdjustmentLayer::Invert => "Invert",
            AdjustmentLayer::Threshold { .. } => "Threshold",
            AdjustmentLayer::Posterize { .. } => "Posterize",
        }
    }

    /// Whether `apply` would change anything.
    pub fn has_effect(&self) -> bool {
        match self {
            AdjustmentLayer::BrightnessContrast { brightness, contrast } => *brightness != 0.0 || *contrast != 0.0,
            AdjustmentLayer::Levels(levels) => {
                [levels.master, levels.red, levels.green, levels.blue].iter().any(|c| !c.is_identity())
            }
            AdjustmentLayer::Curves(curves) => !curves.is_identity(),
            AdjustmentLayer::HueSaturation(hs) => !hs.is_identity(),
            AdjustmentLayer::Exposure { exposure } => *exposure != 0.0,
            AdjustmentLayer::Invert | AdjustmentLayer::Threshold { .. } => true,
            AdjustmentLayer::Posterize { levels } => levels.round() < 256.0,
        }
    }

    fn slots(&mut self) -> Vec<Slot<'_>> {
        match self {
            AdjustmentLayer::BrightnessContrast { brightness, contrast } => fixed(BC_PARAMS, vec![brightness, contrast]),
            AdjustmentLayer::Exposure { exposure } => fixed(EXPOSURE_PARAMS, vec![exposure]),
            AdjustmentLayer::Threshold { level } => fixed(THRESHOLD_PARAMS, vec![level]),
            AdjustmentLayer::Posterize { levels } => fixed(POSTERIZE_PARAMS, vec![levels]),
            AdjustmentLayer::Levels(Levels { master, red, green, blue }) => {
                let mut slots = Vec::with_capacity(20);
                slots.extend(levels_slots("", master));
                slots.extend(levels_slots("red.", red));
                slots.extend(levels_slots("green.", green));
                slots.extend(levels_slots("blue.", blue));
                slots
            }
            AdjustmentLayer::HueSaturation(HueSaturation { hue, saturation, lightness, bands, .. }) => {
                let mut slots = vec![
                    Slot::new("hue", -180.0, 360.0, hue),
                    Slot::new("saturation", -100.0, 100.0, saturation),
                    Slot::new("lightness", -100.0, 100.0, lightness),
                ];
                for (band, name) in bands.iter_mut().zip(BAND_NAMES) {
                    let HueBand { hue, saturation, lightness } = band;
                    slots.push(Slot::new(format!("{name}.hue"), -180.0, 180.0, hue));
                    slots.push(Slot::new(format!("{name}.saturation"), -100.0, 100.0, saturation));
                    slots.push(Slot::new(format!("{name}.lightness"), -100.0, 100.0, lightness));
                }
                slots
            }
            AdjustmentLayer::Curves(_) | AdjustmentLayer::Invert => Vec::new(),
        }
    }

    /// Current `(name, value)` pairs in declaration order.
    pub fn params(&self) -> Vec<(String, f32)> {
        let mut copy = self.clone();
        let mut out: Vec<(String, f32)> = copy.slots().into_iter().map(|s| (s.name, *s.value)).collect();
        if let AdjustmentLayer::HueSaturation(hs) = self {
            out.push(("colorize".to_string(), if hs.colorize { 1.0 } else { 0.0 }));
        }
        out
    }

    pub fn param(&self, name: &str) -> Option<f32> {
        self.params().into_iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Set one parameter. Unknown names and out-of-range values are rejected
    /// and leave the layer unchanged.
    pub fn set_param(&mut self, name: &str, value: f32) -> Result<()> {
        if !value.is_finite() {
            return Err(CoreError::arg(format!("{} '{}' must be finite", self.name(), name)));
        }
        if let AdjustmentLayer::HueSaturation(hs) = self
            && name == "colorize"
        {
            if !(0.0..=1.0).contains(&value) {
                return Err(CoreError::arg(format!("colorize {} outside [0, 1]", value)));
            }
            hs.colorize = value >= 0.5;
            return Ok(());
        }
        let kind = self.name();
        let mut slots = self.slots();
        let slot = slots
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| CoreError::arg(format!("{} has no parameter '{}'", kind, name)))?;
        if value < slot.min || value > slot.max {
            return Err(CoreError::arg(format!(
                "{} '{}' = {} outside [{}, {}]",
                kind, name, value, slot.min, slot.max
            )));
        }
        *slot.value = value;
        Ok(())
    }

    /// Set several parameters at once; on any error none are applied.
    pub fn set_params<'n>(&mut self, values: impl IntoIterator<Item = (&'n str, f32)>) -> Result<()> {
        let mut staged = self.clone();
        for (name, value) in values {
            staged.set_param(name, value)?;
        }
        *self = staged;
        Ok(())
    }

    pub fn apply(&self, src: &PixelBuffer) -> PixelBuffer {
        if !self.has_effect() {
            return src.clone();
        }
        let out = match self {
            AdjustmentLayer::BrightnessContrast { brightness, contrast } => {
                let (brightness, contrast) = (*brightness, *contrast);
                let factor = (259.0 * (contrast + 255.0)) / (255.0 * (259.0 - contrast));
                map_pixels(src, None, None, move |_, _, [r, g, b, a]| {
                    [
                        factor * (r + brightness - 128.0) + 128.0,
                        factor * (g + brightness - 128.0) + 128.0,
                        factor * (b + brightness - 128.0) + 128.0,
                        a,
                    ]
                })
            }
            AdjustmentLayer::Levels(levels) => apply_luts(src, levels.luts()),
            AdjustmentLayer::Curves(curves) => apply_luts(src, curves.luts()),
            AdjustmentLayer::HueSaturation(hs) => map_pixels(src, None, None, |_, _, [r, g, b, a]| {
                let [nr, ng, nb] = hs.apply_pixel(r, g, b);
                [nr, ng, nb, a]
            }),
            AdjustmentLayer::Exposure { exposure } => {
                let gain = 2.0f32.powf(*exposure);
                map_pixels(src, None, None, move |_, _, [r, g, b, a]| [r * gain, g * gain, b * gain, a])
            }
            AdjustmentLayer::Invert => {
                map_pixels(src, None, None, |_, _, [r, g, b, a]| [255.0 - r, 255.0 - g, 255.0 - b, a])
            }
            AdjustmentLayer::Threshold { level } => {
                let level = *level;
                map_pixels(src, None, None, move |_, _, [r, g, b, a]| {
                    let v = if luminance(r, g, b) >= level { 255.0 } else { 0.0 };
                    [v, v, v, a]
                })
            }
            AdjustmentLayer::Posterize { levels } => {
                let steps = levels.round().max(2.0) - 1.0;
                map_pixels(src, None, None, move |_, _, [r, g, b, a]| {
                    let p = |v: f32| (v / 255.0 * steps).round() / steps * 255.0;
                    [p(r), p(g), p(b), a]
                })
            }
        };
        out.unwrap_or_else(|| src.clone())
    }
}

/// Master table first, then the per-channel table.
fn apply_luts(src: &PixelBuffer, luts: [[u8; 256]; 4]) -> Option<PixelBuffer> {
    let [m, r, g, b] = luts;
    map_pixels(src, None, None, move |_, _, [pr, pg, pb, a]| {
        [
            r[m[pr as usize] as usize] as f32,
            g[m[pg as usize] as usize] as f32,
            b[m[pb as usize] as usize] as f32,
            a,
        ]
    })
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Ordered adjustments applied bottom-to-top.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentPipeline {
    layers: Vec<AdjustmentLayer>,
}

impl AdjustmentPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, layer: AdjustmentLayer) {
        self.layers.push(layer);
    }

    pub fn remove(&mut self, index: usize) -> Result<AdjustmentLayer> {
        if index >= self.layers.len() {
            return Err(CoreError::arg(format!("no adjustment at index {}", index)));
        }
        Ok(self.layers.remove(index))
    }

    pub fn layers(&self) -> &[AdjustmentLayer] {
        &self.layers
    }

    pub fn get_mut(&mut self, index: usize) -> Result<&mut AdjustmentLayer> {
        self.layers
            .get_mut(index)
            .ok_or_else(|| CoreError::arg(format!("no adjustment at index {}", index)))
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn has_effect(&self) -> bool {
        self.layers.iter().any(AdjustmentLayer::has_effect)
    }

    /// Run every layer with an effect, in order.
    pub fn apply(&self, src: &PixelBuffer) -> PixelBuffer {
        let mut active = self.layers.iter().filter(|l| l.has_effect());
        let Some(first) = active.next() else {
            return src.clone();
        };
        active.fold(first.apply(src), |acc, layer| layer.apply(&acc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;

    #[test]
    fn default_levels_lut_is_identity() {
        let lut = LevelsChannel::default().build_lut();
        assert!(lut.iter().enumerate().all(|(i, &v)| v as usize == i));
    }

    #[test]
    fn collapsed_input_range_does_not_divide_by_zero() {
        let ch = LevelsChannel { input_black: 100.0, input_white: 100.0, ..Default::default() };
        let lut = ch.build_lut();
        assert_eq!(lut[99], 0);
        assert_eq!(lut[101], 255);
    }

    #[test]
    fn curves_through_diagonal_is_identity() {
        let curves = Curves { master: vec![(0.0, 0.0), (128.0, 128.0), (255.0, 255.0)], ..Default::default() };
        assert!(curves.is_identity());
        assert!(!AdjustmentLayer::Curves(curves).has_effect());
    }

    #[test]
    fn curves_reject_unsorted_points() {
        let mut curves = Curves::default();
        assert!(curves.set_points(CurveChannel::Red, vec![(10.0, 0.0), (5.0, 255.0)]).is_err());
        assert!(curves.red.is_empty());
    }

    #[test]
    fn band_weights_partition_the_wheel() {
        for h in 0..360 {
            let sum: f32 = BAND_CENTERS.iter().map(|&c| band_weight(h as f32, c)).sum();
            assert!((sum - 1.0).abs() < 1e-4, "hue {} sums to {}", h, sum);
        }
    }

    #[test]
    fn set_param_range_checks() {
        let mut bc = AdjustmentLayer::brightness_contrast();
        assert!(bc.set_param("brightness", 150.0).is_err());
        assert!(bc.set_param("gamma", 1.0).is_err());
        bc.set_param("brightness", 20.0).unwrap();
        assert_eq!(bc.param("brightness"), Some(20.0));
    }

    #[test]
    fn batch_is_all_or_nothing() {
        let mut levels = AdjustmentLayer::Levels(Levels::default());
        let err = levels.set_params([("input_black", 10.0), ("red.gamma", 50.0)]);
        assert!(err.is_err());
        assert_eq!(levels.param("input_black"), Some(0.0));
        levels.set_params([("input_black", 10.0), ("red.gamma", 2.0)]).unwrap();
        assert_eq!(levels.param("red.gamma"), Some(2.0));
    }

    #[test]
    fn invert_twice_is_identity() {
        let src = PixelBuffer::filled(4, 4, Color::rgba(10, 200, 30, 128)).unwrap();
        let once = AdjustmentLayer::Invert.apply(&src);
        assert_eq!(once.pixel(0, 0), Some(image::Rgba([245, 55, 225, 128])));
        assert_eq!(AdjustmentLayer::Invert.apply(&once), src);
    }

    #[test]
    fn pipeline_skips_identity_layers() {
        let mut pipeline = AdjustmentPipeline::new();
        pipeline.push(AdjustmentLayer::exposure());
        pipeline.push(AdjustmentLayer::HueSaturation(HueSaturation::default()));
        assert!(!pipeline.has_effect());
        let src = PixelBuffer::filled(2, 2, Color::rgb(1, 2, 3)).unwrap();
        assert_eq!(pipeline.apply(&src), src);
    }

    #[test]
    fn colorize_keeps_lightness_of_gray() {
        let hs = HueSaturation { colorize: true, hue: 120.0, ..Default::default() };
        let [r, g, b] = hs.apply_pixel(128.0, 128.0, 128.0);
        assert!(g > r && g > b);
        let (_, _, l) = rgb_to_hsl_unit(r / 255.0, g / 255.0, b / 255.0);
        assert!((l - 128.0 / 255.0).abs() < 0.01);
    }
}
