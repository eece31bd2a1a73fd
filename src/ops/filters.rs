// ============================================================================
// FILTERS: parameterised whole-buffer filters with a result cache
// ============================================================================

use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::RgbaImage;
use lru::LruCache;
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{CoreError, Result};
use crate::ops::{ParamDef, hash_f32, map_pixels, map_rows, param, sample_clamped};
use crate::pixels::{Mask, PixelBuffer};
use crate::task::{CancelToken, TaskOutcome};
use crate::{log_debug, log_info};

// ============================================================================
// GAUSSIAN BLUR CORE
// ============================================================================

/// Normalised 1-D Gaussian, radius `ceil(3σ)`.
pub(crate) fn build_gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (sigma * 3.0).ceil().max(0.0) as usize;
    if radius == 0 || sigma <= 0.0 {
        return vec![1.0];
    }
    let len = radius * 2 + 1;
    let mut kernel = vec![0.0f32; len];
    let s2 = 2.0 * sigma * sigma;
    let mut sum = 0.0f32;
    for (i, k) in kernel.iter_mut().enumerate() {
        let x = i as f32 - radius as f32;
        let v = (-x * x / s2).exp();
        *k = v;
        sum += v;
    }
    let inv = 1.0 / sum;
    for v in &mut kernel {
        *v *= inv;
    }
    kernel
}

/// Separable Gaussian over an interleaved f32 buffer with `channels` values per
/// pixel. Edges are clamped. `None` when cancelled.
pub(crate) fn blur_channels(
    data: &[f32],
    width: usize,
    height: usize,
    channels: usize,
    sigma: f32,
    cancel: Option<&CancelToken>,
) -> Option<Vec<f32>> {
    if width == 0 || height == 0 {
        return Some(data.to_vec());
    }
    let kernel = build_gaussian_kernel(sigma);
    if kernel.len() == 1 {
        return Some(data.to_vec());
    }
    let radius = kernel.len() / 2;
    let stride = width * channels;
    let cancelled = || cancel.is_some_and(|c| c.is_cancelled());

    // --- Horizontal pass (parallel by row) ---
    let mut buf_h = vec![0.0f32; data.len()];
    buf_h.par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
        if cancelled() {
            return;
        }
        let row_in = &data[y * stride..(y + 1) * stride];
        for x in 0..width {
            for c in 0..channels {
                let mut acc = 0.0f32;
                for (ki, &kv) in kernel.iter().enumerate() {
                    let sx = (x as isize + ki as isize - radius as isize).clamp(0, width as isize - 1) as usize;
                    acc += row_in[sx * channels + c] * kv;
                }
                row_out[x * channels + c] = acc;
            }
        }
    });
    if cancelled() {
        return None;
    }

    // --- Vertical pass (parallel by row) ---
    let mut buf_v = vec![0.0f32; data.len()];
    buf_v.par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
        if cancelled() {
            return;
        }
        for x in 0..width {
            for c in 0..channels {
                let mut acc = 0.0f32;
                for (ki, &kv) in kernel.iter().enumerate() {
                    let sy = (y as isize + ki as isize - radius as isize).clamp(0, height as isize - 1) as usize;
                    acc += buf_h[sy * stride + x * channels + c] * kv;
                }
                row_out[x * channels + c] = acc;
            }
        }
    });
    if cancelled() {
        return None;
    }
    Some(buf_v)
}

/// Blur an RGBA buffer, optionally limited to a mask.
pub fn gaussian_blur(src: &PixelBuffer, sigma: f32, mask: Option<&Mask>) -> PixelBuffer {
    gaussian_blur_cancellable(src, sigma, mask, None).unwrap_or_else(|| src.clone())
}

fn gaussian_blur_cancellable(
    src: &PixelBuffer,
    sigma: f32,
    mask: Option<&Mask>,
    cancel: Option<&CancelToken>,
) -> Option<PixelBuffer> {
    let (w, h) = src.dimensions();
    let data: Vec<f32> = src.as_raw().iter().map(|&b| b as f32).collect();
    let blurred = blur_channels(&data, w as usize, h as usize, 4, sigma, cancel)?;
    map_pixels(src, mask, cancel, |x, y, _| {
        let i = (y as usize * w as usize + x as usize) * 4;
        [blurred[i], blurred[i + 1], blurred[i + 2], blurred[i + 3]]
    })
}

// ============================================================================
// FILTER DESCRIPTIONS
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoiseType {
    Uniform,
    Gaussian,
    SaltPepper,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterKind {
    GaussianBlur,
    Sharpen,
    EdgeDetect,
    Emboss,
    Noise(NoiseType),
    OilPaint,
    Watercolor,
    Vintage,
}

const BLUR_PARAMS: &[ParamDef] = &[param("sigma", 0.1, 100.0, 2.0)];
const AMOUNT_PARAMS: &[ParamDef] = &[param("amount", 0.0, 5.0, 1.0)];
const NOISE_PARAMS: &[ParamDef] = &[param("amount", 0.0, 100.0, 20.0), param("monochrome", 0.0, 1.0, 0.0)];
const OIL_PARAMS: &[ParamDef] = &[param("radius", 1.0, 10.0, 3.0), param("levels", 2.0, 64.0, 20.0)];
const WATERCOLOR_PARAMS: &[ParamDef] = &[
    param("sigma", 0.5, 20.0, 3.0),
    param("levels", 2.0, 32.0, 8.0),
    param("edge_strength", 0.0, 2.0, 1.0),
];
const VINTAGE_PARAMS: &[ParamDef] = &[param("sepia", 0.0, 1.0, 0.8), param("vignette", 0.0, 1.0, 0.5)];

impl FilterKind {
    pub fn name(&self) -> &'static str {
        match self {
            FilterKind::GaussianBlur => "Gaussian Blur",
            FilterKind::Sharpen => "Sharpen",
            FilterKind::EdgeDetect => "Edge Detect",
            FilterKind::Emboss => "Emboss",
            FilterKind::Noise(NoiseType::Uniform) => "Uniform Noise",
            FilterKind::Noise(NoiseType::Gaussian) => "Gaussian Noise",
            FilterKind::Noise(NoiseType::SaltPepper) => "Salt & Pepper Noise",
            FilterKind::OilPaint => "Oil Paint",
            FilterKind::Watercolor => "Watercolor",
            FilterKind::Vintage => "Vintage",
        }
    }

    /// Whether a GPU backend could run this filter. The crate ships none, so
    /// every filter executes on the CPU path.
    pub fn gpu_capable(&self) -> bool {
        matches!(
            self,
            FilterKind::GaussianBlur | FilterKind::Sharpen | FilterKind::EdgeDetect | FilterKind::Emboss | FilterKind::Noise(_)
        )
    }

    pub fn params(&self) -> &'static [ParamDef] {
        match self {
            FilterKind::GaussianBlur => BLUR_PARAMS,
            FilterKind::Sharpen | FilterKind::EdgeDetect | FilterKind::Emboss => AMOUNT_PARAMS,
            FilterKind::Noise(_) => NOISE_PARAMS,
            FilterKind::OilPaint => OIL_PARAMS,
            FilterKind::Watercolor => WATERCOLOR_PARAMS,
            FilterKind::Vintage => VINTAGE_PARAMS,
        }
    }
}

/// A pure filter request: the same spec on the same input yields the same output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub kind: FilterKind,
    pub params: BTreeMap<String, f32>,
    pub seed: u64,
}

impl FilterSpec {
    pub fn new(kind: FilterKind) -> Self {
        Self { kind, params: BTreeMap::new(), seed: 0 }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: f32) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Explicit value, else the declared default.
    pub fn param(&self, name: &str) -> f32 {
        self.params.get(name).copied().unwrap_or_else(|| {
            self.kind.params().iter().find(|p| p.name == name).map_or(0.0, |p| p.default)
        })
    }

    /// Reject unknown names and out-of-range values.
    pub fn validate(&self) -> Result<()> {
        let defs = self.kind.params();
        for (name, &value) in &self.params {
            let def = defs.iter().find(|d| d.name == name).ok_or_else(|| {
                CoreError::arg(format!("{} has no parameter '{}'", self.kind.name(), name))
            })?;
            if !def.contains(value) {
                return Err(CoreError::arg(format!(
                    "{} '{}' = {} outside [{}, {}]",
                    self.kind.name(),
                    name,
                    value,
                    def.min,
                    def.max
                )));
            }
        }
        Ok(())
    }

    /// Hash of the bincode encoding; the spec half of a cache key.
    pub fn cache_hash(&self) -> Result<u64> {
        let bytes = bincode::serialize(self)
            .map_err(|e| CoreError::arg(format!("encoding filter spec: {}", e)))?;
        let mut hasher = DefaultHasher::new();
        bytes.hash(&mut hasher);
        Ok(hasher.finish())
    }
}

// ============================================================================
// RESULT CACHE
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub source_id: u64,
    pub width: u32,
    pub height: u32,
    pub spec_hash: u64,
}

impl CacheKey {
    pub fn new(buffer: &PixelBuffer, spec: &FilterSpec) -> Result<Self> {
        Ok(Self {
            source_id: buffer.source_id(),
            width: buffer.width(),
            height: buffer.height(),
            spec_hash: spec.cache_hash()?,
        })
    }
}

/// Bounded LRU of filter results; entries also expire after `ttl`.
pub struct FilterCache {
    entries: LruCache<CacheKey, (Instant, Arc<PixelBuffer>)>,
    ttl: Duration,
}

impl FilterCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self { entries: LruCache::new(capacity), ttl }
    }

    pub fn get(&mut self, key: &CacheKey) -> Option<Arc<PixelBuffer>> {
        self.get_at(key, Instant::now())
    }

    /// Lookup as of `now`; expired entries are dropped.
    pub fn get_at(&mut self, key: &CacheKey, now: Instant) -> Option<Arc<PixelBuffer>> {
        let (stored, _) = self.entries.peek(key)?;
        if now.saturating_duration_since(*stored) > self.ttl {
            self.entries.pop(key);
            return None;
        }
        self.entries.get(key).map(|(_, image)| Arc::clone(image))
    }

    pub fn insert(&mut self, key: CacheKey, image: Arc<PixelBuffer>) {
        self.insert_at(key, image, Instant::now());
    }

    pub fn insert_at(&mut self, key: CacheKey, image: Arc<PixelBuffer>, now: Instant) {
        self.entries.put(key, (now, image));
    }

    pub fn purge_expired(&mut self, now: Instant) {
        let ttl = self.ttl;
        let stale: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|(_, (stored, _))| now.saturating_duration_since(*stored) > ttl)
            .map(|(k, _)| *k)
            .collect();
        for key in stale {
            self.entries.pop(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct FilterEngine {
    cache: Mutex<FilterCache>,
}

impl Default for FilterEngine {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl FilterEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            cache: Mutex::new(FilterCache::new(
                config.filter_cache_capacity,
                Duration::from_secs(config.filter_cache_ttl_secs),
            )),
        }
    }

    /// Filter the whole buffer, serving repeated requests from the cache.
    pub fn apply(&self, buffer: &PixelBuffer, spec: &FilterSpec) -> Result<Arc<PixelBuffer>> {
        match self.apply_inner(buffer, spec, None)? {
            TaskOutcome::Completed(out) => Ok(out),
            TaskOutcome::Cancelled => Err(CoreError::op("uncancellable filter run was cancelled")),
        }
    }

    /// As `apply`, but checks `token` between rows.
    pub fn apply_cancellable(
        &self,
        buffer: &PixelBuffer,
        spec: &FilterSpec,
        token: &CancelToken,
    ) -> Result<TaskOutcome<Arc<PixelBuffer>>> {
        self.apply_inner(buffer, spec, Some(token))
    }

    /// Filter only where `mask` is set (partial coverage blends). Not cached.
    pub fn apply_masked(&self, buffer: &PixelBuffer, spec: &FilterSpec, mask: &Mask) -> Result<PixelBuffer> {
        spec.validate()?;
        if mask.dimensions() != buffer.dimensions() {
            return Err(CoreError::arg("selection mask does not match the buffer size"));
        }
        run_filter(buffer, spec, Some(mask), None)
            .ok_or_else(|| CoreError::op("uncancellable filter run was cancelled"))
    }

    fn apply_inner(
        &self,
        buffer: &PixelBuffer,
        spec: &FilterSpec,
        cancel: Option<&CancelToken>,
    ) -> Result<TaskOutcome<Arc<PixelBuffer>>> {
        spec.validate()?;
        let key = CacheKey::new(buffer, spec)?;
        if let Some(hit) = self.cache.lock().get(&key) {
            log_debug!("Filter cache hit: {}", spec.kind.name());
            return Ok(TaskOutcome::Completed(hit));
        }
        if spec.kind.gpu_capable() {
            log_debug!("No GPU backend, running {} on the CPU", spec.kind.name());
        }

        let start = Instant::now();
        let Some(out) = run_filter(buffer, spec, None, cancel) else {
            log_debug!("{} cancelled", spec.kind.name());
            return Ok(TaskOutcome::Cancelled);
        };
        log_info!(
            "{} on {}×{} took {:.1} ms",
            spec.kind.name(),
            buffer.width(),
            buffer.height(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        let out = Arc::new(out);
        self.cache.lock().insert(key, Arc::clone(&out));
        Ok(TaskOutcome::Completed(out))
    }

    pub fn cached_results(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }
}

fn run_filter(
    src: &PixelBuffer,
    spec: &FilterSpec,
    mask: Option<&Mask>,
    cancel: Option<&CancelToken>,
) -> Option<PixelBuffer> {
    match spec.kind {
        FilterKind::GaussianBlur => gaussian_blur_cancellable(src, spec.param("sigma"), mask, cancel),
        FilterKind::Sharpen => convolve_3x3(src, &SHARPEN_KERNEL, spec.param("amount"), mask, cancel),
        FilterKind::EdgeDetect => edge_detect(src, spec.param("amount"), mask, cancel),
        FilterKind::Emboss => convolve_3x3(src, &EMBOSS_KERNEL, spec.param("amount"), mask, cancel),
        FilterKind::Noise(kind) => {
            add_noise(src, kind, spec.param("amount"), spec.param("monochrome") >= 0.5, spec.seed, mask, cancel)
        }
        FilterKind::OilPaint => oil_paint(src, spec.param("radius") as i32, spec.param("levels") as usize, mask, cancel),
        FilterKind::Watercolor => watercolor(
            src,
            spec.param("sigma"),
            spec.param("levels") as u32,
            spec.param("edge_strength"),
            mask,
            cancel,
        ),
        FilterKind::Vintage => vintage(src, spec.param("sepia"), spec.param("vignette"), mask, cancel),
    }
}

// ============================================================================
// FILTER IMPLEMENTATIONS
// ============================================================================

const SHARPEN_KERNEL: [f32; 9] = [0.0, -1.0, 0.0, -1.0, 5.0, -1.0, 0.0, -1.0, 0.0];
const EMBOSS_KERNEL: [f32; 9] = [-2.0, -1.0, 0.0, -1.0, 1.0, 1.0, 0.0, 1.0, 2.0];
const LAPLACIAN_KERNEL: [f32; 9] = [-1.0, -1.0, -1.0, -1.0, 8.0, -1.0, -1.0, -1.0, -1.0];

#[inline]
fn kernel_at(img: &RgbaImage, kernel: &[f32; 9], x: u32, y: u32) -> [f32; 3] {
    let mut acc = [0.0f32; 3];
    for ky in 0..3 {
        for kx in 0..3 {
            let kv = kernel[ky * 3 + kx];
            if kv == 0.0 {
                continue;
            }
            let p = sample_clamped(img, x as i32 + kx as i32 - 1, y as i32 + ky as i32 - 1);
            acc[0] += p[0] * kv;
            acc[1] += p[1] * kv;
            acc[2] += p[2] * kv;
        }
    }
    acc
}

/// Fixed 3×3 kernel mixed with the source by `amount` (1 = full kernel).
fn convolve_3x3(
    src: &PixelBuffer,
    kernel: &[f32; 9],
    amount: f32,
    mask: Option<&Mask>,
    cancel: Option<&CancelToken>,
) -> Option<PixelBuffer> {
    map_rows(src, mask, cancel, |img, x, y| {
        let s = sample_clamped(img, x as i32, y as i32);
        let k = kernel_at(img, kernel, x, y);
        [
            s[0] + (k[0] - s[0]) * amount,
            s[1] + (k[1] - s[1]) * amount,
            s[2] + (k[2] - s[2]) * amount,
            s[3],
        ]
    })
}

/// Laplacian magnitude as a grayscale edge map, alpha preserved.
fn edge_detect(src: &PixelBuffer, amount: f32, mask: Option<&Mask>, cancel: Option<&CancelToken>) -> Option<PixelBuffer> {
    map_rows(src, mask, cancel, |img, x, y| {
        let k = kernel_at(img, &LAPLACIAN_KERNEL, x, y);
        let v = ((k[0].abs() + k[1].abs() + k[2].abs()) / 3.0 * amount).min(255.0);
        [v, v, v, sample_clamped(img, x as i32, y as i32)[3]]
    })
}

fn add_noise(
    src: &PixelBuffer,
    kind: NoiseType,
    amount: f32,
    monochrome: bool,
    seed: u64,
    mask: Option<&Mask>,
    cancel: Option<&CancelToken>,
) -> Option<PixelBuffer> {
    let seed = (seed ^ (seed >> 32)) as u32;
    let strength = amount * 255.0 / 100.0;

    // Signed noise sample in roughly [-1, 1] for one channel.
    let sample = move |x: u32, y: u32, channel: u32| -> f32 {
        let s = seed.wrapping_add(channel.wrapping_mul(7919));
        match kind {
            NoiseType::Uniform => hash_f32(x, y, s) * 2.0 - 1.0,
            NoiseType::Gaussian => {
                // Box-Muller
                let u1 = hash_f32(x, y, s).max(0.0001);
                let u2 = hash_f32(x, y, s.wrapping_add(7));
                (-2.0 * u1.ln()).sqrt() * (2.0 * std::f32::consts::PI * u2).cos() * 0.33
            }
            NoiseType::SaltPepper => 0.0,
        }
    };

    map_pixels(src, mask, cancel, |x, y, [r, g, b, a]| {
        if kind == NoiseType::SaltPepper {
            let density = amount / 100.0;
            let roll = hash_f32(x, y, seed);
            return if roll < density * 0.5 {
                [0.0, 0.0, 0.0, a]
            } else if roll < density {
                [255.0, 255.0, 255.0, a]
            } else {
                [r, g, b, a]
            };
        }
        if monochrome {
            let n = sample(x, y, 0) * strength;
            [r + n, g + n, b + n, a]
        } else {
            [
                r + sample(x, y, 0) * strength,
                g + sample(x, y, 1) * strength,
                b + sample(x, y, 2) * strength,
                a,
            ]
        }
    })
}

/// Each pixel takes the mean color of the most frequent intensity bucket in
/// its neighbourhood.
fn oil_paint(
    src: &PixelBuffer,
    radius: i32,
    levels: usize,
    mask: Option<&Mask>,
    cancel: Option<&CancelToken>,
) -> Option<PixelBuffer> {
    let r = radius.clamp(1, 10);
    let num_levels = levels.clamp(2, 64);

    map_rows(src, mask, cancel, |img, x, y| {
        let mut intensity_count = [0u32; 64];
        let mut sums = [[0u32; 3]; 64];
        for dy in -r..=r {
            for dx in -r..=r {
                let p = sample_clamped(img, x as i32 + dx, y as i32 + dy);
                let (pr, pg, pb) = (p[0] as u32, p[1] as u32, p[2] as u32);
                let bucket = (((pr + pg + pb) / 3) as usize * num_levels / 256).min(num_levels - 1);
                intensity_count[bucket] += 1;
                sums[bucket][0] += pr;
                sums[bucket][1] += pg;
                sums[bucket][2] += pb;
            }
        }

        let mut max_count = 0u32;
        let mut max_idx = 0usize;
        for (i, &count) in intensity_count.iter().enumerate().take(num_levels) {
            if count > max_count {
                max_count = count;
                max_idx = i;
            }
        }
        let a = sample_clamped(img, x as i32, y as i32)[3];
        let n = max_count.max(1) as f32;
        [sums[max_idx][0] as f32 / n, sums[max_idx][1] as f32 / n, sums[max_idx][2] as f32 / n, a]
    })
}

/// Blur, posterize, then darken along Sobel edges of the blurred image.
fn watercolor(
    src: &PixelBuffer,
    sigma: f32,
    levels: u32,
    edge_strength: f32,
    mask: Option<&Mask>,
    cancel: Option<&CancelToken>,
) -> Option<PixelBuffer> {
    let blurred = gaussian_blur_cancellable(src, sigma, None, cancel)?;
    let levels = levels.clamp(2, 32) as f32;
    let step = 255.0 / (levels - 1.0);
    let blurred_img = blurred.image();

    map_pixels(src, mask, cancel, |x, y, [_, _, _, a]| {
        let luma = |dx: i32, dy: i32| {
            let p = sample_clamped(blurred_img, x as i32 + dx, y as i32 + dy);
            0.299 * p[0] + 0.587 * p[1] + 0.114 * p[2]
        };
        let gx = -luma(-1, -1) - 2.0 * luma(-1, 0) - luma(-1, 1) + luma(1, -1) + 2.0 * luma(1, 0) + luma(1, 1);
        let gy = -luma(-1, -1) - 2.0 * luma(0, -1) - luma(1, -1) + luma(-1, 1) + 2.0 * luma(0, 1) + luma(1, 1);
        let edge = ((gx * gx + gy * gy).sqrt() / 1020.0).clamp(0.0, 1.0);
        let darken = (1.0 - edge * edge_strength).clamp(0.0, 1.0);

        let p = sample_clamped(blurred_img, x as i32, y as i32);
        let q = |v: f32| (v / step).round() * step * darken;
        [q(p[0]), q(p[1]), q(p[2]), a]
    })
}

/// Sepia tone blended by `sepia`, then a radial vignette.
fn vintage(
    src: &PixelBuffer,
    sepia: f32,
    vignette: f32,
    mask: Option<&Mask>,
    cancel: Option<&CancelToken>,
) -> Option<PixelBuffer> {
    let (w, h) = src.dimensions();
    let cx = w as f32 / 2.0;
    let cy = h as f32 / 2.0;
    let max_dist = (cx * cx + cy * cy).sqrt().max(1.0);

    map_pixels(src, mask, cancel, |x, y, [r, g, b, a]| {
        let sr = 0.393 * r + 0.769 * g + 0.189 * b;
        let sg = 0.349 * r + 0.686 * g + 0.168 * b;
        let sb = 0.272 * r + 0.534 * g + 0.131 * b;
        let mix = |orig: f32, tone: f32| orig + (tone.min(255.0) - orig) * sepia;

        let dx = x as f32 + 0.5 - cx;
        let dy = y as f32 + 0.5 - cy;
        let dist = (dx * dx + dy * dy).sqrt() / max_dist;
        let vf = (1.0 - vignette * dist * dist).clamp(0.0, 1.0);

        [mix(r, sr) * vf, mix(g, sg) * vf, mix(b, sb) * vf, a]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;

    #[test]
    fn kernel_radius_is_three_sigma() {
        assert_eq!(build_gaussian_kernel(2.0).len(), 2 * 6 + 1);
        let sum: f32 = build_gaussian_kernel(1.3).iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }

    #[test]
    fn blur_of_flat_color_is_unchanged() {
        let src = PixelBuffer::filled(16, 16, Color::rgb(90, 140, 200)).unwrap();
        assert_eq!(gaussian_blur(&src, 3.0, None), src);
    }

    #[test]
    fn unknown_param_is_rejected() {
        let spec = FilterSpec::new(FilterKind::GaussianBlur).with_param("radius", 3.0);
        assert!(matches!(spec.validate(), Err(CoreError::InvalidArgument(_))));
        let spec = FilterSpec::new(FilterKind::GaussianBlur).with_param("sigma", 500.0);
        assert!(spec.validate().is_err());
    }

    #[test]
    fn cache_entries_expire() {
        let mut cache = FilterCache::new(4, Duration::from_secs(300));
        let key = CacheKey { source_id: 1, width: 2, height: 2, spec_hash: 9 };
        let t0 = Instant::now();
        cache.insert_at(key, Arc::new(PixelBuffer::new(2, 2).unwrap()), t0);
        assert!(cache.get_at(&key, t0 + Duration::from_secs(10)).is_some());
        assert!(cache.get_at(&key, t0 + Duration::from_secs(301)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn cache_is_bounded() {
        let mut cache = FilterCache::new(2, Duration::from_secs(300));
        for i in 0..5 {
            let key = CacheKey { source_id: i, width: 1, height: 1, spec_hash: 0 };
            cache.insert(key, Arc::new(PixelBuffer::new(1, 1).unwrap()));
        }
        assert_eq!(cache.len(), 2);
    }
}
