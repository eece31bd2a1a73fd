pub mod adjustments;
pub mod effects;
pub mod filters;
pub mod selection;
pub mod transform;

use image::{Rgba, RgbaImage};
use rayon::prelude::*;

use crate::pixels::{Mask, PixelBuffer};
use crate::task::CancelToken;

// ============================================================================
// SHARED HELPERS
// ============================================================================

/// A named numeric parameter with its accepted range and default.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParamDef {
    pub name: &'static str,
    pub min: f32,
    pub max: f32,
    pub default: f32,
}

pub(crate) const fn param(name: &'static str, min: f32, max: f32, default: f32) -> ParamDef {
    ParamDef { name, min, max, default }
}

impl ParamDef {
    pub fn contains(&self, value: f32) -> bool {
        value.is_finite() && value >= self.min && value <= self.max
    }
}

/// Simple hash for deterministic noise.
#[inline]
pub(crate) fn hash_u32(mut x: u32) -> u32 {
    x = x.wrapping_mul(0x9E3779B9);
    x ^= x >> 16;
    x = x.wrapping_mul(0x85EBCA6B);
    x ^= x >> 13;
    x = x.wrapping_mul(0xC2B2AE35);
    x ^= x >> 16;
    x
}

/// Hash to f32 in [0, 1).
#[inline]
pub(crate) fn hash_f32(x: u32, y: u32, seed: u32) -> f32 {
    let h = hash_u32(
        x.wrapping_mul(374761393)
            .wrapping_add(y.wrapping_mul(668265263))
            .wrapping_add(seed),
    );
    (h & 0x00FFFFFF) as f32 / 16777216.0
}

/// Edge-clamped pixel fetch.
#[inline]
pub(crate) fn sample_clamped(img: &RgbaImage, x: i32, y: i32) -> [f32; 4] {
    let cx = x.clamp(0, img.width() as i32 - 1) as u32;
    let cy = y.clamp(0, img.height() as i32 - 1) as u32;
    let p = img.get_pixel(cx, cy);
    [p[0] as f32, p[1] as f32, p[2] as f32, p[3] as f32]
}

#[inline]
pub(crate) fn to_rgba(px: [f32; 4]) -> Rgba<u8> {
    Rgba([
        px[0].round().clamp(0.0, 255.0) as u8,
        px[1].round().clamp(0.0, 255.0) as u8,
        px[2].round().clamp(0.0, 255.0) as u8,
        px[3].round().clamp(0.0, 255.0) as u8,
    ])
}

/// Run `f` over every pixel, row-parallel. Mask value 0 keeps the source
/// pixel, 255 takes the result, values between blend the two.
/// Returns `None` when `cancel` fires before every row is done.
pub(crate) fn map_pixels<F>(
    src: &PixelBuffer,
    mask: Option<&Mask>,
    cancel: Option<&CancelToken>,
    f: F,
) -> Option<PixelBuffer>
where
    F: Fn(u32, u32, [f32; 4]) -> [f32; 4] + Sync,
{
    map_rows(src, mask, cancel, |img, x, y| {
        let p = img.get_pixel(x, y);
        f(x, y, [p[0] as f32, p[1] as f32, p[2] as f32, p[3] as f32])
    })
}

/// Like `map_pixels` but the closure may read any source pixel.
pub(crate) fn map_rows<F>(
    src: &PixelBuffer,
    mask: Option<&Mask>,
    cancel: Option<&CancelToken>,
    processor: F,
) -> Option<PixelBuffer>
where
    F: Fn(&RgbaImage, u32, u32) -> [f32; 4] + Sync,
{
    let (w, h) = src.dimensions();
    let (w, h) = (w as usize, h as usize);
    let flat = src.image();
    let src_raw = flat.as_raw();
    let stride = w * 4;

    let mask_raw = mask.map(|m| m.as_raw());
    let mask_w = mask.map_or(0, |m| m.width() as usize);
    let mask_h = mask.map_or(0, |m| m.height() as usize);

    let mut out = RgbaImage::new(w as u32, h as u32);
    out.par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
        let row_in = &src_raw[y * stride..(y + 1) * stride];
        if cancel.is_some_and(|c| c.is_cancelled()) {
            return;
        }
        for x in 0..w {
            let pi = x * 4;
            let coverage = match mask_raw {
                Some(mr) if x < mask_w && y < mask_h => mr[y * mask_w + x],
                Some(_) => 0,
                None => 255,
            };
            if coverage == 0 {
                row_out[pi..pi + 4].copy_from_slice(&row_in[pi..pi + 4]);
                continue;
            }
            let mut px = processor(flat, x as u32, y as u32);
            if coverage < 255 {
                let t = coverage as f32 / 255.0;
                for c in 0..4 {
                    px[c] = row_in[pi + c] as f32 + (px[c] - row_in[pi + c] as f32) * t;
                }
            }
            let v = to_rgba(px);
            row_out[pi..pi + 4].copy_from_slice(&v.0);
        }
    });

    if cancel.is_some_and(|c| c.is_cancelled()) {
        return None;
    }
    Some(PixelBuffer::from_image(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic_and_unit_range() {
        for i in 0..100 {
            let v = hash_f32(i, i * 3, 42);
            assert!((0.0..1.0).contains(&v));
            assert_eq!(v, hash_f32(i, i * 3, 42));
        }
    }

    #[test]
    fn zero_mask_keeps_source() {
        let src = PixelBuffer::filled(4, 4, crate::color::Color::rgb(10, 20, 30)).unwrap();
        let mask = Mask::new(4, 4);
        let out = map_pixels(&src, Some(&mask), None, |_, _, _| [255.0; 4]).unwrap();
        assert_eq!(out, src);
    }

    #[test]
    fn cancelled_map_returns_none() {
        let src = PixelBuffer::new(8, 8).unwrap();
        let token = CancelToken::new();
        token.cancel();
        assert!(map_pixels(&src, None, Some(&token), |_, _, p| p).is_none());
    }
}
