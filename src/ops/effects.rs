// ============================================================================
// LAYER EFFECTS: non-destructive passes rendered at composite time
// ============================================================================
//
// Shadow, glow and stroke are drawn *under* the layer's own pixels; colour
// overlay recolours the layer in place. Effects run in list order, each one
// seeing the output of the previous.
// ============================================================================

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::error::{CoreError, Result};
use crate::ops::filters::blur_channels;
use crate::pixels::PixelBuffer;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Effect {
    /// Blurred, offset copy of the layer's alpha filled with `color`.
    DropShadow {
        offset_x: i32,
        offset_y: i32,
        blur: f32,
        color: Color,
        opacity: f32,
    },
    /// Blurred halo around the layer's alpha.
    Glow { radius: f32, color: Color, opacity: f32 },
    /// Solid outline `width` pixels outside the layer's alpha.
    Stroke { width: u32, color: Color },
    /// Replace colour, keep alpha. The colour's own alpha sets the strength.
    ColorOverlay { color: Color },
}

impl Effect {
    pub fn name(&self) -> &'static str {
        match self {
            Effect::DropShadow { .. } => "Drop Shadow",
            Effect::Glow { .. } => "Glow",
            Effect::Stroke { .. } => "Stroke",
            Effect::ColorOverlay { .. } => "Color Overlay",
        }
    }

    pub fn validate(&self) -> Result<()> {
        let check_opacity = |opacity: f32| {
            if (0.0..=1.0).contains(&opacity) {
                Ok(())
            } else {
                Err(CoreError::arg(format!("{} opacity {} outside [0, 1]", self.name(), opacity)))
            }
        };
        match *self {
            Effect::DropShadow { blur, opacity, .. } => {
                if !blur.is_finite() || blur < 0.0 {
                    return Err(CoreError::arg(format!("shadow blur {} must be >= 0", blur)));
                }
                check_opacity(opacity)
            }
            Effect::Glow { radius, opacity, .. } => {
                if !radius.is_finite() || radius < 0.0 {
                    return Err(CoreError::arg(format!("glow radius {} must be >= 0", radius)));
                }
                check_opacity(opacity)
            }
            Effect::Stroke { .. } | Effect::ColorOverlay { .. } => Ok(()),
        }
    }

    /// Render this effect over `src`, returning a new buffer of the same size.
    pub fn render(&self, src: &PixelBuffer) -> PixelBuffer {
        match *self {
            Effect::DropShadow { offset_x, offset_y, blur, color, opacity } => {
                let alpha = offset_alpha(src, offset_x, offset_y);
                let alpha = blur_alpha(&alpha, src.width(), src.height(), blur);
                composite_under(src, &alpha, color, opacity)
            }
            Effect::Glow { radius, color, opacity } => {
                let alpha = blur_alpha(&alpha_of(src), src.width(), src.height(), radius);
                composite_under(src, &alpha, color, opacity)
            }
            Effect::Stroke { width, color } => {
                let alpha = dilate_alpha(&alpha_of(src), src.width(), src.height(), width);
                composite_under(src, &alpha, color, 1.0)
            }
            Effect::ColorOverlay { color } => color_overlay(src, color),
        }
    }
}

/// Apply `effects` in order. An empty list returns a plain copy.
pub fn apply_effects(src: &PixelBuffer, effects: &[Effect]) -> PixelBuffer {
    effects.iter().fold(src.clone(), |acc, effect| effect.render(&acc))
}

// ============================================================================
// ALPHA HELPERS
// ============================================================================

fn alpha_of(src: &PixelBuffer) -> Vec<f32> {
    src.as_raw().chunks_exact(4).map(|p| p[3] as f32).collect()
}

/// Alpha channel shifted by (dx, dy); uncovered area is transparent.
fn offset_alpha(src: &PixelBuffer, dx: i32, dy: i32) -> Vec<f32> {
    let (w, h) = (src.width() as i64, src.height() as i64);
    let raw = src.as_raw();
    let mut out = vec![0.0f32; (w * h) as usize];
    for y in 0..h {
        let sy = y - dy as i64;
        if sy < 0 || sy >= h {
            continue;
        }
        for x in 0..w {
            let sx = x - dx as i64;
            if sx >= 0 && sx < w {
                out[(y * w + x) as usize] = raw[((sy * w + sx) * 4 + 3) as usize] as f32;
            }
        }
    }
    out
}

fn blur_alpha(alpha: &[f32], w: u32, h: u32, sigma: f32) -> Vec<f32> {
    if sigma <= 0.5 {
        return alpha.to_vec();
    }
    blur_channels(alpha, w as usize, h as usize, 1, sigma, None).unwrap_or_else(|| alpha.to_vec())
}

/// Max alpha within a disc of `radius`.
fn dilate_alpha(alpha: &[f32], w: u32, h: u32, radius: u32) -> Vec<f32> {
    let (w, h) = (w as usize, h as usize);
    if radius == 0 || w == 0 || h == 0 {
        return alpha.to_vec();
    }
    let r = radius as i32;
    let mut out = vec![0.0f32; w * h];
    out.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        for (x, slot) in row.iter_mut().enumerate() {
            let mut max_a = 0.0f32;
            for dy in -r..=r {
                let sy = y as i32 + dy;
                if sy < 0 || sy >= h as i32 {
                    continue;
                }
                for dx in -r..=r {
                    if dx * dx + dy * dy > r * r {
                        continue;
                    }
                    let sx = x as i32 + dx;
                    if sx >= 0 && sx < w as i32 {
                        max_a = max_a.max(alpha[sy as usize * w + sx as usize]);
                    }
                }
            }
            *slot = max_a;
        }
    });
    out
}

// ============================================================================
// COMPOSITING
// ============================================================================

/// Paint `color` with per-pixel `alpha` (0..255) × `opacity` beneath `src`.
fn composite_under(src: &PixelBuffer, alpha: &[f32], color: Color, opacity: f32) -> PixelBuffer {
    let w = src.width();
    let stride = w as usize * 4;
    let src_raw = src.as_raw();
    let mut dst = src.blank_like();
    let base_a = color.a as f32 / 255.0 * opacity;

    dst.as_raw_mut().par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
        for x in 0..w as usize {
            let pi = x * 4;
            let si = y * stride + pi;
            let under_a = (alpha[y * w as usize + x] / 255.0 * base_a).clamp(0.0, 1.0);
            let top_a = src_raw[si + 3] as f32 / 255.0;
            let out_a = top_a + under_a * (1.0 - top_a);
            if out_a <= 0.0 {
                row_out[pi..pi + 4].copy_from_slice(&[0, 0, 0, 0]);
                continue;
            }
            let under = [color.r, color.g, color.b];
            for c in 0..3 {
                let top = src_raw[si + c] as f32;
                let v = (top * top_a + under[c] as f32 * under_a * (1.0 - top_a)) / out_a;
                row_out[pi + c] = v.round().clamp(0.0, 255.0) as u8;
            }
            row_out[pi + 3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
        }
    });
    dst
}

fn color_overlay(src: &PixelBuffer, color: Color) -> PixelBuffer {
    let t = color.a as f32 / 255.0;
    let tint = [color.r as f32, color.g as f32, color.b as f32];
    let mut dst = src.clone();
    dst.as_raw_mut().par_chunks_mut(4).for_each(|px| {
        for c in 0..3 {
            let v = px[c] as f32 + (tint[c] - px[c] as f32) * t;
            px[c] = v.round().clamp(0.0, 255.0) as u8;
        }
    });
    dst
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> PixelBuffer {
        let mut buf = PixelBuffer::new(20, 20).unwrap();
        for y in 8..12 {
            for x in 8..12 {
                buf.put_pixel(x, y, image::Rgba([255, 0, 0, 255]));
            }
        }
        buf
    }

    #[test]
    fn shadow_lands_at_offset_under_opaque_pixels() {
        let src = square();
        let fx = Effect::DropShadow { offset_x: 5, offset_y: 5, blur: 0.0, color: Color::BLACK, opacity: 1.0 };
        let out = fx.render(&src);
        assert_eq!(out.pixel(10, 10), src.pixel(10, 10));
        assert_eq!(out.pixel(15, 15), Some(image::Rgba([0, 0, 0, 255])));
        assert_eq!(out.pixel(2, 2).map(|p| p[3]), Some(0));
    }

    #[test]
    fn stroke_surrounds_shape() {
        let out = Effect::Stroke { width: 2, color: Color::rgb(0, 0, 255) }.render(&square());
        assert_eq!(out.pixel(6, 10), Some(image::Rgba([0, 0, 255, 255])));
        assert_eq!(out.pixel(10, 10), Some(image::Rgba([255, 0, 0, 255])));
        assert_eq!(out.pixel(3, 10).map(|p| p[3]), Some(0));
    }

    #[test]
    fn overlay_keeps_alpha() {
        let out = Effect::ColorOverlay { color: Color::rgb(0, 255, 0) }.render(&square());
        assert_eq!(out.pixel(9, 9), Some(image::Rgba([0, 255, 0, 255])));
        assert_eq!(out.pixel(0, 0).map(|p| p[3]), Some(0));
    }

    #[test]
    fn glow_spreads_beyond_shape() {
        let out = Effect::Glow { radius: 2.0, color: Color::WHITE, opacity: 1.0 }.render(&square());
        assert!(out.pixel(7, 10).unwrap()[3] > 0);
    }

    #[test]
    fn bad_opacity_is_rejected() {
        let fx = Effect::Glow { radius: 2.0, color: Color::WHITE, opacity: 1.5 };
        assert!(fx.validate().is_err());
    }
}
