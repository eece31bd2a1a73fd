// ============================================================================
// COMPOSITOR: layer flattening and brush stroke rendering
// ============================================================================

use std::borrow::Cow;

use image::{Rgba, RgbaImage};
use rayon::prelude::*;

use crate::canvas::{BlendMode, Layer, LayerId, blend_pixel};
use crate::color::Color;
use crate::error::{CoreError, Result};
use crate::ops::effects::apply_effects;
use crate::pixels::{Mask, PixelBuffer, Rect};
use crate::stroke::{Path, PathNode};

/// Subdivisions used when flattening quadratic segments for stamping.
const STROKE_FLATTEN_STEPS: usize = 8;

pub struct Compositor;

impl Compositor {
    /// A layer's pixels after its adjustments and then its effects.
    pub fn render_layer(layer: &Layer) -> Cow<'_, PixelBuffer> {
        let mut out = Cow::Borrowed(&layer.pixels);
        if layer.adjustments.has_effect() {
            out = Cow::Owned(layer.adjustments.apply(&out));
        }
        if !layer.effects.is_empty() {
            out = Cow::Owned(apply_effects(&out, &layer.effects));
        }
        out
    }

    /// Flatten `layers` bottom-to-top. Hidden and locked layers are skipped.
    /// Pure: identical input always yields identical bytes.
    pub fn composite(layers: &[Layer], width: u32, height: u32) -> PixelBuffer {
        let participating: Vec<usize> = (0..layers.len())
            .filter(|&i| layers[i].visible && !layers[i].locked && layers[i].opacity > 0.0)
            .collect();

        // Render each participating layer plus any clip target it refers to.
        let mut rendered: Vec<Option<Cow<'_, PixelBuffer>>> = (0..layers.len()).map(|_| None).collect();
        for &i in &participating {
            if rendered[i].is_none() {
                rendered[i] = Some(Self::render_layer(&layers[i]));
            }
            if let Some(t) = clip_index(layers, layers[i].clip_to)
                && rendered[t].is_none()
            {
                rendered[t] = Some(Self::render_layer(&layers[t]));
            }
        }

        let plan: Vec<LayerPass<'_>> = participating
            .iter()
            .filter_map(|&i| {
                let layer = &layers[i];
                Some(LayerPass {
                    pixels: rendered[i].as_deref()?,
                    mode: layer.blend_mode,
                    opacity: layer.opacity,
                    mask: layer.mask.as_ref(),
                    clip: clip_index(layers, layer.clip_to).and_then(|t| rendered[t].as_deref()),
                })
            })
            .collect();

        let mut out = RgbaImage::new(width, height);
        let stride = width as usize * 4;
        if stride == 0 {
            return PixelBuffer::from_image(out);
        }
        out.par_chunks_mut(stride).enumerate().for_each(|(y, row)| {
            let y = y as u32;
            for x in 0..width {
                let mut acc = Rgba([0u8, 0, 0, 0]);
                for pass in &plan {
                    acc = pass.blend_at(acc, x, y);
                }
                let pi = x as usize * 4;
                row[pi..pi + 4].copy_from_slice(&acc.0);
            }
        });
        PixelBuffer::from_image(out)
    }

    /// `base` with `layer` (fully rendered, masked and clipped) blended on top.
    pub fn merge_onto(base: &PixelBuffer, layer: &Layer, stack: &[Layer]) -> Result<PixelBuffer> {
        if !base.same_size(&layer.pixels) {
            return Err(CoreError::arg("merge requires equally sized layers"));
        }
        let rendered = Self::render_layer(layer);
        let clip_layer = clip_index(stack, layer.clip_to).map(|t| Self::render_layer(&stack[t]));
        let pass = LayerPass {
            pixels: &rendered,
            mode: layer.blend_mode,
            opacity: layer.opacity,
            mask: layer.mask.as_ref(),
            clip: clip_layer.as_deref(),
        };

        let w = base.width();
        let mut out = base.image().clone();
        out.par_chunks_mut(w as usize * 4).enumerate().for_each(|(y, row)| {
            for x in 0..w {
                let pi = x as usize * 4;
                let px = Rgba([row[pi], row[pi + 1], row[pi + 2], row[pi + 3]]);
                let blended = pass.blend_at(px, x, y as u32);
                row[pi..pi + 4].copy_from_slice(&blended.0);
            }
        });
        Ok(PixelBuffer::from_image(out))
    }

    /// Stamp dabs along `path` into `buffer`. Returns the touched region, or
    /// `None` when nothing was drawn.
    pub fn render_stroke(buffer: &mut PixelBuffer, path: &Path, brush: &BrushParams) -> Option<Rect> {
        let nodes = path.flatten(STROKE_FLATTEN_STEPS);
        if nodes.is_empty() || brush.size <= 0.0 || brush.opacity <= 0.0 {
            return None;
        }
        let spacing = (brush.size * brush.spacing).max(0.5);

        let mut dirty: Option<Rect> = None;
        let mut stamp = |node: &PathNode, buffer: &mut PixelBuffer| {
            if let Some(r) = stamp_dab(buffer, node, brush) {
                dirty = Some(dirty.map_or(r, |d| d.union(&r)));
            }
        };

        stamp(&nodes[0], &mut *buffer);
        let mut carried = 0.0f32;
        for pair in nodes.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            let seg_len = a.point.distance(b.point);
            if seg_len <= f32::EPSILON {
                continue;
            }
            let mut d = spacing - carried;
            while d <= seg_len {
                let t = d / seg_len;
                let node = PathNode {
                    point: a.point.lerp(b.point, t),
                    pressure: a.pressure + (b.pressure - a.pressure) * t,
                };
                stamp(&node, &mut *buffer);
                d += spacing;
            }
            carried = seg_len - (d - spacing);
        }
        dirty
    }
}

fn clip_index(layers: &[Layer], target: Option<LayerId>) -> Option<usize> {
    let target = target?;
    layers.iter().position(|l| l.id == target)
}

/// One layer's contribution to a composite.
struct LayerPass<'a> {
    pixels: &'a PixelBuffer,
    mode: BlendMode,
    opacity: f32,
    mask: Option<&'a Mask>,
    clip: Option<&'a PixelBuffer>,
}

impl LayerPass<'_> {
    #[inline]
    fn blend_at(&self, base: Rgba<u8>, x: u32, y: u32) -> Rgba<u8> {
        let Some(top) = self.pixels.pixel(x, y) else {
            return base;
        };
        let mut opacity = self.opacity;
        if let Some(mask) = self.mask {
            opacity *= mask.get(x, y) as f32 / 255.0;
        }
        if let Some(clip) = self.clip {
            opacity *= clip.pixel(x, y).map_or(0.0, |p| p[3] as f32 / 255.0);
        }
        blend_pixel(base, top, self.mode, opacity)
    }
}

// ============================================================================
// BRUSHES
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub enum BrushTip {
    /// Circular dab with a hardness-controlled edge.
    Round,
    /// Collaborator-supplied coverage texture, scaled to the dab diameter.
    Texture(Mask),
}

/// Immutable brush description consumed by `Compositor::render_stroke`.
#[derive(Clone, Debug, PartialEq)]
pub struct BrushParams {
    pub color: Color,
    /// Diameter in pixels at full pressure.
    pub size: f32,
    /// 0.0 – 1.0
    pub opacity: f32,
    /// 0.0 (soft) – 1.0 (hard edge)
    pub hardness: f32,
    /// Dab spacing as a fraction of `size`.
    pub spacing: f32,
    pub blend_mode: BlendMode,
    pub pressure_size: bool,
    pub pressure_opacity: bool,
    pub tip: BrushTip,
}

impl Default for BrushParams {
    fn default() -> Self {
        Self {
            color: Color::BLACK,
            size: 12.0,
            opacity: 1.0,
            hardness: 0.8,
            spacing: 0.15,
            blend_mode: BlendMode::Normal,
            pressure_size: true,
            pressure_opacity: false,
            tip: BrushTip::Round,
        }
    }
}

impl BrushParams {
    /// Brush sized and spaced from a tool profile.
    pub fn from_profile(profile: &crate::stroke::ToolProfile, color: Color) -> Self {
        Self { color, size: profile.size, spacing: profile.spacing, ..Self::default() }
    }
}

/// Stamp one dab; returns the clipped region it covered.
fn stamp_dab(buffer: &mut PixelBuffer, node: &PathNode, brush: &BrushParams) -> Option<Rect> {
    let pressure = node.pressure.clamp(0.0, 1.0);
    let size = if brush.pressure_size { brush.size * pressure.max(0.05) } else { brush.size };
    let alpha = brush.opacity.clamp(0.0, 1.0) * if brush.pressure_opacity { pressure } else { 1.0 };
    if alpha <= 0.0 {
        return None;
    }
    let radius = (size * 0.5).max(0.5);
    let (w, h) = buffer.dimensions();

    let min_x = (node.point.x - radius).floor().max(0.0) as i64;
    let min_y = (node.point.y - radius).floor().max(0.0) as i64;
    let max_x = ((node.point.x + radius).ceil() as i64).min(w as i64 - 1);
    let max_y = ((node.point.y + radius).ceil() as i64).min(h as i64 - 1);
    if min_x > max_x || min_y > max_y {
        return None;
    }

    let hardness = brush.hardness.clamp(0.0, 1.0);
    let img = buffer.image_mut();
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            // Sample at the pixel center.
            let dx = x as f32 + 0.5 - node.point.x;
            let dy = y as f32 + 0.5 - node.point.y;
            let coverage = match &brush.tip {
                BrushTip::Round => {
                    let d = (dx * dx + dy * dy).sqrt() / radius;
                    if d > 1.0 {
                        0.0
                    } else if d <= hardness || hardness >= 1.0 {
                        1.0
                    } else {
                        1.0 - (d - hardness) / (1.0 - hardness)
                    }
                }
                BrushTip::Texture(tex) => texture_coverage(tex, dx, dy, radius),
            };
            if coverage <= 0.0 {
                continue;
            }
            let a = (brush.color.a as f32 * coverage * alpha).round().clamp(0.0, 255.0) as u8;
            let top = Rgba([brush.color.r, brush.color.g, brush.color.b, a]);
            let (ux, uy) = (x as u32, y as u32);
            let base = *img.get_pixel(ux, uy);
            img.put_pixel(ux, uy, blend_pixel(base, top, brush.blend_mode, 1.0));
        }
    }

    Some(Rect::from_inclusive(min_x as u32, min_y as u32, max_x as u32, max_y as u32))
}

/// Nearest-neighbour lookup of a tip texture stretched over the dab square.
fn texture_coverage(tex: &Mask, dx: f32, dy: f32, radius: f32) -> f32 {
    let (tw, th) = tex.dimensions();
    if tw == 0 || th == 0 {
        return 0.0;
    }
    let u = (dx + radius) / (2.0 * radius);
    let v = (dy + radius) / (2.0 * radius);
    if !(0.0..1.0).contains(&u) || !(0.0..1.0).contains(&v) {
        return 0.0;
    }
    let tx = ((u * tw as f32) as u32).min(tw - 1);
    let ty = ((v * th as f32) as u32).min(th - 1);
    tex.get(tx, ty) as f32 / 255.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use crate::stroke::Segment;

    fn node(x: f32, y: f32) -> PathNode {
        PathNode { point: Point::new(x, y), pressure: 1.0 }
    }

    #[test]
    fn stroke_paints_along_line() {
        let mut buf = PixelBuffer::new(40, 10).unwrap();
        let path = Path::new(vec![Segment::Line { from: node(5.0, 5.0), to: node(35.0, 5.0) }]);
        let brush = BrushParams { size: 4.0, hardness: 1.0, ..BrushParams::default() };
        let dirty = Compositor::render_stroke(&mut buf, &path, &brush).unwrap();
        assert_eq!(buf.pixel(20, 5).unwrap()[3], 255);
        assert_eq!(buf.pixel(20, 0).unwrap()[3], 0);
        assert!(dirty.contains(20, 5));
    }

    #[test]
    fn empty_path_draws_nothing() {
        let mut buf = PixelBuffer::new(8, 8).unwrap();
        assert!(Compositor::render_stroke(&mut buf, &Path::default(), &BrushParams::default()).is_none());
    }

    #[test]
    fn texture_tip_uses_mask_coverage() {
        let mut buf = PixelBuffer::new(20, 20).unwrap();
        let tip = Mask::filled(4, 4, 128);
        let path = Path::new(vec![Segment::Line { from: node(10.0, 10.0), to: node(10.0, 10.0) }]);
        let brush = BrushParams { size: 8.0, tip: BrushTip::Texture(tip), ..BrushParams::default() };
        Compositor::render_stroke(&mut buf, &path, &brush);
        let a = buf.pixel(10, 10).unwrap()[3];
        assert!((126..=130).contains(&a));
    }
}
