use std::fmt;
use std::sync::Arc;

use image::Rgba;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::compositor::Compositor;
use crate::config::EngineConfig;
use crate::error::{CoreError, Result};
use crate::ops::adjustments::AdjustmentPipeline;
use crate::ops::effects::Effect;
use crate::pixels::{Mask, PixelBuffer};
use crate::{log_debug, log_info};

// ============================================================================
// BLEND MODES
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Additive,
    Reflect,
    Glow,
    ColorBurn,
    ColorDodge,
    Overlay,
    Difference,
    Negation,
    Lighten,
    Darken,
    Xor,
    Overwrite,
    HardLight,
    SoftLight,
    Exclusion,
    Subtract,
    Divide,
    LinearBurn,
    VividLight,
    LinearLight,
    PinLight,
    HardMix,
}

impl BlendMode {
    pub fn all() -> &'static [BlendMode] {
        &[
            BlendMode::Normal,
            BlendMode::Multiply,
            BlendMode::Screen,
            BlendMode::Additive,
            BlendMode::Overlay,
            BlendMode::HardLight,
            BlendMode::SoftLight,
            BlendMode::Lighten,
            BlendMode::Darken,
            BlendMode::ColorBurn,
            BlendMode::ColorDodge,
            BlendMode::Difference,
            BlendMode::Exclusion,
            BlendMode::Negation,
            BlendMode::Reflect,
            BlendMode::Glow,
            BlendMode::Subtract,
            BlendMode::Divide,
            BlendMode::LinearBurn,
            BlendMode::VividLight,
            BlendMode::LinearLight,
            BlendMode::PinLight,
            BlendMode::HardMix,
            BlendMode::Xor,
            BlendMode::Overwrite,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            BlendMode::Normal => "Normal",
            BlendMode::Multiply => "Multiply",
            BlendMode::Screen => "Screen",
            BlendMode::Additive => "Additive",
            BlendMode::Reflect => "Reflect",
            BlendMode::Glow => "Glow",
            BlendMode::ColorBurn => "Color Burn",
            BlendMode::ColorDodge => "Color Dodge",
            BlendMode::Overlay => "Overlay",
            BlendMode::Difference => "Difference",
            BlendMode::Negation => "Negation",
            BlendMode::Lighten => "Lighten",
            BlendMode::Darken => "Darken",
            BlendMode::Xor => "Xor",
            BlendMode::Overwrite => "Overwrite",
            BlendMode::HardLight => "Hard Light",
            BlendMode::SoftLight => "Soft Light",
            BlendMode::Exclusion => "Exclusion",
            BlendMode::Subtract => "Subtract",
            BlendMode::Divide => "Divide",
            BlendMode::LinearBurn => "Linear Burn",
            BlendMode::VividLight => "Vivid Light",
            BlendMode::LinearLight => "Linear Light",
            BlendMode::PinLight => "Pin Light",
            BlendMode::HardMix => "Hard Mix",
        }
    }

    /// Per-channel blend of normalized `top` onto normalized `base`.
    /// Xor and Overwrite act on whole pixels and pass `top` through here.
    pub fn apply_channel(&self, base: f32, top: f32) -> f32 {
        match self {
            BlendMode::Normal | BlendMode::Xor | BlendMode::Overwrite => top,
            BlendMode::Multiply => base * top,
            BlendMode::Screen => 1.0 - (1.0 - base) * (1.0 - top),
            BlendMode::Additive => (base + top).min(1.0),
            BlendMode::Overlay => overlay_channel(base, top),
            BlendMode::Lighten => base.max(top),
            BlendMode::Darken => base.min(top),
            BlendMode::Difference => (base - top).abs(),
            BlendMode::Negation => 1.0 - (1.0 - base - top).abs(),
            BlendMode::ColorBurn => color_burn_channel(base, top),
            BlendMode::ColorDodge => color_dodge_channel(base, top),
            BlendMode::Reflect => reflect_channel(base, top),
            BlendMode::Glow => reflect_channel(top, base),
            BlendMode::HardLight => overlay_channel(top, base),
            BlendMode::SoftLight => soft_light_channel(base, top),
            BlendMode::Exclusion => base + top - 2.0 * base * top,
            BlendMode::Subtract => (base - top).max(0.0),
            BlendMode::Divide => divide_channel(base, top),
            BlendMode::LinearBurn => (base + top - 1.0).max(0.0),
            BlendMode::VividLight => vivid_light_channel(base, top),
            BlendMode::LinearLight => (base + 2.0 * top - 1.0).clamp(0.0, 1.0),
            BlendMode::PinLight => pin_light_channel(base, top),
            BlendMode::HardMix => {
                if base + top >= 1.0 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

/// Blend `top` over `base` with `mode`, scaling the top alpha by `opacity`.
pub fn blend_pixel(base: Rgba<u8>, top: Rgba<u8>, mode: BlendMode, opacity: f32) -> Rgba<u8> {
    // Fast path: fully transparent top pixel, nothing to blend
    if top[3] == 0 || opacity <= 0.0 {
        return base;
    }

    // Fast path: Normal blend, full opacity, fully opaque top pixel: overwrite
    if matches!(mode, BlendMode::Normal) && opacity >= 1.0 && top[3] == 255 {
        return top;
    }

    let opacity = opacity.clamp(0.0, 1.0);

    let base_r = base[0] as f32 / 255.0;
    let base_g = base[1] as f32 / 255.0;
    let base_b = base[2] as f32 / 255.0;
    let base_a = base[3] as f32 / 255.0;

    let top_r = top[0] as f32 / 255.0;
    let top_g = top[1] as f32 / 255.0;
    let top_b = top[2] as f32 / 255.0;
    let top_a = (top[3] as f32 / 255.0) * opacity;

    match mode {
        BlendMode::Overwrite => {
            return Rgba([top[0], top[1], top[2], (top_a * 255.0).round() as u8]);
        }
        BlendMode::Xor => {
            let xor_a = base_a * (1.0 - top_a) + top_a * (1.0 - base_a);
            if xor_a == 0.0 {
                return Rgba([0, 0, 0, 0]);
            }
            let mix = |b: f32, t: f32| (b * base_a * (1.0 - top_a) + t * top_a * (1.0 - base_a)) / xor_a;
            return Rgba([
                to_byte(mix(base_r, top_r)),
                to_byte(mix(base_g, top_g)),
                to_byte(mix(base_b, top_b)),
                to_byte(xor_a),
            ]);
        }
        _ => {}
    }

    let r = mode.apply_channel(base_r, top_r);
    let g = mode.apply_channel(base_g, top_g);
    let b = mode.apply_channel(base_b, top_b);

    let out_a = top_a + base_a * (1.0 - top_a);
    if out_a == 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let out_r = (r * top_a + base_r * base_a * (1.0 - top_a)) / out_a;
    let out_g = (g * top_a + base_g * base_a * (1.0 - top_a)) / out_a;
    let out_b = (b * top_a + base_b * base_a * (1.0 - top_a)) / out_a;

    Rgba([to_byte(out_r), to_byte(out_g), to_byte(out_b), to_byte(out_a)])
}

#[inline]
fn to_byte(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

fn overlay_channel(base: f32, top: f32) -> f32 {
    if base < 0.5 {
        2.0 * base * top
    } else {
        1.0 - 2.0 * (1.0 - base) * (1.0 - top)
    }
}

fn color_burn_channel(base: f32, top: f32) -> f32 {
    if top == 0.0 { 0.0 } else { (1.0 - (1.0 - base) / top).max(0.0) }
}

fn color_dodge_channel(base: f32, top: f32) -> f32 {
    if top >= 1.0 { 1.0 } else { (base / (1.0 - top)).min(1.0) }
}

fn reflect_channel(base: f32, top: f32) -> f32 {
    if top >= 1.0 { 1.0 } else { (base * base / (1.0 - top)).min(1.0) }
}

/// W3C Soft Light formula.
fn soft_light_channel(base: f32, top: f32) -> f32 {
    if top <= 0.5 {
        base - (1.0 - 2.0 * top) * base * (1.0 - base)
    } else {
        let d = if base <= 0.25 { ((16.0 * base - 12.0) * base + 4.0) * base } else { base.sqrt() };
        base + (2.0 * top - 1.0) * (d - base)
    }
}

fn divide_channel(base: f32, top: f32) -> f32 {
    if top <= 0.0 { 1.0 } else { (base / top).min(1.0) }
}

fn vivid_light_channel(base: f32, top: f32) -> f32 {
    if top <= 0.5 {
        // Color Burn with 2*top
        let t2 = 2.0 * top;
        if t2 <= 0.0 { 0.0 } else { (1.0 - (1.0 - base) / t2).max(0.0) }
    } else {
        // Color Dodge with 2*(top-0.5)
        let t2 = 2.0 * (top - 0.5);
        if t2 >= 1.0 { 1.0 } else { (base / (1.0 - t2)).min(1.0) }
    }
}

fn pin_light_channel(base: f32, top: f32) -> f32 {
    if top <= 0.5 { base.min(2.0 * top) } else { base.max(2.0 * (top - 0.5)) }
}

// ============================================================================
// LAYERS
// ============================================================================

/// Stable layer identity for the lifetime of the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayerId(Uuid);

impl LayerId {
    pub fn new() -> Self {
        LayerId(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for LayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayerKind {
    /// The bottom layer. Exactly one per stack, always at index 0.
    Background,
    Raster,
}

#[derive(Clone, Debug)]
pub struct Layer {
    pub(crate) id: LayerId,
    pub(crate) name: String,
    pub(crate) kind: LayerKind,
    pub(crate) visible: bool,
    pub(crate) locked: bool,
    pub(crate) opacity: f32,
    pub(crate) blend_mode: BlendMode,
    pub(crate) effects: Vec<Effect>,
    pub(crate) mask: Option<Mask>,
    pub(crate) clip_to: Option<LayerId>,
    pub(crate) adjustments: AdjustmentPipeline,
    pub(crate) pixels: PixelBuffer,
}

impl Layer {
    /// Visible, unlocked raster layer at full opacity.
    pub fn new(name: impl Into<String>, pixels: PixelBuffer) -> Self {
        Self {
            id: LayerId::new(),
            name: name.into(),
            kind: LayerKind::Raster,
            visible: true,
            locked: false,
            opacity: 1.0,
            blend_mode: BlendMode::Normal,
            effects: Vec::new(),
            mask: None,
            clip_to: None,
            adjustments: AdjustmentPipeline::default(),
            pixels,
        }
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity.clamp(0.0, 1.0);
        self
    }

    pub fn with_blend_mode(mut self, mode: BlendMode) -> Self {
        self.blend_mode = mode;
        self
    }

    pub fn with_effects(mut self, effects: Vec<Effect>) -> Self {
        self.effects = effects;
        self
    }

    pub fn with_mask(mut self, mask: Mask) -> Self {
        self.mask = Some(mask);
        self
    }

    pub fn with_clip_target(mut self, target: LayerId) -> Self {
        self.clip_to = Some(target);
        self
    }

    pub fn with_adjustments(mut self, adjustments: AdjustmentPipeline) -> Self {
        self.adjustments = adjustments;
        self
    }

    pub fn id(&self) -> LayerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> LayerKind {
        self.kind
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.blend_mode
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub fn mask(&self) -> Option<&Mask> {
        self.mask.as_ref()
    }

    pub fn clip_target(&self) -> Option<LayerId> {
        self.clip_to
    }

    pub fn adjustments(&self) -> &AdjustmentPipeline {
        &self.adjustments
    }

    pub fn pixels(&self) -> &PixelBuffer {
        &self.pixels
    }
}

// ============================================================================
// LAYER STACK
// ============================================================================

/// Ordered layers (index 0 = bottom) with an active layer and a cached composite.
///
/// Every mutation bumps `generation`; `composite()` reuses its last result
/// while the generation is unchanged.
#[derive(Debug)]
pub struct LayerStack {
    width: u32,
    height: u32,
    max_pixels: u64,
    layers: Vec<Layer>,
    active: usize,
    generation: u64,
    composite_cache: Mutex<Option<(u64, Arc<PixelBuffer>)>>,
}

impl Clone for LayerStack {
    fn clone(&self) -> Self {
        Self {
            width: self.width,
            height: self.height,
            max_pixels: self.max_pixels,
            layers: self.layers.clone(),
            active: self.active,
            generation: self.generation,
            composite_cache: Mutex::new(self.composite_cache.lock().clone()),
        }
    }
}

impl LayerStack {
    /// A stack holding one background layer filled with the configured color.
    pub fn new(width: u32, height: u32, config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        let mut pixels = PixelBuffer::with_limit(width, height, config.max_pixels)?;
        pixels.fill(config.default_background);
        let mut background = Layer::new("Background", pixels);
        background.kind = LayerKind::Background;

        log_info!("New {}×{} layer stack", width, height);
        Ok(Self {
            width,
            height,
            max_pixels: config.max_pixels,
            layers: vec![background],
            active: 0,
            generation: 0,
            composite_cache: Mutex::new(None),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Bumped by every mutation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn touch(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn layer_ids(&self) -> Vec<LayerId> {
        self.layers.iter().map(|l| l.id).collect()
    }

    pub fn background_id(&self) -> LayerId {
        self.layers[0].id
    }

    pub fn index_of(&self, id: LayerId) -> Result<usize> {
        self.layers
            .iter()
            .position(|l| l.id == id)
            .ok_or_else(|| CoreError::arg(format!("no layer with id {}", id)))
    }

    fn layer_mut(&mut self, id: LayerId) -> Result<&mut Layer> {
        let idx = self.index_of(id)?;
        Ok(&mut self.layers[idx])
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn active_id(&self) -> LayerId {
        self.layers[self.active].id
    }

    pub fn set_active(&mut self, id: LayerId) -> Result<()> {
        self.active = self.index_of(id)?;
        self.touch();
        Ok(())
    }

    // ---- membership ---------------------------------------------------------

    /// Insert a transparent layer above the active one and make it active.
    pub fn add_layer(&mut self, kind: LayerKind, name: impl Into<String>) -> Result<LayerId> {
        if kind == LayerKind::Background {
            return Err(CoreError::op("a stack has exactly one background layer"));
        }
        let pixels = PixelBuffer::with_limit(self.width, self.height, self.max_pixels)?;
        let layer = Layer::new(name, pixels);
        let id = layer.id;
        let idx = self.active + 1;
        self.layers.insert(idx, layer);
        self.active = idx;
        self.touch();
        log_debug!("Added layer {} at index {}", id, idx);
        Ok(id)
    }

    pub fn delete_layer(&mut self, id: LayerId) -> Result<()> {
        let idx = self.index_of(id)?;
        if self.layers[idx].kind == LayerKind::Background {
            return Err(CoreError::op("the background layer cannot be deleted"));
        }
        self.layers.remove(idx);
        for layer in &mut self.layers {
            if layer.clip_to == Some(id) {
                layer.clip_to = None;
            }
        }
        // Deleting the active layer selects the one that took its slot, else
        // the next one down. Otherwise the same layer stays active.
        if self.active == idx {
            self.active = idx.min(self.layers.len() - 1);
        } else if self.active > idx {
            self.active -= 1;
        }
        self.touch();
        log_debug!("Deleted layer {}", id);
        Ok(())
    }

    /// Deep copy placed directly above the source; the copy becomes active.
    pub fn duplicate_layer(&mut self, id: LayerId) -> Result<LayerId> {
        let idx = self.index_of(id)?;
        let mut copy = self.layers[idx].clone();
        copy.id = LayerId::new();
        copy.kind = LayerKind::Raster;
        copy.name = format!("{} copy", copy.name);
        let new_id = copy.id;
        self.layers.insert(idx + 1, copy);
        self.active = idx + 1;
        self.touch();
        Ok(new_id)
    }

    pub fn move_layer(&mut self, id: LayerId, new_index: usize) -> Result<()> {
        let idx = self.index_of(id)?;
        if new_index >= self.layers.len() {
            return Err(CoreError::arg(format!(
                "index {} out of range for {} layers",
                new_index,
                self.layers.len()
            )));
        }
        if self.layers[idx].kind == LayerKind::Background {
            return Err(CoreError::op("the background layer cannot be moved"));
        }
        if new_index == 0 {
            return Err(CoreError::op("index 0 is reserved for the background layer"));
        }
        if idx == new_index {
            return Ok(());
        }
        let active_id = self.active_id();
        let layer = self.layers.remove(idx);
        self.layers.insert(new_index, layer);
        self.active = self.index_of(active_id)?;
        self.touch();
        Ok(())
    }

    /// Render `id` (adjustments, effects, mask, clip) onto the layer below it
    /// and remove it.
    pub fn merge_down(&mut self, id: LayerId) -> Result<()> {
        let idx = self.index_of(id)?;
        if idx == 0 {
            return Err(CoreError::op("the bottom layer has nothing to merge into"));
        }
        if self.layers[idx].locked || self.layers[idx - 1].locked {
            return Err(CoreError::op("locked layers cannot be merged"));
        }

        let merged = Compositor::merge_onto(&self.layers[idx - 1].pixels, &self.layers[idx], &self.layers)?;
        self.layers[idx - 1].pixels = merged;
        self.layers.remove(idx);
        for layer in &mut self.layers {
            if layer.clip_to == Some(id) {
                layer.clip_to = None;
            }
        }
        if self.active >= idx {
            self.active -= 1;
        }
        self.touch();
        log_debug!("Merged layer {} down", id);
        Ok(())
    }

    /// Collapse every layer into a single background layer.
    pub fn flatten(&mut self) -> Result<LayerId> {
        let flat = self.composite();
        let mut background = self.layers[0].clone();
        background.pixels = PixelBuffer::clone(&flat);
        background.visible = true;
        background.locked = false;
        background.opacity = 1.0;
        background.blend_mode = BlendMode::Normal;
        background.effects.clear();
        background.mask = None;
        background.clip_to = None;
        background.adjustments = AdjustmentPipeline::default();
        let id = background.id;
        self.layers = vec![background];
        self.active = 0;
        self.touch();
        Ok(id)
    }

    // ---- properties ---------------------------------------------------------

    pub fn set_opacity(&mut self, id: LayerId, opacity: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&opacity) {
            return Err(CoreError::arg(format!("opacity {} outside [0, 1]", opacity)));
        }
        self.layer_mut(id)?.opacity = opacity;
        self.touch();
        Ok(())
    }

    pub fn set_blend_mode(&mut self, id: LayerId, mode: BlendMode) -> Result<()> {
        self.layer_mut(id)?.blend_mode = mode;
        self.touch();
        Ok(())
    }

    pub fn set_visible(&mut self, id: LayerId, visible: bool) -> Result<()> {
        self.layer_mut(id)?.visible = visible;
        self.touch();
        Ok(())
    }

    pub fn set_locked(&mut self, id: LayerId, locked: bool) -> Result<()> {
        self.layer_mut(id)?.locked = locked;
        self.touch();
        Ok(())
    }

    pub fn rename(&mut self, id: LayerId, name: impl Into<String>) -> Result<()> {
        self.layer_mut(id)?.name = name.into();
        self.touch();
        Ok(())
    }

    /// Attach or clear a layer mask. The mask must match the canvas size.
    pub fn set_mask(&mut self, id: LayerId, mask: Option<Mask>) -> Result<()> {
        if let Some(m) = &mask
            && m.dimensions() != (self.width, self.height)
        {
            return Err(CoreError::arg(format!(
                "mask is {}×{}, canvas is {}×{}",
                m.width(),
                m.height(),
                self.width,
                self.height
            )));
        }
        self.layer_mut(id)?.mask = mask;
        self.touch();
        Ok(())
    }

    pub fn set_clip_target(&mut self, id: LayerId, target: Option<LayerId>) -> Result<()> {
        if let Some(t) = target {
            if t == id {
                return Err(CoreError::arg("a layer cannot clip to itself"));
            }
            self.index_of(t)?;
        }
        self.layer_mut(id)?.clip_to = target;
        self.touch();
        Ok(())
    }

    pub fn set_effects(&mut self, id: LayerId, effects: Vec<Effect>) -> Result<()> {
        for effect in &effects {
            effect.validate()?;
        }
        self.layer_mut(id)?.effects = effects;
        self.touch();
        Ok(())
    }

    pub fn set_adjustments(&mut self, id: LayerId, adjustments: AdjustmentPipeline) -> Result<()> {
        self.layer_mut(id)?.adjustments = adjustments;
        self.touch();
        Ok(())
    }

    // ---- pixels -------------------------------------------------------------

    pub fn pixels(&self, id: LayerId) -> Result<&[u8]> {
        let idx = self.index_of(id)?;
        Ok(self.layers[idx].pixels.as_raw())
    }

    /// Replace a layer's RGBA bytes. Length must match the canvas.
    pub fn set_pixels(&mut self, id: LayerId, bytes: Vec<u8>) -> Result<()> {
        let (w, h) = (self.width, self.height);
        let layer = self.layer_mut(id)?;
        if layer.locked {
            return Err(CoreError::op(format!("layer '{}' is locked", layer.name)));
        }
        layer.pixels = PixelBuffer::from_raw(w, h, bytes)?;
        self.touch();
        Ok(())
    }

    /// Edit a layer's buffer in place. Resizing the buffer is rejected and
    /// rolled back.
    pub fn edit_pixels<R>(&mut self, id: LayerId, f: impl FnOnce(&mut PixelBuffer) -> R) -> Result<R> {
        let dims = (self.width, self.height);
        let layer = self.layer_mut(id)?;
        if layer.locked {
            return Err(CoreError::op(format!("layer '{}' is locked", layer.name)));
        }
        let original = layer.pixels.clone();
        let result = f(&mut layer.pixels);
        if layer.pixels.dimensions() != dims {
            layer.pixels = original;
            return Err(CoreError::op("edit_pixels must not change the buffer size"));
        }
        self.touch();
        Ok(result)
    }

    // ---- output -------------------------------------------------------------

    /// Flattened image of all visible, unlocked layers.
    pub fn composite(&self) -> Arc<PixelBuffer> {
        let mut cache = self.composite_cache.lock();
        if let Some((generation, image)) = cache.as_ref()
            && *generation == self.generation
        {
            return Arc::clone(image);
        }
        let image = Arc::new(Compositor::composite(&self.layers, self.width, self.height));
        *cache = Some((self.generation, Arc::clone(&image)));
        image
    }
}

// ============================================================================
// SHARED ACCESS
// ============================================================================

/// A `LayerStack` behind a read/write lock: many readers composite
/// concurrently, one writer mutates.
#[derive(Clone, Debug)]
pub struct SharedLayerStack {
    inner: Arc<RwLock<LayerStack>>,
}

impl SharedLayerStack {
    pub fn new(stack: LayerStack) -> Self {
        Self { inner: Arc::new(RwLock::new(stack)) }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, LayerStack> {
        self.inner.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, LayerStack> {
        self.inner.write()
    }

    pub fn composite(&self) -> Arc<PixelBuffer> {
        self.inner.read().composite()
    }
}
