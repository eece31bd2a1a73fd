// ============================================================================
// PIXEL STORAGE: RGBA8 buffers, single-channel masks, integer rectangles
// ============================================================================

use std::sync::atomic::{AtomicU64, Ordering};

use image::{GrayImage, Luma, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::config::DEFAULT_MAX_PIXELS;
use crate::error::{CoreError, Result};

static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

fn next_source_id() -> u64 {
    NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Pixel rectangle. `x..x+width` × `y..y+height`, end exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Rectangle spanning two inclusive corner pixels.
    pub fn from_inclusive(min_x: u32, min_y: u32, max_x: u32, max_y: u32) -> Self {
        Self {
            x: min_x,
            y: min_y,
            width: max_x.saturating_sub(min_x) + 1,
            height: max_y.saturating_sub(min_y) + 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Rect::new(x, y, self.right().max(other.right()) - x, self.bottom().max(other.bottom()) - y)
    }

    pub fn intersect(&self, other: &Rect) -> Rect {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let r = self.right().min(other.right());
        let b = self.bottom().min(other.bottom());
        if r <= x || b <= y {
            Rect::default()
        } else {
            Rect::new(x, y, r - x, b - y)
        }
    }
}

/// Allocate a zeroed byte vector for `width × height × channels`, surfacing
/// allocation failure instead of aborting.
fn alloc_zeroed(width: u32, height: u32, channels: usize, max_pixels: u64) -> Result<Vec<u8>> {
    if width == 0 || height == 0 {
        return Err(CoreError::arg(format!("buffer dimensions {}×{} must be non-zero", width, height)));
    }
    let total = width as u64 * height as u64;
    if total > max_pixels {
        return Err(CoreError::ResourceExhausted(format!(
            "{}×{} exceeds the {} pixel limit",
            width, height, max_pixels
        )));
    }
    let len = (total as usize)
        .checked_mul(channels)
        .ok_or_else(|| CoreError::ResourceExhausted("buffer size overflows usize".into()))?;
    let mut bytes = Vec::new();
    bytes
        .try_reserve_exact(len)
        .map_err(|e| CoreError::ResourceExhausted(format!("allocating {} bytes: {}", len, e)))?;
    bytes.resize(len, 0);
    Ok(bytes)
}

// ============================================================================
// PIXEL BUFFER
// ============================================================================

/// Exclusively owned 8-bit RGBA raster.
///
/// Every buffer carries a `source_id` naming its current contents. Clones keep
/// the id (same bytes); any mutable access assigns a fresh one, so caches keyed
/// on it never serve stale results.
#[derive(Clone, Debug)]
pub struct PixelBuffer {
    image: RgbaImage,
    source_id: u64,
}

impl PartialEq for PixelBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.image.dimensions() == other.image.dimensions() && self.image.as_raw() == other.image.as_raw()
    }
}

impl Eq for PixelBuffer {}

impl PixelBuffer {
    /// Transparent buffer, bounded by the default pixel budget.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        Self::with_limit(width, height, DEFAULT_MAX_PIXELS)
    }

    /// Transparent buffer, bounded by an explicit pixel budget.
    pub fn with_limit(width: u32, height: u32, max_pixels: u64) -> Result<Self> {
        let bytes = alloc_zeroed(width, height, 4, max_pixels)?;
        Self::from_raw(width, height, bytes)
    }

    pub fn filled(width: u32, height: u32, color: Color) -> Result<Self> {
        let mut buf = Self::new(width, height)?;
        buf.fill(color);
        Ok(buf)
    }

    /// Wrap raw RGBA bytes. Length must be exactly `width * height * 4`.
    pub fn from_raw(width: u32, height: u32, bytes: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(CoreError::arg(format!("buffer dimensions {}×{} must be non-zero", width, height)));
        }
        let expected = width as usize * height as usize * 4;
        if bytes.len() != expected {
            return Err(CoreError::arg(format!(
                "expected {} bytes for {}×{} RGBA, got {}",
                expected,
                width,
                height,
                bytes.len()
            )));
        }
        let image = RgbaImage::from_raw(width, height, bytes)
            .ok_or_else(|| CoreError::arg("raw buffer does not match dimensions"))?;
        Ok(Self::from_image(image))
    }

    pub fn from_image(image: RgbaImage) -> Self {
        Self { image, source_id: next_source_id() }
    }

    /// A transparent buffer with the same dimensions as `self`.
    pub fn blank_like(&self) -> Self {
        Self::from_image(RgbaImage::new(self.width(), self.height()))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width(), self.height())
    }

    pub fn source_id(&self) -> u64 {
        self.source_id
    }

    pub fn as_raw(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn as_raw_mut(&mut self) -> &mut [u8] {
        self.source_id = next_source_id();
        &mut *self.image
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut RgbaImage {
        self.source_id = next_source_id();
        &mut self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.image.into_raw()
    }

    /// Pixel at (x, y), or `None` outside the buffer.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba<u8>> {
        if x < self.width() && y < self.height() {
            Some(*self.image.get_pixel(x, y))
        } else {
            None
        }
    }

    /// Pixel at (x, y) with coordinates clamped to the nearest edge pixel.
    #[inline]
    pub fn get_clamped(&self, x: i64, y: i64) -> Rgba<u8> {
        let cx = x.clamp(0, self.width() as i64 - 1) as u32;
        let cy = y.clamp(0, self.height() as i64 - 1) as u32;
        *self.image.get_pixel(cx, cy)
    }

    /// Write a pixel; coordinates outside the buffer are ignored.
    pub fn put_pixel(&mut self, x: u32, y: u32, px: Rgba<u8>) {
        if x < self.width() && y < self.height() {
            self.image_mut().put_pixel(x, y, px);
        }
    }

    pub fn fill(&mut self, color: Color) {
        let px: Rgba<u8> = color.into();
        for p in self.image_mut().pixels_mut() {
            *p = px;
        }
    }

    pub fn same_size(&self, other: &PixelBuffer) -> bool {
        self.dimensions() == other.dimensions()
    }

    /// Alpha channel as a mask.
    pub fn alpha_mask(&self) -> Mask {
        let (w, h) = self.dimensions();
        let alpha: Vec<u8> = self.as_raw().chunks_exact(4).map(|p| p[3]).collect();
        Mask::from_image(GrayImage::from_raw(w, h, alpha).unwrap_or_else(|| GrayImage::new(w, h)))
    }
}

// ============================================================================
// MASK
// ============================================================================

/// Single-channel coverage buffer: 0 = outside, 255 = fully inside.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mask {
    image: GrayImage,
}

impl Mask {
    /// Empty (all zero) mask.
    pub fn new(width: u32, height: u32) -> Self {
        Self { image: GrayImage::new(width, height) }
    }

    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self { image: GrayImage::from_pixel(width, height, Luma([value])) }
    }

    pub fn from_raw(width: u32, height: u32, bytes: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if bytes.len() != expected {
            return Err(CoreError::arg(format!(
                "expected {} mask bytes for {}×{}, got {}",
                expected,
                width,
                height,
                bytes.len()
            )));
        }
        GrayImage::from_raw(width, height, bytes)
            .map(Self::from_image)
            .ok_or_else(|| CoreError::arg("mask bytes do not match dimensions"))
    }

    pub fn from_image(image: GrayImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn as_raw(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn as_raw_mut(&mut self) -> &mut [u8] {
        &mut *self.image
    }

    pub fn image(&self) -> &GrayImage {
        &self.image
    }

    /// Value at (x, y); 0 outside the mask.
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> u8 {
        if x < self.width() && y < self.height() {
            self.image.get_pixel(x, y)[0]
        } else {
            0
        }
    }

    #[inline]
    pub fn get_clamped(&self, x: i64, y: i64) -> u8 {
        let cx = x.clamp(0, self.width() as i64 - 1) as u32;
        let cy = y.clamp(0, self.height() as i64 - 1) as u32;
        self.image.get_pixel(cx, cy)[0]
    }

    pub fn set(&mut self, x: u32, y: u32, value: u8) {
        if x < self.width() && y < self.height() {
            self.image.put_pixel(x, y, Luma([value]));
        }
    }

    /// True when at least one pixel is selected.
    pub fn any(&self) -> bool {
        self.as_raw().iter().any(|&v| v > 0)
    }

    pub fn count_nonzero(&self) -> usize {
        self.as_raw().iter().filter(|&&v| v > 0).count()
    }

    /// Bounding rectangle of non-zero pixels.
    pub fn bounds(&self) -> Option<Rect> {
        let (w, h) = self.dimensions();
        let raw = self.as_raw();
        let mut min_x = w;
        let mut min_y = h;
        let mut max_x = 0u32;
        let mut max_y = 0u32;
        for y in 0..h {
            let row = &raw[(y * w) as usize..((y + 1) * w) as usize];
            for (x, &v) in row.iter().enumerate() {
                if v > 0 {
                    let x = x as u32;
                    min_x = min_x.min(x);
                    min_y = min_y.min(y);
                    max_x = max_x.max(x);
                    max_y = max_y.max(y);
                }
            }
        }
        if min_x > max_x || min_y > max_y {
            None
        } else {
            Some(Rect::from_inclusive(min_x, min_y, max_x, max_y))
        }
    }

    pub fn inverted(&self) -> Mask {
        let mut out = self.clone();
        for v in out.as_raw_mut() {
            *v = 255 - *v;
        }
        out
    }

    /// Per-pixel combination of two equally sized masks.
    pub fn zip_with(&self, other: &Mask, f: impl Fn(u8, u8) -> u8) -> Mask {
        let mut out = self.clone();
        for (a, &b) in out.as_raw_mut().iter_mut().zip(other.as_raw()) {
            *a = f(*a, b);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_length_is_checked() {
        assert!(PixelBuffer::from_raw(2, 2, vec![0; 15]).is_err());
        assert!(PixelBuffer::from_raw(2, 2, vec![0; 16]).is_ok());
    }

    #[test]
    fn over_budget_allocation_is_resource_exhausted() {
        let err = PixelBuffer::with_limit(100, 100, 50).unwrap_err();
        assert!(matches!(err, CoreError::ResourceExhausted(_)));
    }

    #[test]
    fn mutation_changes_source_id() {
        let mut buf = PixelBuffer::new(4, 4).unwrap();
        let id = buf.source_id();
        let copy = buf.clone();
        assert_eq!(copy.source_id(), id);
        buf.put_pixel(0, 0, Rgba([1, 2, 3, 4]));
        assert_ne!(buf.source_id(), id);
    }

    #[test]
    fn clamped_reads_stay_in_bounds() {
        let mut buf = PixelBuffer::new(3, 3).unwrap();
        buf.put_pixel(2, 2, Rgba([9, 9, 9, 9]));
        assert_eq!(buf.get_clamped(10, 10), Rgba([9, 9, 9, 9]));
        assert_eq!(buf.get_clamped(-5, -5), Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn mask_bounds_are_inclusive_of_edge_pixels() {
        let mut m = Mask::new(10, 10);
        m.set(2, 3, 255);
        m.set(5, 7, 255);
        assert_eq!(m.bounds(), Some(Rect::new(2, 3, 4, 5)));
    }
}
