// ============================================================================
// TRANSFORM OPERATIONS: affine / projective resampling and live preview
// ============================================================================
//
// Every transform inverse-maps destination pixel centres into the source and
// samples bilinearly; samples falling outside the source are transparent.
// Output keeps the source dimensions (layers are canvas-sized).
// ============================================================================

use std::sync::Arc;

use image::RgbaImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::geometry::{Affine, Point};
use crate::pixels::PixelBuffer;
use crate::task::{CancelToken, TaskHandle, TaskOutcome, TaskSlot};
use crate::{log_debug, log_info};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlipAxis {
    /// Mirror left ↔ right.
    Horizontal,
    /// Mirror top ↔ bottom.
    Vertical,
}

// ---------------------------------------------------------------------------
//  Resampling core
// ---------------------------------------------------------------------------

/// Resample `src` through `forward`. `None` when cancelled between rows.
fn resample(src: &PixelBuffer, forward: &Affine, cancel: Option<&CancelToken>) -> Result<Option<PixelBuffer>> {
    let inv = forward
        .invert()
        .ok_or_else(|| CoreError::arg("transform is singular and cannot be inverted"))?;
    let (w, h) = src.dimensions();
    let src_w = w as i32;
    let src_h = h as i32;
    let src_stride = w as usize * 4;
    let src_raw = src.as_raw();
    let m = inv.m;

    let mut dst = RgbaImage::new(w, h);
    let row_bytes = w as usize * 4;
    dst.par_chunks_mut(row_bytes).enumerate().for_each(|(dy, row)| {
        if cancel.is_some_and(|c| c.is_cancelled()) {
            return;
        }
        let v = dy as f32 + 0.5;
        for dx in 0..w as usize {
            let u = dx as f32 + 0.5;
            let pw = m[2][0] * u + m[2][1] * v + m[2][2];
            if pw.abs() < 1e-8 {
                continue;
            }
            // Source position in pixel-index space (centres at integers).
            let src_x = (m[0][0] * u + m[0][1] * v + m[0][2]) / pw - 0.5;
            let src_y = (m[1][0] * u + m[1][1] * v + m[1][2]) / pw - 0.5;

            let x0 = src_x.floor() as i32;
            let y0 = src_y.floor() as i32;
            if x0 < -1 || y0 < -1 || x0 >= src_w || y0 >= src_h {
                continue;
            }
            let fx = src_x - x0 as f32;
            let fy = src_y - y0 as f32;

            let sample = |sx: i32, sy: i32| -> [f32; 4] {
                if sx < 0 || sy < 0 || sx >= src_w || sy >= src_h {
                    [0.0; 4]
                } else {
                    let idx = sy as usize * src_stride + sx as usize * 4;
                    [
                        src_raw[idx] as f32,
                        src_raw[idx + 1] as f32,
                        src_raw[idx + 2] as f32,
                        src_raw[idx + 3] as f32,
                    ]
                }
            };

            let tl = sample(x0, y0);
            let tr = sample(x0 + 1, y0);
            let bl = sample(x0, y0 + 1);
            let br = sample(x0 + 1, y0 + 1);

            let px = dx * 4;
            for c in 0..4 {
                let top = tl[c] + (tr[c] - tl[c]) * fx;
                let bot = bl[c] + (br[c] - bl[c]) * fx;
                row[px + c] = (top + (bot - top) * fy).round().clamp(0.0, 255.0) as u8;
            }
        }
    });

    if cancel.is_some_and(|c| c.is_cancelled()) {
        return Ok(None);
    }
    Ok(Some(PixelBuffer::from_image(dst)))
}

fn resample_now(src: &PixelBuffer, forward: &Affine) -> Result<PixelBuffer> {
    resample(src, forward, None)?.ok_or_else(|| CoreError::op("uncancellable resample was cancelled"))
}

fn center_of(src: &PixelBuffer) -> Point {
    Point::new(src.width() as f32 / 2.0, src.height() as f32 / 2.0)
}

// ---------------------------------------------------------------------------
//  Stateless transforms
// ---------------------------------------------------------------------------

pub fn translate(src: &PixelBuffer, dx: f32, dy: f32) -> Result<PixelBuffer> {
    resample_now(src, &Affine::translate(dx, dy))
}

/// Scale about `pivot` (canvas centre when `None`). Zero factors are rejected.
pub fn scale(src: &PixelBuffer, sx: f32, sy: f32, pivot: Option<Point>) -> Result<PixelBuffer> {
    if sx.abs() < 1e-6 || sy.abs() < 1e-6 || !sx.is_finite() || !sy.is_finite() {
        return Err(CoreError::arg(format!("scale factors ({}, {}) must be finite and non-zero", sx, sy)));
    }
    let pivot = pivot.unwrap_or_else(|| center_of(src));
    resample_now(src, &Affine::scale(sx, sy).about(pivot))
}

/// Clockwise rotation in degrees about `pivot` (canvas centre when `None`).
pub fn rotate(src: &PixelBuffer, degrees: f32, pivot: Option<Point>) -> Result<PixelBuffer> {
    let pivot = pivot.unwrap_or_else(|| center_of(src));
    resample_now(src, &Affine::rotate(degrees).about(pivot))
}

/// Shear by angles in degrees about `pivot` (canvas centre when `None`).
pub fn skew(src: &PixelBuffer, x_degrees: f32, y_degrees: f32, pivot: Option<Point>) -> Result<PixelBuffer> {
    if x_degrees.abs() >= 89.0 || y_degrees.abs() >= 89.0 {
        return Err(CoreError::arg(format!("skew ({}, {}) must stay within ±89°", x_degrees, y_degrees)));
    }
    let pivot = pivot.unwrap_or_else(|| center_of(src));
    resample_now(src, &Affine::skew(x_degrees, y_degrees).about(pivot))
}

/// Exact pixel mirror.
pub fn flip(src: &PixelBuffer, axis: FlipAxis) -> PixelBuffer {
    let img = match axis {
        FlipAxis::Horizontal => image::imageops::flip_horizontal(src.image()),
        FlipAxis::Vertical => image::imageops::flip_vertical(src.image()),
    };
    PixelBuffer::from_image(img)
}

/// Projective map from the buffer's rectangle onto `corners`, given as
/// top-left, top-right, bottom-right, bottom-left.
pub fn perspective_matrix(width: u32, height: u32, corners: &[Point]) -> Result<Affine> {
    let quad: [Point; 4] = corners
        .try_into()
        .map_err(|_| CoreError::arg(format!("perspective needs exactly 4 corners, got {}", corners.len())))?;
    if quad.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
        return Err(CoreError::arg("perspective corners must be finite"));
    }

    // Image of a rectangle under a homography is a convex quad.
    let mut sign = 0.0f32;
    for i in 0..4 {
        let a = quad[i];
        let b = quad[(i + 1) % 4];
        let c = quad[(i + 2) % 4];
        let cross = (b.x - a.x) * (c.y - b.y) - (b.y - a.y) * (c.x - b.x);
        if cross.abs() < 1e-6 || (sign != 0.0 && cross.signum() != sign) {
            return Err(CoreError::arg("perspective corners do not form a convex quad"));
        }
        sign = cross.signum();
    }

    let (w, h) = (width as f32, height as f32);
    let rect = [Point::new(0.0, 0.0), Point::new(w, 0.0), Point::new(w, h), Point::new(0.0, h)];
    Affine::from_quad_to_quad(&rect, &quad).ok_or_else(|| CoreError::arg("perspective corners are degenerate"))
}

pub fn perspective(src: &PixelBuffer, corners: &[Point]) -> Result<PixelBuffer> {
    let m = perspective_matrix(src.width(), src.height(), corners)?;
    resample_now(src, &m)
}

/// Mesh warp extension point. Returns the input unchanged.
pub fn warp(src: &PixelBuffer, _mesh: &[Point]) -> PixelBuffer {
    log_debug!("warp has no deformation model; returning input");
    src.clone()
}

/// Liquify extension point. Returns the input unchanged.
pub fn liquify(src: &PixelBuffer, _center: Point, _radius: f32, _strength: f32) -> PixelBuffer {
    log_debug!("liquify has no deformation model; returning input");
    src.clone()
}

// ---------------------------------------------------------------------------
//  Combined parameters
// ---------------------------------------------------------------------------

/// Everything a free-transform handle can express. Applied as flip, scale,
/// skew, rotate (all about `pivot`), then translate; a perspective quad, when
/// set, is applied before everything else.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransformParams {
    pub translate: Point,
    pub scale_x: f32,
    pub scale_y: f32,
    /// Degrees, clockwise.
    pub rotation: f32,
    pub skew_x: f32,
    pub skew_y: f32,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
    /// Canvas centre when `None`.
    pub pivot: Option<Point>,
    pub perspective: Option<Vec<Point>>,
}

impl Default for TransformParams {
    fn default() -> Self {
        Self {
            translate: Point::default(),
            scale_x: 1.0,
            scale_y: 1.0,
            rotation: 0.0,
            skew_x: 0.0,
            skew_y: 0.0,
            flip_horizontal: false,
            flip_vertical: false,
            pivot: None,
            perspective: None,
        }
    }
}

impl TransformParams {
    pub fn matrix(&self, width: u32, height: u32) -> Result<Affine> {
        if self.scale_x.abs() < 1e-6 || self.scale_y.abs() < 1e-6 {
            return Err(CoreError::arg("transform scale must be non-zero"));
        }
        if self.skew_x.abs() >= 89.0 || self.skew_y.abs() >= 89.0 {
            return Err(CoreError::arg("transform skew must stay within ±89°"));
        }
        let pivot = self.pivot.unwrap_or(Point::new(width as f32 / 2.0, height as f32 / 2.0));
        let flip = Affine::scale(
            if self.flip_horizontal { -1.0 } else { 1.0 },
            if self.flip_vertical { -1.0 } else { 1.0 },
        );
        let local = flip
            .then(&Affine::scale(self.scale_x, self.scale_y))
            .then(&Affine::skew(self.skew_x, self.skew_y))
            .then(&Affine::rotate(self.rotation))
            .about(pivot)
            .then(&Affine::translate(self.translate.x, self.translate.y));
        match &self.perspective {
            Some(corners) => Ok(local.after(&perspective_matrix(width, height, corners)?)),
            None => Ok(local),
        }
    }
}

pub fn apply_params(src: &PixelBuffer, params: &TransformParams) -> Result<PixelBuffer> {
    resample_now(src, &params.matrix(src.width(), src.height())?)
}

// ---------------------------------------------------------------------------
//  Preview session
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
enum SessionState {
    #[default]
    Idle,
    Previewing {
        original: Arc<PixelBuffer>,
        params: TransformParams,
        preview: Option<PixelBuffer>,
    },
}

/// Idle → `start_preview` → Previewing (`update_preview` any number of times)
/// → `commit_preview` or `cancel_preview` → Idle.
#[derive(Debug, Default)]
pub struct TransformSession {
    state: SessionState,
}

impl TransformSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_previewing(&self) -> bool {
        matches!(self.state, SessionState::Previewing { .. })
    }

    /// Begin previewing transforms of `original`. A session already in
    /// progress is cancelled first.
    pub fn start_preview(&mut self, original: PixelBuffer) {
        if self.is_previewing() {
            log_debug!("starting a transform preview over an open session; cancelling it");
            self.cancel_preview();
        }
        self.state = SessionState::Previewing {
            original: Arc::new(original),
            params: TransformParams::default(),
            preview: None,
        };
    }

    pub fn original(&self) -> Option<&PixelBuffer> {
        match &self.state {
            SessionState::Previewing { original, .. } => Some(original),
            SessionState::Idle => None,
        }
    }

    pub fn params(&self) -> Option<&TransformParams> {
        match &self.state {
            SessionState::Previewing { params, .. } => Some(params),
            SessionState::Idle => None,
        }
    }

    /// Latest rendered preview, if any update has completed.
    pub fn preview(&self) -> Option<&PixelBuffer> {
        match &self.state {
            SessionState::Previewing { preview, .. } => preview.as_ref(),
            SessionState::Idle => None,
        }
    }

    pub fn update_preview(&mut self, params: &TransformParams) -> Result<&PixelBuffer> {
        let token = CancelToken::new();
        match self.update_preview_cancellable(params, &token)? {
            TaskOutcome::Completed(buffer) => Ok(buffer),
            TaskOutcome::Cancelled => Err(CoreError::op("uncancellable preview was cancelled")),
        }
    }

    /// Render a new preview, giving up between rows once `token` fires. A
    /// cancelled update keeps the previous preview.
    pub fn update_preview_cancellable(
        &mut self,
        params: &TransformParams,
        token: &CancelToken,
    ) -> Result<TaskOutcome<&PixelBuffer>> {
        let SessionState::Previewing { original, params: current, preview } = &mut self.state else {
            return Err(CoreError::op("no transform preview in progress"));
        };
        let m = params.matrix(original.width(), original.height())?;
        match resample(original, &m, Some(token))? {
            Some(buffer) => {
                *current = params.clone();
                Ok(TaskOutcome::Completed(preview.insert(buffer)))
            }
            None => Ok(TaskOutcome::Cancelled),
        }
    }

    /// Render a preview on the rayon pool. A newer submission to the same
    /// slot supersedes this one; install the result with `set_preview`.
    pub fn spawn_preview(&self, slot: &TaskSlot, params: TransformParams) -> Result<TaskHandle<PixelBuffer>> {
        let SessionState::Previewing { original, .. } = &self.state else {
            return Err(CoreError::op("no transform preview in progress"));
        };
        let m = params.matrix(original.width(), original.height())?;
        let original = Arc::clone(original);
        Ok(slot.submit(move |token| resample(&original, &m, Some(token)).ok().flatten()))
    }

    /// Install a preview rendered elsewhere (e.g. by `spawn_preview`).
    pub fn set_preview(&mut self, params: TransformParams, buffer: PixelBuffer) -> Result<()> {
        let SessionState::Previewing { original, params: current, preview } = &mut self.state else {
            return Err(CoreError::op("no transform preview in progress"));
        };
        if !buffer.same_size(original) {
            return Err(CoreError::arg("preview size does not match the original"));
        }
        *current = params;
        *preview = Some(buffer);
        Ok(())
    }

    /// Finish the session and return the transformed buffer.
    pub fn commit_preview(&mut self) -> Result<PixelBuffer> {
        match std::mem::take(&mut self.state) {
            SessionState::Idle => Err(CoreError::op("no transform preview to commit")),
            SessionState::Previewing { original, params, preview } => {
                let out = match preview {
                    Some(buffer) => buffer,
                    None => apply_params(&original, &params)?,
                };
                log_info!("Committed transform ({}×{})", out.width(), out.height());
                Ok(out)
            }
        }
    }

    /// Abandon the session, handing back the untouched original.
    pub fn cancel_preview(&mut self) -> Option<PixelBuffer> {
        match std::mem::take(&mut self.state) {
            SessionState::Idle => None,
            SessionState::Previewing { original, .. } => Some(Arc::unwrap_or_clone(original)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;

    fn marker() -> PixelBuffer {
        let mut buf = PixelBuffer::new(8, 8).unwrap();
        buf.put_pixel(1, 2, image::Rgba([255, 0, 0, 255]));
        buf
    }

    #[test]
    fn integer_translate_is_exact() {
        let out = translate(&marker(), 3.0, 1.0).unwrap();
        assert_eq!(out.pixel(4, 3), Some(image::Rgba([255, 0, 0, 255])));
        assert_eq!(out.pixel(1, 2), Some(image::Rgba([0, 0, 0, 0])));
    }

    #[test]
    fn flip_twice_is_identity() {
        let src = marker();
        let once = flip(&src, FlipAxis::Horizontal);
        assert_eq!(once.pixel(6, 2), Some(image::Rgba([255, 0, 0, 255])));
        assert_eq!(flip(&once, FlipAxis::Horizontal), src);
    }

    #[test]
    fn zero_scale_is_rejected() {
        assert!(matches!(scale(&marker(), 0.0, 1.0, None), Err(CoreError::InvalidArgument(_))));
    }

    #[test]
    fn perspective_onto_own_rect_is_identity() {
        let src = PixelBuffer::filled(6, 6, Color::rgb(9, 8, 7)).unwrap();
        let corners = [
            Point::new(0.0, 0.0),
            Point::new(6.0, 0.0),
            Point::new(6.0, 6.0),
            Point::new(0.0, 6.0),
        ];
        assert_eq!(perspective(&src, &corners).unwrap(), src);
    }

    #[test]
    fn perspective_rejects_bow_tie() {
        let corners = [
            Point::new(0.0, 0.0),
            Point::new(6.0, 6.0),
            Point::new(6.0, 0.0),
            Point::new(0.0, 6.0),
        ];
        assert!(perspective_matrix(6, 6, &corners).is_err());
    }

    #[test]
    fn default_params_are_identity() {
        assert!(TransformParams::default().matrix(10, 10).unwrap().is_identity());
    }

    #[test]
    fn cancelled_update_keeps_previous_preview() {
        let mut session = TransformSession::new();
        session.start_preview(marker());
        let first = TransformParams { translate: Point::new(1.0, 0.0), ..Default::default() };
        session.update_preview(&first).unwrap();
        let token = CancelToken::new();
        token.cancel();
        let second = TransformParams { translate: Point::new(2.0, 0.0), ..Default::default() };
        assert_eq!(session.update_preview_cancellable(&second, &token).unwrap(), TaskOutcome::Cancelled);
        assert_eq!(session.params(), Some(&first));
    }
}
