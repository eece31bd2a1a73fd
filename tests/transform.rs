use paintcore::ops::transform::{self, FlipAxis};
use paintcore::{CancelToken, Color, CoreError, PixelBuffer, Point, TaskOutcome, TaskSlot, TransformParams, TransformSession};

fn dots() -> PixelBuffer {
    let mut buf = PixelBuffer::new(10, 8).unwrap();
    buf.put_pixel(1, 1, image::Rgba([255, 0, 0, 255]));
    buf.put_pixel(7, 2, image::Rgba([0, 255, 0, 255]));
    buf.put_pixel(4, 6, image::Rgba([0, 0, 255, 255]));
    buf
}

#[test]
fn half_turn_equals_double_flip() {
    let src = dots();
    let rotated = transform::rotate(&src, 180.0, None).unwrap();
    let flipped = transform::flip(&transform::flip(&src, FlipAxis::Horizontal), FlipAxis::Vertical);
    assert_eq!(rotated, flipped);
}

#[test]
fn content_leaving_the_canvas_becomes_transparent() {
    let src = PixelBuffer::filled(6, 6, Color::WHITE).unwrap();
    let out = transform::translate(&src, 3.0, 0.0).unwrap();
    assert_eq!(out.pixel(0, 0).map(|p| p[3]), Some(0));
    assert_eq!(out.pixel(5, 5), Some(image::Rgba([255, 255, 255, 255])));
    assert_eq!(out.dimensions(), src.dimensions());
}

#[test]
fn doubling_scale_spreads_a_pixel() {
    let mut src = PixelBuffer::new(8, 8).unwrap();
    src.put_pixel(2, 2, image::Rgba([255, 255, 255, 255]));
    let out = transform::scale(&src, 2.0, 2.0, Some(Point::new(0.0, 0.0))).unwrap();
    assert!(out.pixel(4, 4).unwrap()[3] > 0);
    assert!(out.pixel(5, 5).unwrap()[3] > 0);
    assert_eq!(out.pixel(2, 2).map(|p| p[3]), Some(0));
}

#[test]
fn perspective_needs_four_corners() {
    let src = dots();
    let three = [Point::new(0.0, 0.0), Point::new(10.0, 0.0), Point::new(10.0, 8.0)];
    assert!(matches!(transform::perspective(&src, &three), Err(CoreError::InvalidArgument(_))));

    let collapsed = [Point::new(0.0, 0.0), Point::new(5.0, 0.0), Point::new(10.0, 0.0), Point::new(2.0, 0.0)];
    assert!(matches!(transform::perspective(&src, &collapsed), Err(CoreError::InvalidArgument(_))));

    let keystone = [Point::new(2.0, 0.0), Point::new(8.0, 0.0), Point::new(10.0, 8.0), Point::new(0.0, 8.0)];
    let out = transform::perspective(&src, &keystone).unwrap();
    assert_eq!(out.pixel(0, 0).map(|p| p[3]), Some(0));
}

#[test]
fn extension_points_pass_through() {
    let src = dots();
    assert_eq!(transform::warp(&src, &[]), src);
    assert_eq!(transform::liquify(&src, Point::new(5.0, 4.0), 3.0, 0.5), src);
}

#[test]
fn idle_session_rejects_update_and_commit() {
    let mut session = TransformSession::new();
    assert!(matches!(session.update_preview(&TransformParams::default()), Err(CoreError::InvalidOperation(_))));
    assert!(matches!(session.commit_preview(), Err(CoreError::InvalidOperation(_))));
    assert!(session.cancel_preview().is_none());
}

#[test]
fn cancel_returns_the_untouched_original() {
    let src = dots();
    let mut session = TransformSession::new();
    session.start_preview(src.clone());
    let params = TransformParams { rotation: 30.0, ..Default::default() };
    session.update_preview(&params).unwrap();
    assert_eq!(session.cancel_preview(), Some(src));
    assert!(!session.is_previewing());
}

#[test]
fn commit_returns_latest_preview() {
    let src = dots();
    let mut session = TransformSession::new();
    session.start_preview(src.clone());
    let params = TransformParams { flip_horizontal: true, ..Default::default() };
    let preview = session.update_preview(&params).unwrap().clone();
    let committed = session.commit_preview().unwrap();
    assert_eq!(committed, preview);
    assert_eq!(committed, transform::flip(&src, FlipAxis::Horizontal));
    assert!(!session.is_previewing());
}

#[test]
fn commit_without_update_returns_original() {
    let src = dots();
    let mut session = TransformSession::new();
    session.start_preview(src.clone());
    assert_eq!(session.commit_preview().unwrap(), src);
}

#[test]
fn restarting_a_session_replaces_the_original() {
    let mut session = TransformSession::new();
    session.start_preview(dots());
    let other = PixelBuffer::filled(3, 3, Color::BLACK).unwrap();
    session.start_preview(other.clone());
    assert_eq!(session.original(), Some(&other));
}

#[test]
fn cancelled_preview_reports_cancelled() {
    let mut session = TransformSession::new();
    session.start_preview(dots());
    let token = CancelToken::new();
    token.cancel();
    let outcome = session.update_preview_cancellable(&TransformParams::default(), &token).unwrap();
    assert!(!outcome.is_completed());
    assert!(session.preview().is_none());
}

#[test]
fn background_preview_can_be_installed() {
    let src = dots();
    let mut session = TransformSession::new();
    session.start_preview(src.clone());
    let slot = TaskSlot::new();
    let params = TransformParams { translate: Point::new(2.0, 0.0), ..Default::default() };
    let handle = session.spawn_preview(&slot, params.clone()).unwrap();
    let TaskOutcome::Completed(buffer) = handle.wait() else {
        panic!("preview job was cancelled");
    };
    assert_eq!(buffer, transform::translate(&src, 2.0, 0.0).unwrap());
    session.set_preview(params, buffer).unwrap();
    assert!(session.preview().is_some());
}
