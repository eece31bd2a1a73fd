use paintcore::ops::selection::{flood_select, smooth_mask, trace_contours};
use paintcore::{Affine, Color, Mask, PixelBuffer, Point, Rect, Selection, SelectionEngine, SelectionMode};

fn white_with_red_square() -> PixelBuffer {
    let mut buf = PixelBuffer::filled(50, 50, Color::WHITE).unwrap();
    for y in 10..40 {
        for x in 10..40 {
            buf.put_pixel(x, y, image::Rgba([255, 0, 0, 255]));
        }
    }
    buf
}

#[test]
fn magic_wand_selects_the_red_square() {
    let sel = flood_select(&white_with_red_square(), (25, 25), 10, true);
    assert_eq!(sel.bounds(), Rect::new(10, 10, 30, 30));
    assert!(sel.mask().get(25, 25) == 255 && sel.mask().get(5, 5) == 0);
}

#[test]
fn zero_tolerance_flood_matches_rect_exactly() {
    let mut buf = PixelBuffer::filled(40, 30, Color::rgb(0, 80, 0)).unwrap();
    let rect = Rect::new(7, 5, 13, 9);
    for y in rect.y..rect.bottom() {
        for x in rect.x..rect.right() {
            buf.put_pixel(x, y, image::Rgba([12, 34, 56, 255]));
        }
    }
    for contiguous in [true, false] {
        let sel = flood_select(&buf, (10, 8), 0, contiguous);
        assert_eq!(sel.bounds(), rect);
        assert_eq!(sel.mask().count_nonzero(), (rect.width * rect.height) as usize);
    }
}

#[test]
fn global_flood_reaches_disconnected_regions() {
    let mut buf = PixelBuffer::filled(20, 20, Color::WHITE).unwrap();
    buf.put_pixel(1, 1, image::Rgba([0, 0, 0, 255]));
    buf.put_pixel(18, 18, image::Rgba([0, 0, 0, 255]));
    assert_eq!(flood_select(&buf, (1, 1), 0, true).mask().count_nonzero(), 1);
    assert_eq!(flood_select(&buf, (1, 1), 0, false).mask().count_nonzero(), 2);
}

#[test]
fn out_of_bounds_seed_gives_empty_selection() {
    let buf = white_with_red_square();
    assert!(flood_select(&buf, (-1, 3), 0, true).is_empty());
    assert!(flood_select(&buf, (3, 50), 0, false).is_empty());
}

#[test]
fn ring_traces_outer_and_hole() {
    let sel = Selection::rectangle(30, 30, Rect::new(5, 5, 20, 20));
    let inner = Selection::rectangle(30, 30, Rect::new(10, 10, 10, 10));
    let ring = sel.combine(&inner, SelectionMode::Subtract).unwrap();
    let contours = trace_contours(ring.mask());
    assert_eq!(contours.iter().filter(|c| !c.hole).count(), 1);
    assert_eq!(contours.iter().filter(|c| c.hole).count(), 1);
    assert!(!ring.contains(15, 15));
    assert!(ring.contains(6, 6));
}

#[test]
fn refinements_return_new_selections() {
    let sel = Selection::rectangle(40, 40, Rect::new(10, 10, 10, 10));

    let grown = sel.expand(2);
    assert_eq!(grown.bounds(), Rect::new(8, 8, 14, 14));
    assert_eq!(sel.bounds(), Rect::new(10, 10, 10, 10));

    let shrunk = sel.contract(2);
    assert_eq!(shrunk.bounds(), Rect::new(12, 12, 6, 6));

    let feathered = sel.feather(4.0).unwrap();
    assert_eq!(feathered.feather_radius(), 4.0);
    assert_eq!(feathered.mask(), sel.mask());
    assert!(feathered.alpha_mask().get(9, 15) > 0);
    assert!(sel.feather(-1.0).is_err());

    let inverted = sel.invert(Rect::new(0, 0, 40, 40));
    assert!(inverted.contains(0, 0));
    assert!(!inverted.contains(15, 15));

    let smoothed = sel.smooth();
    assert!(smoothed.contains(15, 15));
}

#[test]
fn translation_moves_coverage_and_records_matrix() {
    let sel = Selection::rectangle(40, 40, Rect::new(2, 2, 5, 5));
    let moved = sel.transformed(&Affine::translate(10.0, 3.0)).unwrap();
    assert_eq!(moved.bounds(), Rect::new(12, 5, 5, 5));
    assert_eq!(moved.transform().apply(Point::new(0.0, 0.0)), Some(Point::new(10.0, 3.0)));
}

#[test]
fn engine_keeps_one_active_selection() {
    let mut engine = SelectionEngine::new();
    let a = Selection::rectangle(20, 20, Rect::new(0, 0, 10, 10));
    let b = Selection::rectangle(20, 20, Rect::new(5, 5, 10, 10));

    engine.apply(a.clone(), SelectionMode::New).unwrap();
    let added = engine.apply(b.clone(), SelectionMode::Add).unwrap().unwrap();
    assert_eq!(added.mask().count_nonzero(), 175);

    let both = engine.apply(a, SelectionMode::Intersect).unwrap().unwrap();
    assert_eq!(both.mask().count_nonzero(), 100);

    engine.apply(b, SelectionMode::New).unwrap();
    assert_eq!(engine.active().map(|s| s.bounds()), Some(Rect::new(5, 5, 10, 10)));
    engine.clear();
    assert!(engine.active().is_none());
}

#[test]
fn mismatched_canvas_sizes_cannot_combine() {
    let a = Selection::rectangle(20, 20, Rect::new(0, 0, 5, 5));
    let b = Selection::rectangle(30, 20, Rect::new(0, 0, 5, 5));
    assert!(a.combine(&b, SelectionMode::Add).is_err());
}

#[test]
fn smoothed_mask_keeps_interior_and_softens_edge() {
    let mut mask = Mask::new(20, 20);
    for y in 5..15 {
        for x in 5..15 {
            mask.set(x, y, 255);
        }
    }
    let out = smooth_mask(&mask, 1.5);
    assert_eq!(out.binary.get(10, 10), 255);
    assert_eq!(out.binary.get(0, 0), 0);
    let edge = out.alpha.get(5, 10);
    assert!(edge > 0 && edge < 255);
}
