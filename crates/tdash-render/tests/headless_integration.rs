//! Integration tests for the headless driver with the compositor.
//!
//! - Dashboard-like layouts composited and flushed into a `HeadlessDriver`
//! - Attributes surviving compositing
//! - Property tests: last-wins, out-of-area filtering, no panics on
//!   writes outside the terminal

use std::collections::HashMap;

use proptest::prelude::*;
use tdash_core::attribute::{Attribute, Color};
use tdash_core::driver::TerminalDriver;
use tdash_core::geometry::{Point, Rect};
use tdash_render::buffer::Buffer;
use tdash_render::cell::Cell;
use tdash_render::composite::{fill_area, paint_all};
use tdash_render::headless::HeadlessDriver;

// ============================================================================
// Helpers
// ============================================================================

fn boxed_label(area: Rect, text: &str) -> Buffer {
    let mut buf = Buffer::new(area);
    let (x0, y0, x1, y1) = (area.x, area.y, area.right() - 1, area.bottom() - 1);
    for x in x0..=x1 {
        buf.set(x, y0, Cell::from_char('-'));
        buf.set(x, y1, Cell::from_char('-'));
    }
    for y in y0..=y1 {
        buf.set(x0, y, Cell::from_char('|'));
        buf.set(x1, y, Cell::from_char('|'));
    }
    buf.set_string(x0 + 1, y0 + 1, text, Attribute::DEFAULT, Attribute::DEFAULT);
    buf
}

// ============================================================================
// Layouts
// ============================================================================

#[test]
fn two_panel_dashboard_snapshot() {
    let mut term = HeadlessDriver::new(12, 3);
    let handle = term.handle();
    let left = boxed_label(Rect::new(0, 0, 6, 3), "cpu");
    let right = boxed_label(Rect::new(6, 0, 6, 3), "mem");

    paint_all(&mut term, &[&left, &right]).unwrap();
    term.flush().unwrap();

    assert_eq!(handle.front_row(0), "|----||----|");
    assert_eq!(handle.front_row(1), "|cpu ||mem |");
    assert_eq!(handle.front_row(2), "|----||----|");
}

#[test]
fn overlay_covers_background_panel() {
    let mut term = HeadlessDriver::new(8, 4);
    let handle = term.handle();
    let panel = Buffer::filled(Rect::new(0, 0, 8, 4), Cell::from_char('.'));
    let popup = boxed_label(Rect::new(2, 1, 4, 3), "ok");

    paint_all(&mut term, &[&panel, &popup]).unwrap();
    term.flush().unwrap();

    assert_eq!(handle.front_row(0), "........");
    assert_eq!(handle.front_row(1), "..|--|..");
    assert_eq!(handle.front_row(2), "..|ok|..");
    assert_eq!(handle.front_row(3), "..|--|..");
}

#[test]
fn attributes_survive_compositing() {
    let mut term = HeadlessDriver::new(3, 1);
    let handle = term.handle();
    let fg = Attribute::new(Color::Red).bold();
    let bg = Attribute::new(Color::Indexed(236));
    let mut buf = Buffer::new(Rect::new(0, 0, 3, 1));
    buf.set_string(0, 0, "hot", fg, bg);

    paint_all(&mut term, &[&buf]).unwrap();
    term.flush().unwrap();

    assert_eq!(handle.front_cell(1, 0), Cell::new('o', fg, bg));
}

#[test]
fn fill_then_clear_area() {
    let mut term = HeadlessDriver::new(4, 2);
    let handle = term.handle();
    let bg = Attribute::new(Color::Green);
    fill_area(&mut term, Rect::new(0, 0, 4, 2), bg).unwrap();
    fill_area(&mut term, Rect::new(1, 0, 2, 1), Attribute::DEFAULT).unwrap();
    term.flush().unwrap();

    assert_eq!(handle.front_cell(0, 0), Cell::blank(bg));
    assert_eq!(handle.front_cell(1, 0), Cell::BLANK);
    assert_eq!(handle.front_cell(3, 1), Cell::blank(bg));
}

// ============================================================================
// Property tests
// ============================================================================

fn surface() -> impl Strategy<Value = Buffer> {
    (
        0u16..20,
        0u16..10,
        0u16..10,
        0u16..6,
        proptest::char::range('A', 'Z'),
        proptest::collection::vec((0u16..30, 0u16..20, proptest::char::range('a', 'z')), 0..8),
    )
        .prop_map(|(x, y, w, h, fill, extra)| {
            let mut buf = Buffer::filled(Rect::new(x, y, w, h), Cell::from_char(fill));
            for (ex, ey, ch) in extra {
                buf.set(ex, ey, Cell::from_char(ch));
            }
            buf
        })
}

proptest! {
    #[test]
    fn composite_matches_model(surfaces in proptest::collection::vec(surface(), 0..6)) {
        let mut term = HeadlessDriver::new(20, 10);
        let handle = term.handle();
        let refs: Vec<&Buffer> = surfaces.iter().collect();
        paint_all(&mut term, &refs).unwrap();
        term.flush().unwrap();

        let mut model: HashMap<Point, char> = HashMap::new();
        for buf in &surfaces {
            for (p, cell) in buf.cells_in_area() {
                model.insert(p, cell.ch);
            }
        }
        for y in 0..10 {
            for x in 0..20 {
                let want = model.get(&Point::new(x, y)).copied().unwrap_or(' ');
                prop_assert_eq!(handle.front_char(x, y), want);
            }
        }
    }

    #[test]
    fn only_in_area_coordinates_are_written(surfaces in proptest::collection::vec(surface(), 1..6)) {
        let mut term = HeadlessDriver::new(20, 10);
        let handle = term.handle();
        let refs: Vec<&Buffer> = surfaces.iter().collect();
        let written = paint_all(&mut term, &refs).unwrap();

        let writes = handle.writes();
        prop_assert_eq!(writes.len(), written);
        for (x, y, _) in writes {
            prop_assert!(surfaces.iter().any(|b| b.area().contains(x, y)));
        }
    }
}
