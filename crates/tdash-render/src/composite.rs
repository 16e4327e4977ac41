#![forbid(unsafe_code)]

//! Painter's-algorithm compositing onto a terminal driver.
//!
//! Surfaces are written in the order given; a later surface overwrites any
//! coordinate an earlier one already wrote. Within one surface only the
//! cells inside its bounding rectangle are written.

use std::io;

use tdash_core::attribute::Attribute;
use tdash_core::driver::TerminalDriver;
use tdash_core::geometry::Rect;

use crate::buffer::{Buffer, Drawable};

/// Write every in-area cell of `buf` to the driver's back buffer.
///
/// Returns the number of cells written.
///
/// # Errors
///
/// Stops at, and returns, the first driver write error.
pub fn paint(driver: &mut dyn TerminalDriver, buf: &Buffer) -> io::Result<usize> {
    let mut written = 0;
    for (p, cell) in buf.cells_in_area() {
        driver.set_cell(p.x, p.y, cell.ch, cell.fg, cell.bg)?;
        written += 1;
    }
    Ok(written)
}

/// Composite `surfaces` left to right.
///
/// # Errors
///
/// Returns the first driver write error; later surfaces are not written.
pub fn paint_all<D: Drawable + ?Sized>(
    driver: &mut dyn TerminalDriver,
    surfaces: &[&D],
) -> io::Result<usize> {
    let mut written = 0;
    for surface in surfaces {
        written += paint(driver, &surface.buffer())?;
    }
    Ok(written)
}

/// Fill `rect` with blanks on background `bg`.
///
/// # Errors
///
/// Returns the first driver write error.
pub fn fill_area(driver: &mut dyn TerminalDriver, rect: Rect, bg: Attribute) -> io::Result<()> {
    for p in rect.points() {
        driver.set_cell(p.x, p.y, ' ', Attribute::DEFAULT, bg)?;
    }
    Ok(())
}
