#![forbid(unsafe_code)]

//! Surface buffers and the drawable contract.
//!
//! A [`Buffer`] is a sparse cell map plus a bounding rectangle. Only cells
//! whose coordinate lies inside the rectangle are in scope for compositing;
//! the map may hold stale or speculative cells outside it, and those are
//! ignored by [`Buffer::cells_in_area`].

use std::collections::HashMap;

use tdash_core::attribute::Attribute;
use tdash_core::geometry::{Point, Rect};

use crate::cell::Cell;

/// Anything that can be composited onto the terminal.
pub trait Drawable {
    /// Produce the surface's current cell map and bounding rectangle.
    fn buffer(&self) -> Buffer;
}

/// A sparse cell map with a bounding rectangle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Buffer {
    area: Rect,
    cells: HashMap<Point, Cell>,
}

impl Buffer {
    /// An empty buffer covering `area`.
    pub fn new(area: Rect) -> Self {
        Self {
            area,
            cells: HashMap::new(),
        }
    }

    /// A buffer covering `area` with every in-area coordinate set to `cell`.
    pub fn filled(area: Rect, cell: Cell) -> Self {
        let mut buf = Self::new(area);
        buf.fill(cell);
        buf
    }

    /// The bounding rectangle.
    #[inline]
    pub fn area(&self) -> Rect {
        self.area
    }

    /// Replace the bounding rectangle. Cells already in the map are kept even
    /// if they now fall outside it.
    pub fn set_area(&mut self, area: Rect) {
        self.area = area;
    }

    /// Store a cell. Coordinates outside the area are accepted but will not
    /// be composited.
    pub fn set(&mut self, x: u16, y: u16, cell: Cell) {
        self.cells.insert(Point::new(x, y), cell);
    }

    pub fn get(&self, x: u16, y: u16) -> Option<&Cell> {
        self.cells.get(&Point::new(x, y))
    }

    /// Write `text` left to right starting at `(x, y)`, advancing by each
    /// char's display width.
    ///
    /// A wide char also claims the next column with a blank continuation
    /// cell. Zero-width chars are dropped. Returns the column after the last
    /// char written.
    pub fn set_string(
        &mut self,
        x: u16,
        y: u16,
        text: &str,
        fg: Attribute,
        bg: Attribute,
    ) -> u16 {
        let mut col = x;
        for ch in text.chars() {
            let cell = Cell::new(ch, fg, bg);
            let width = cell.width();
            if width == 0 {
                continue;
            }
            self.set(col, y, cell);
            if width == 2 {
                let Some(next) = col.checked_add(1) else { break };
                self.set(next, y, Cell::new(' ', fg, bg));
            }
            let Some(after) = u16::try_from(width).ok().and_then(|w| col.checked_add(w)) else {
                break;
            };
            col = after;
        }
        col
    }

    /// Set every coordinate of the area to `cell`.
    pub fn fill(&mut self, cell: Cell) {
        for p in self.area.points() {
            self.cells.insert(p, cell);
        }
    }

    /// Copy every cell of `other` over this buffer (later wins) and grow the
    /// area to cover both.
    pub fn merge(&mut self, other: &Buffer) {
        self.cells.extend(other.cells.iter().map(|(p, c)| (*p, *c)));
        self.area = if self.area.is_empty() {
            other.area
        } else if other.area.is_empty() {
            self.area
        } else {
            let x = self.area.x.min(other.area.x);
            let y = self.area.y.min(other.area.y);
            let right = self.area.right().max(other.area.right());
            let bottom = self.area.bottom().max(other.area.bottom());
            Rect::new(x, y, right - x, bottom - y)
        };
    }

    /// Number of cells in the map, including out-of-area ones.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Every stored cell, in no particular order.
    pub fn cells(&self) -> impl Iterator<Item = (Point, &Cell)> {
        self.cells.iter().map(|(p, c)| (*p, c))
    }

    /// Only the cells whose coordinate lies inside the area.
    pub fn cells_in_area(&self) -> impl Iterator<Item = (Point, &Cell)> {
        let area = self.area;
        self.cells().filter(move |(p, _)| p.is_in(area))
    }
}

impl Drawable for Buffer {
    fn buffer(&self) -> Buffer {
        self.clone()
    }
}

impl<T: Drawable + ?Sized> Drawable for &T {
    fn buffer(&self) -> Buffer {
        (**self).buffer()
    }
}

impl<T: Drawable + ?Sized> Drawable for Box<T> {
    fn buffer(&self) -> Buffer {
        (**self).buffer()
    }
}
