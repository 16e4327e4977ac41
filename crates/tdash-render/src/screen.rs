#![forbid(unsafe_code)]

//! Dense row-major cell grid shared by the in-memory and native drivers.

use crate::cell::Cell;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Screen {
    pub(crate) width: u16,
    pub(crate) height: u16,
    pub(crate) cells: Vec<Cell>,
}

impl Screen {
    pub(crate) fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            cells: vec![Cell::BLANK; usize::from(width) * usize::from(height)],
        }
    }

    /// Linear index of `(x, y)`, or `None` when out of bounds.
    pub(crate) fn index(&self, x: u16, y: u16) -> Option<usize> {
        (x < self.width && y < self.height)
            .then(|| usize::from(y) * usize::from(self.width) + usize::from(x))
    }

    /// Cell at `(x, y)`; blank when out of bounds.
    pub(crate) fn get(&self, x: u16, y: u16) -> Cell {
        self.index(x, y).map_or(Cell::BLANK, |i| self.cells[i])
    }

    /// Store a cell; out-of-bounds writes are dropped.
    pub(crate) fn set(&mut self, x: u16, y: u16, cell: Cell) -> bool {
        match self.index(x, y) {
            Some(i) => {
                self.cells[i] = cell;
                true
            }
            None => false,
        }
    }

    /// Resize, keeping the overlapping top-left region.
    pub(crate) fn resize(&mut self, width: u16, height: u16) {
        if (width, height) == (self.width, self.height) {
            return;
        }
        let mut next = Screen::new(width, height);
        for y in 0..self.height.min(height) {
            for x in 0..self.width.min(width) {
                next.set(x, y, self.get(x, y));
            }
        }
        *self = next;
    }

    pub(crate) fn row(&self, y: u16) -> String {
        (0..self.width).map(|x| self.get(x, y).ch).collect()
    }
}
