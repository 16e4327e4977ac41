#![forbid(unsafe_code)]

//! The cell: one glyph plus its foreground and background attributes.

use tdash_core::attribute::Attribute;

/// Immutable content of one terminal coordinate.
///
/// The default cell is a blank space in the terminal's default colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cell {
    pub ch: char,
    pub fg: Attribute,
    pub bg: Attribute,
}

impl Cell {
    /// A blank cell in default colors.
    pub const BLANK: Self = Self::new(' ', Attribute::DEFAULT, Attribute::DEFAULT);

    #[inline]
    pub const fn new(ch: char, fg: Attribute, bg: Attribute) -> Self {
        Self { ch, fg, bg }
    }

    /// A cell showing `ch` in default colors.
    #[inline]
    pub const fn from_char(ch: char) -> Self {
        Self::new(ch, Attribute::DEFAULT, Attribute::DEFAULT)
    }

    /// A blank cell with the given background.
    #[inline]
    pub const fn blank(bg: Attribute) -> Self {
        Self::new(' ', Attribute::DEFAULT, bg)
    }

    #[must_use]
    pub const fn with_fg(mut self, fg: Attribute) -> Self {
        self.fg = fg;
        self
    }

    #[must_use]
    pub const fn with_bg(mut self, bg: Attribute) -> Self {
        self.bg = bg;
        self
    }

    /// Display width of the glyph in terminal columns.
    ///
    /// Control characters and zero-width glyphs report 0.
    #[inline]
    pub fn width(&self) -> usize {
        unicode_width::UnicodeWidthChar::width(self.ch).unwrap_or(0)
    }
}

impl Default for Cell {
    fn default() -> Self {
        Self::BLANK
    }
}
