#![forbid(unsafe_code)]

//! Abstract color and style attributes.
//!
//! Widgets and the render pipeline speak in [`Attribute`]s. Each terminal
//! driver converts them into its own native representation at the moment a
//! cell is written, so nothing above the driver depends on a specific
//! terminal library.

use bitflags::bitflags;

/// A terminal color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Color {
    /// The terminal's own default color.
    #[default]
    Default,
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
    /// A 256-color palette entry.
    Indexed(u8),
    /// A true-color value.
    Rgb(u8, u8, u8),
}

bitflags! {
    /// Text style flags that can be combined with any color.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StyleFlags: u8 {
        const BOLD      = 0b0001;
        const UNDERLINE = 0b0010;
        const REVERSE   = 0b0100;
    }
}

/// A color plus style flags, used for both foreground and background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Attribute {
    pub color: Color,
    pub flags: StyleFlags,
}

impl Attribute {
    /// The terminal default: default color, no flags.
    pub const DEFAULT: Self = Self::new(Color::Default);

    /// Create an attribute with the given color and no flags.
    #[inline]
    pub const fn new(color: Color) -> Self {
        Self {
            color,
            flags: StyleFlags::empty(),
        }
    }

    /// Add the bold flag.
    #[must_use]
    pub const fn bold(mut self) -> Self {
        self.flags = self.flags.union(StyleFlags::BOLD);
        self
    }

    /// Add the underline flag.
    #[must_use]
    pub const fn underline(mut self) -> Self {
        self.flags = self.flags.union(StyleFlags::UNDERLINE);
        self
    }

    /// Add the reverse-video flag.
    #[must_use]
    pub const fn reverse(mut self) -> Self {
        self.flags = self.flags.union(StyleFlags::REVERSE);
        self
    }

    /// True when this is exactly the terminal default.
    #[inline]
    pub fn is_default(&self) -> bool {
        *self == Self::DEFAULT
    }
}

impl From<Color> for Attribute {
    fn from(color: Color) -> Self {
        Self::new(color)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_attribute_is_terminal_default() {
        let attr = Attribute::default();
        assert_eq!(attr.color, Color::Default);
        assert!(attr.flags.is_empty());
        assert!(attr.is_default());
    }

    #[test]
    fn flags_accumulate() {
        let attr = Attribute::new(Color::Red).bold().underline();
        assert!(attr.flags.contains(StyleFlags::BOLD | StyleFlags::UNDERLINE));
        assert!(!attr.flags.contains(StyleFlags::REVERSE));
        assert!(!attr.is_default());
    }

    #[test]
    fn from_color() {
        assert_eq!(Attribute::from(Color::Rgb(1, 2, 3)).color, Color::Rgb(1, 2, 3));
    }
}
