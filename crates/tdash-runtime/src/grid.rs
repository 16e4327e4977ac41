#![forbid(unsafe_code)]

//! The root layout container.
//!
//! Layout itself belongs to widget code; the session only owns the root's
//! origin, its width (kept in step with the terminal by the resize handler)
//! and its background.

use std::sync::{Arc, RwLock};

use tdash_core::attribute::Attribute;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Grid {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub bg: Attribute,
}

impl Grid {
    /// A root anchored at the origin.
    pub fn new(width: u16, bg: Attribute) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            bg,
        }
    }
}

/// The root container as shared between the session and its widgets.
pub type SharedGrid = Arc<RwLock<Grid>>;
