#![forbid(unsafe_code)]

//! Render kernel: cells, surface buffers, compositing, and terminal drivers.

pub mod buffer;
pub mod cell;
pub mod composite;
#[cfg(not(target_arch = "wasm32"))]
pub mod crossterm_driver;
pub mod headless;
mod screen;

pub use buffer::{Buffer, Drawable};
pub use cell::Cell;
