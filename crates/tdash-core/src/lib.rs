#![forbid(unsafe_code)]

//! Core: attributes, geometry, input events, the terminal driver contract,
//! and the native terminal mode guard.

pub mod attribute;
pub mod driver;
pub mod event;
pub mod geometry;
pub mod logging;
#[cfg(not(target_arch = "wasm32"))]
pub mod terminal_session;

// Re-export tracing macros at crate root for ergonomic use.
#[cfg(feature = "tracing")]
pub use logging::{debug, error, info, trace, warn};
