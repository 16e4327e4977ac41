#![forbid(unsafe_code)]

//! tdash public facade crate.
//!
//! Re-exports the types a dashboard needs from the internal crates and
//! offers a prelude.
//!
//! ```no_run
//! use tdash::prelude::*;
//!
//! fn main() -> tdash::Result<()> {
//!     let session = Session::init(CrosstermDriver::default(), SessionConfig::default())?;
//!
//!     let mut title = Buffer::new(Rect::new(0, 0, 20, 1));
//!     title.set_string(0, 0, "press q to quit", Attribute::DEFAULT, Attribute::DEFAULT);
//!     session.render(&[&title]);
//!
//!     let events = std::sync::Arc::clone(session.events());
//!     session.events().handle("/sys/kbd/q", move |_| events.stop_loop());
//!     session.run_loop();
//!     session.close();
//!     Ok(())
//! }
//! ```

use std::fmt;

// --- Core re-exports -------------------------------------------------------

pub use tdash_core::attribute::{Attribute, Color, StyleFlags};
pub use tdash_core::driver::{InputSource, SharedDriver, TerminalDriver};
pub use tdash_core::event::{
    Event, KeyCode, KeyEvent, Modifiers, MouseButton, MouseEvent, MouseEventKind,
};
pub use tdash_core::geometry::{Point, Rect};
#[cfg(not(target_arch = "wasm32"))]
pub use tdash_core::terminal_session::{SessionOptions, TerminalSession};

// --- Render re-exports -----------------------------------------------------

pub use tdash_render::buffer::{Buffer, Drawable};
pub use tdash_render::cell::Cell;
#[cfg(not(target_arch = "wasm32"))]
pub use tdash_render::crossterm_driver::CrosstermDriver;
pub use tdash_render::headless::{HeadlessDriver, HeadlessHandle};

// --- Runtime re-exports ----------------------------------------------------

#[cfg(feature = "runtime")]
pub use tdash_runtime::{
    BusEvent, CustomSender, EventPayload, EventStream, Grid, InitError, RenderJob, Session,
    SessionConfig, SharedGrid, SubmitError, WidgetManager,
};

// --- Errors ---------------------------------------------------------------

/// Top-level error type for tdash apps.
#[derive(Debug)]
pub enum Error {
    /// I/O failure during terminal operations.
    Io(std::io::Error),
    /// The session could not start.
    #[cfg(feature = "runtime")]
    Init(InitError),
    /// Work was submitted to a closed session.
    #[cfg(feature = "runtime")]
    Submit(SubmitError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "{err}"),
            #[cfg(feature = "runtime")]
            Self::Init(err) => write!(f, "{err}"),
            #[cfg(feature = "runtime")]
            Self::Submit(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            #[cfg(feature = "runtime")]
            Self::Init(err) => Some(err),
            #[cfg(feature = "runtime")]
            Self::Submit(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

#[cfg(feature = "runtime")]
impl From<InitError> for Error {
    fn from(err: InitError) -> Self {
        Self::Init(err)
    }
}

#[cfg(feature = "runtime")]
impl From<SubmitError> for Error {
    fn from(err: SubmitError) -> Self {
        Self::Submit(err)
    }
}

/// Standard result type for tdash APIs.
pub type Result<T> = std::result::Result<T, Error>;

// --- Prelude --------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        Attribute, Buffer, Cell, Color, Drawable, Error, Event, KeyCode, KeyEvent, Modifiers,
        Point, Rect, Result, StyleFlags,
    };

    #[cfg(not(target_arch = "wasm32"))]
    pub use crate::CrosstermDriver;

    #[cfg(feature = "runtime")]
    pub use crate::{BusEvent, EventPayload, Session, SessionConfig};

    pub use crate::{core, render};
    #[cfg(feature = "runtime")]
    pub use crate::runtime;
}

pub use tdash_core as core;
pub use tdash_render as render;
#[cfg(feature = "runtime")]
pub use tdash_runtime as runtime;
