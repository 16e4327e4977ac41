#![forbid(unsafe_code)]

//! The terminal driver contract.
//!
//! A [`TerminalDriver`] is the single shared mutable resource of a dashboard
//! session. It is not required to be safe for concurrent use: the runtime
//! wraps it in a [`SharedDriver`] and funnels every mutating call through
//! one lock, so implementations can assume exclusive `&mut self` access.
//!
//! Input is read through a separate [`InputSource`] so that a thread blocked
//! waiting for keystrokes never holds the driver lock.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::attribute::Attribute;
use crate::event::Event;

/// Operations the runtime requires from a terminal backend.
pub trait TerminalDriver: Send {
    /// Put the terminal into the mode the dashboard needs (raw mode,
    /// alternate screen, ...).
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal cannot be initialized. The driver
    /// must leave the terminal untouched in that case.
    fn init(&mut self) -> io::Result<()>;

    /// Restore the terminal to the state it had before [`init`](Self::init).
    fn shutdown(&mut self) -> io::Result<()>;

    /// Query the current terminal size as `(width, height)`.
    fn size(&mut self) -> io::Result<(u16, u16)>;

    /// Write one cell into the driver's back buffer. Not visible until
    /// [`flush`](Self::flush).
    fn set_cell(&mut self, x: u16, y: u16, glyph: char, fg: Attribute, bg: Attribute)
    -> io::Result<()>;

    /// Make all pending cell writes visible.
    fn flush(&mut self) -> io::Result<()>;

    /// Reset every cell of the back buffer to a blank with the given colors.
    fn clear(&mut self, fg: Attribute, bg: Attribute) -> io::Result<()>;

    /// Hand out the source of native input events.
    ///
    /// Called once during session initialization, after [`init`](Self::init).
    fn input_source(&mut self) -> Box<dyn InputSource>;
}

/// A blocking source of native terminal events.
pub trait InputSource: Send {
    /// Wait up to `timeout` for the next event.
    ///
    /// Returns `Ok(None)` on timeout or when the native event has no
    /// canonical equivalent.
    fn poll_event(&mut self, timeout: Duration) -> io::Result<Option<Event>>;
}

/// A driver behind the lock that serializes every terminal operation.
pub type SharedDriver = Arc<Mutex<Box<dyn TerminalDriver>>>;

/// Wrap a driver for sharing between the worker and its producers.
pub fn share(driver: impl TerminalDriver + 'static) -> SharedDriver {
    Arc::new(Mutex::new(Box::new(driver)))
}

/// Lock a shared driver.
///
/// A panic inside a deferred job poisons the lock; the terminal itself is
/// still usable, so poisoning is ignored.
pub fn lock(driver: &SharedDriver) -> MutexGuard<'_, Box<dyn TerminalDriver>> {
    driver.lock().unwrap_or_else(PoisonError::into_inner)
}
