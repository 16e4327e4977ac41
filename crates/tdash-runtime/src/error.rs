#![forbid(unsafe_code)]

//! Error types for session startup and job submission.

use std::fmt;
use std::io;

/// Why [`Session::init`](crate::session::Session::init) failed.
///
/// On either variant nothing is left running: no worker thread, no event
/// sources, and the terminal has been handed back.
#[derive(Debug)]
pub enum InitError {
    /// The terminal driver refused to initialize.
    Driver(io::Error),
    /// A background thread could not be spawned.
    Spawn(io::Error),
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::Driver(e) => write!(f, "terminal initialization failed: {e}"),
            InitError::Spawn(e) => write!(f, "failed to spawn background thread: {e}"),
        }
    }
}

impl std::error::Error for InitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InitError::Driver(e) | InitError::Spawn(e) => Some(e),
        }
    }
}

/// A job could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    /// The receiving thread has been cancelled or has exited.
    Closed,
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitError::Closed => f.write_str("queue is closed"),
        }
    }
}

impl std::error::Error for SubmitError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn init_error_exposes_source() {
        let err = InitError::Driver(io::Error::other("no tty"));
        assert_eq!(err.to_string(), "terminal initialization failed: no tty");
        assert!(err.source().is_some());
    }

    #[test]
    fn submit_error_display() {
        assert_eq!(SubmitError::Closed.to_string(), "queue is closed");
    }
}
