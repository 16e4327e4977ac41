#![forbid(unsafe_code)]

//! Cooperative cancellation shared by the worker, event sources and loops.
//!
//! [`StopSignal::new`] returns a pair: the [`StopSignal`] half is handed to
//! the thread that should stop, the [`StopTrigger`] half stays with whoever
//! decides when. Triggering is sticky; once stopped, a signal never resets.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

type Shared = Arc<(Mutex<bool>, Condvar)>;

fn flag(inner: &Shared) -> MutexGuard<'_, bool> {
    inner.0.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Observer half of a cancellation pair.
#[derive(Clone)]
pub struct StopSignal {
    inner: Shared,
}

impl StopSignal {
    /// Create a fresh `(signal, trigger)` pair.
    pub fn new() -> (Self, StopTrigger) {
        let inner: Shared = Arc::new((Mutex::new(false), Condvar::new()));
        (
            Self {
                inner: inner.clone(),
            },
            StopTrigger { inner },
        )
    }

    pub fn is_stopped(&self) -> bool {
        *flag(&self.inner)
    }

    /// Block until stopped or `duration` elapses.
    ///
    /// Returns `true` if stopped, `false` on timeout. Spurious wakeups are
    /// absorbed.
    pub fn wait_timeout(&self, duration: Duration) -> bool {
        let cvar = &self.inner.1;
        let mut stopped = flag(&self.inner);
        let deadline = Instant::now() + duration;
        while !*stopped {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = cvar
                .wait_timeout(stopped, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            stopped = guard;
        }
        true
    }

    /// Block until stopped.
    pub fn wait(&self) {
        let cvar = &self.inner.1;
        let mut stopped = flag(&self.inner);
        while !*stopped {
            stopped = cvar.wait(stopped).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl std::fmt::Debug for StopSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopSignal")
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Controller half of a cancellation pair.
#[derive(Clone)]
pub struct StopTrigger {
    inner: Shared,
}

impl StopTrigger {
    /// Raise the signal and wake every waiter.
    pub fn stop(&self) {
        let mut stopped = flag(&self.inner);
        *stopped = true;
        self.inner.1.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *flag(&self.inner)
    }
}

impl std::fmt::Debug for StopTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopTrigger")
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
