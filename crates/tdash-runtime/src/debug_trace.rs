#![forbid(unsafe_code)]

//! Stderr tracing for thread lifecycles, switched on by environment.
//!
//! Set `TDASH_DEBUG_TRACE=1` (or `true`) before launching to get
//! timestamped lines for worker, event-source and render-loop start/stop.
//! With the variable unset every call site reduces to one static bool load.
//!
//! ```ignore
//! tdash_runtime::debug_trace!("worker started: capacity={:?}", capacity);
//! ```

use std::sync::LazyLock;
use std::time::Instant;

static DEBUG_TRACE_ENABLED: LazyLock<bool> = LazyLock::new(|| {
    std::env::var("TDASH_DEBUG_TRACE")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
});

static START_TIME: LazyLock<Instant> = LazyLock::new(Instant::now);

#[inline]
pub fn is_enabled() -> bool {
    *DEBUG_TRACE_ENABLED
}

/// Milliseconds since the first trace call in this process.
#[inline]
pub fn elapsed_ms() -> u64 {
    u64::try_from(START_TIME.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Print a timestamped line to stderr when `TDASH_DEBUG_TRACE` is set.
#[macro_export]
macro_rules! debug_trace {
    ($($arg:tt)*) => {
        if $crate::debug_trace::is_enabled() {
            eprintln!(
                "[TDASH {:>8}ms] {}",
                $crate::debug_trace::elapsed_ms(),
                format_args!($($arg)*)
            );
        }
    };
}
