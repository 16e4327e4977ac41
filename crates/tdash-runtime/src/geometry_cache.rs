#![forbid(unsafe_code)]

//! Terminal width and height, refreshed every time they are read.
//!
//! Reads query the driver under its lock and store the answer, so a resize
//! is visible on the very next read. Do not read from inside a job that
//! already holds the driver lock.

use std::sync::atomic::{AtomicU32, Ordering};

use tdash_core::driver::{SharedDriver, lock};

/// Width in the high half, height in the low half, so a read never pairs
/// dimensions from two different queries.
#[derive(Debug, Default)]
pub struct GeometryCache {
    size: AtomicU32,
}

fn pack(width: u16, height: u16) -> u32 {
    (u32::from(width) << 16) | u32::from(height)
}

fn unpack(size: u32) -> (u16, u16) {
    ((size >> 16) as u16, size as u16)
}

impl GeometryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Query the driver and store its answer.
    ///
    /// If the query fails the previous values are kept and returned.
    pub fn refresh(&self, driver: &SharedDriver) -> (u16, u16) {
        let size = lock(driver).size();
        match size {
            Ok((width, height)) => self.store(width, height),
            Err(err) => tracing::warn!(error = %err, "terminal size query failed"),
        }
        self.cached()
    }

    pub fn width(&self, driver: &SharedDriver) -> u16 {
        self.refresh(driver).0
    }

    pub fn height(&self, driver: &SharedDriver) -> u16 {
        self.refresh(driver).1
    }

    /// Last stored size, without querying.
    pub fn cached(&self) -> (u16, u16) {
        unpack(self.size.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, width: u16, height: u16) {
        self.size.store(pack(width, height), Ordering::Release);
    }
}
