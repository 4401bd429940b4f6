//! Monotonic clock source
//!
//! Provides the epoch-ms wall-clock reading used to resolve `NOW` in
//! queries and to timestamp records at insert time. Never goes backward,
//! even if the wall clock is adjusted underneath us.

use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};

/// A clock source that guarantees non-decreasing epoch-ms timestamps.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    /// High-water mark: the largest timestamp we've ever returned (ms)
    high_water_ms: AtomicI64,
}

impl MonotonicClock {
    /// Create a new clock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a non-decreasing epoch-ms timestamp.
    ///
    /// If the wall clock has gone backward (e.g. NTP adjustment), returns
    /// the previous high-water mark instead.
    pub fn now_millis(&self) -> i64 {
        let wall = Utc::now().timestamp_millis();
        loop {
            let prev = self.high_water_ms.load(Ordering::Acquire);
            let ts = wall.max(prev);
            match self.high_water_ms.compare_exchange_weak(
                prev,
                ts,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return ts,
                Err(_) => continue, // CAS failed, retry
            }
        }
    }
}
