//! Injectable time source.
//!
//! TTL expiry and circuit-breaker timeouts are driven by wall-clock time;
//! tests need to control that clock deterministically. Components take an
//! `Arc<dyn Clock>` and default to [`SystemClock`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

/// Source of "now" for TTLs, breaker timeouts, and metric bucketing.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// Real wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Manually-advanced clock for deterministic tests.
///
/// Starts at the real current time (or a given instant) and only moves
/// when [`advance`](Self::advance) is called.
#[derive(Debug)]
pub struct ManualClock {
    base: SystemTime,
    offset_ms: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::starting_at(SystemTime::now())
    }

    pub fn starting_at(at: SystemTime) -> Self {
        Self {
            base: at,
            offset_ms: AtomicU64::new(0),
        }
    }

    /// Move the clock forward by `delta` (millisecond granularity).
    pub fn advance(&self, delta: Duration) {
        self.offset_ms
            .fetch_add(delta.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        self.base + Duration::from_millis(self.offset_ms.load(Ordering::SeqCst))
    }
}
