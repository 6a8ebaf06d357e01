use std::time::Instant;

use chrono::Utc;

/// Time source for every time-based decision.
pub trait Clock: Send + Sync {
    /// Monotonic time for in-process state machines and buckets.
    fn now(&self) -> Instant;

    /// Wall-clock epoch milliseconds for timestamps shared across instances.
    fn epoch_millis(&self) -> i64;
}

/// Clock backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn epoch_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}
