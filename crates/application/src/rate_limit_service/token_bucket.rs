use std::time::{Duration, Instant};

use tradeguard_domain::RateLimitPolicy;

/// Per-instance bucket used while the shared window is unreachable.
#[derive(Debug)]
pub(super) struct TokenBucket {
    capacity: f64,
    refill_per_second: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub(super) fn new(policy: RateLimitPolicy, now: Instant) -> Self {
        let capacity = f64::from(policy.limit());
        Self {
            capacity,
            refill_per_second: policy.fallback_refill_per_second(),
            tokens: capacity,
            last_refill: now,
        }
    }

    /// Follows a policy change without refilling the bucket.
    pub(super) fn reconfigure(&mut self, policy: RateLimitPolicy) {
        self.capacity = f64::from(policy.limit());
        self.refill_per_second = policy.fallback_refill_per_second();
        self.tokens = self.tokens.min(self.capacity);
    }

    /// Takes `permits` tokens, or returns how long until they are available.
    ///
    /// Requests larger than the capacity can never succeed and report
    /// `Duration::MAX`.
    pub(super) fn try_take(&mut self, permits: u32, now: Instant) -> Result<(), Duration> {
        self.refill(now);

        let wanted = f64::from(permits);
        if self.tokens >= wanted {
            self.tokens -= wanted;
            return Ok(());
        }

        if wanted > self.capacity {
            return Err(Duration::MAX);
        }

        Err(Duration::from_secs_f64(
            (wanted - self.tokens) / self.refill_per_second,
        ))
    }

    /// Returns whether the bucket will have refilled to capacity by `now`.
    pub(super) fn is_full_at(&self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.tokens + elapsed.as_secs_f64() * self.refill_per_second >= self.capacity
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.refill_per_second)
            .min(self.capacity);
        self.last_refill = now;
    }
}
