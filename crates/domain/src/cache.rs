use std::time::Duration;

use serde::{Deserialize, Serialize};
use tradeguard_core::{AppError, AppResult};

/// Freshness of a cache entry at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Before soft expiry; serve as is.
    Fresh,
    /// Between soft and hard expiry; serve and refresh in the background.
    Stale,
    /// At or past hard expiry; never served.
    Expired,
}

/// Soft/hard expiry policy for one cached value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheTtlPolicy {
    soft_ttl: Duration,
    hard_ttl: Duration,
    max_jitter: Duration,
}

impl CacheTtlPolicy {
    /// Creates a policy. `max_jitter` bounds the random extra lifetime added
    /// to the hard expiry of every published entry.
    pub fn new(soft_ttl: Duration, hard_ttl: Duration, max_jitter: Duration) -> AppResult<Self> {
        if soft_ttl.is_zero() || hard_ttl.is_zero() {
            return Err(AppError::ConfigInvalid(
                "cache soft and hard ttl must be greater than zero".to_owned(),
            ));
        }

        if soft_ttl > hard_ttl {
            return Err(AppError::ConfigInvalid(format!(
                "cache soft ttl ({}ms) must not exceed hard ttl ({}ms)",
                soft_ttl.as_millis(),
                hard_ttl.as_millis()
            )));
        }

        Ok(Self {
            soft_ttl,
            hard_ttl,
            max_jitter,
        })
    }

    /// Returns the soft ttl.
    #[must_use]
    pub fn soft_ttl(&self) -> Duration {
        self.soft_ttl
    }

    /// Returns the hard ttl before jitter.
    #[must_use]
    pub fn hard_ttl(&self) -> Duration {
        self.hard_ttl
    }

    /// Returns the jitter bound.
    #[must_use]
    pub fn max_jitter(&self) -> Duration {
        self.max_jitter
    }

    /// Maps a uniformly random sample onto `[0, max_jitter]`.
    #[must_use]
    pub fn jitter_from_sample(&self, sample: u64) -> Duration {
        let bound = u64::try_from(self.max_jitter.as_millis()).unwrap_or(u64::MAX);
        if bound == 0 {
            return Duration::ZERO;
        }

        Duration::from_millis(sample % bound.saturating_add(1))
    }
}

/// Cached payload with its expiry schedule.
///
/// Expiries are epoch milliseconds so every instance sharing the entry
/// evaluates freshness the same way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    payload: T,
    computed_at_ms: i64,
    soft_expiry_ms: i64,
    hard_expiry_ms: i64,
}

impl<T> CacheEntry<T> {
    /// Creates an entry computed at `computed_at_ms`; `jitter` extends only
    /// the hard expiry.
    #[must_use]
    pub fn new(payload: T, computed_at_ms: i64, policy: &CacheTtlPolicy, jitter: Duration) -> Self {
        let soft_expiry_ms = computed_at_ms.saturating_add(duration_millis(policy.soft_ttl));
        let hard_expiry_ms = computed_at_ms
            .saturating_add(duration_millis(policy.hard_ttl))
            .saturating_add(duration_millis(jitter));

        Self {
            payload,
            computed_at_ms,
            soft_expiry_ms,
            hard_expiry_ms,
        }
    }

    /// Returns freshness at `now_ms`.
    #[must_use]
    pub fn freshness(&self, now_ms: i64) -> Freshness {
        if now_ms >= self.hard_expiry_ms {
            Freshness::Expired
        } else if now_ms >= self.soft_expiry_ms {
            Freshness::Stale
        } else {
            Freshness::Fresh
        }
    }

    /// Returns time left before hard expiry, zero when already expired.
    #[must_use]
    pub fn remaining_hard_ttl(&self, now_ms: i64) -> Duration {
        let remaining = self.hard_expiry_ms.saturating_sub(now_ms);
        Duration::from_millis(u64::try_from(remaining).unwrap_or(0))
    }

    /// Returns the payload.
    #[must_use]
    pub fn payload(&self) -> &T {
        &self.payload
    }

    /// Consumes the entry and returns the payload.
    #[must_use]
    pub fn into_payload(self) -> T {
        self.payload
    }

    /// Returns when the payload was computed.
    #[must_use]
    pub fn computed_at_ms(&self) -> i64 {
        self.computed_at_ms
    }

    /// Returns the soft expiry.
    #[must_use]
    pub fn soft_expiry_ms(&self) -> i64 {
        self.soft_expiry_ms
    }

    /// Returns the hard expiry.
    #[must_use]
    pub fn hard_expiry_ms(&self) -> i64 {
        self.hard_expiry_ms
    }
}

fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
