use std::time::Duration;

use tradeguard_core::{AppError, AppResult};

use crate::DEFAULT_STORE_TIMEOUT;

/// What to do with a value computed after the lease was lost.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LockLossPolicy {
    /// Discard the value and return `LockLost`.
    #[default]
    Abort,
    /// Publish only where no entry exists yet, and return the value.
    PublishIfAbsent,
}

/// What to do on a miss when the lock cannot be acquired because the
/// coordination store is unavailable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StoreFailurePolicy {
    /// Skip the recompute and report the value as unavailable.
    #[default]
    FailRecompute,
    /// Recompute without exclusivity and publish only where absent.
    ProceedWithoutLock,
}

/// Tuning for one [`StampedeSafeCache`](crate::StampedeSafeCache).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheOptions {
    /// Namespace prepended to every cache and lock key.
    pub key_prefix: String,
    /// Lease duration of the recompute lock; renewed every third.
    pub lock_ttl: Duration,
    /// Deadline for one loader invocation.
    pub loader_timeout: Duration,
    /// Deadline for one shared-store call.
    pub store_timeout: Duration,
    /// How long a caller that lost the lock race polls for the winner's value.
    pub contention_wait: Duration,
    /// Delay between those polls.
    pub contention_poll_interval: Duration,
    /// Local tier capacity before eviction.
    pub local_max_entries: usize,
    /// Behavior when the lease is lost mid-recompute.
    pub lock_loss_policy: LockLossPolicy,
    /// Behavior when the lock store is unreachable on a miss.
    pub store_failure_policy: StoreFailurePolicy,
}

impl CacheOptions {
    /// Checks every bound is usable.
    pub fn validate(&self) -> AppResult<()> {
        if self.key_prefix.trim().is_empty() {
            return Err(AppError::ConfigInvalid(
                "cache key prefix must not be empty".to_owned(),
            ));
        }

        for (name, value) in [
            ("lock_ttl", self.lock_ttl),
            ("loader_timeout", self.loader_timeout),
            ("store_timeout", self.store_timeout),
            ("contention_poll_interval", self.contention_poll_interval),
        ] {
            if value.is_zero() {
                return Err(AppError::ConfigInvalid(format!(
                    "cache {name} must be greater than zero"
                )));
            }
        }

        if self.local_max_entries == 0 {
            return Err(AppError::ConfigInvalid(
                "cache local_max_entries must be greater than zero".to_owned(),
            ));
        }

        Ok(())
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            key_prefix: "cache".to_owned(),
            lock_ttl: Duration::from_secs(10),
            loader_timeout: Duration::from_secs(5),
            store_timeout: DEFAULT_STORE_TIMEOUT,
            contention_wait: Duration::from_millis(200),
            contention_poll_interval: Duration::from_millis(20),
            local_max_entries: 10_000,
            lock_loss_policy: LockLossPolicy::default(),
            store_failure_policy: StoreFailurePolicy::default(),
        }
    }
}
