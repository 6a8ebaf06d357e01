use std::sync::Arc;
use std::time::Duration;

use tradeguard_core::AppResult;
use tradeguard_domain::{LockLease, LockToken, validate_lock_ttl};

use crate::resilience_ports::{LockCoordinator, ResilienceMetrics};
use crate::store_call::bounded_store_call;

use super::heartbeat::LeaseHeartbeat;

/// Application service for cross-instance mutual exclusion.
#[derive(Clone)]
pub struct DistributedLockService {
    coordinator: Arc<dyn LockCoordinator>,
    metrics: Arc<dyn ResilienceMetrics>,
    store_timeout: Duration,
}

impl DistributedLockService {
    /// Creates a new lock service.
    #[must_use]
    pub fn new(
        coordinator: Arc<dyn LockCoordinator>,
        metrics: Arc<dyn ResilienceMetrics>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            coordinator,
            metrics,
            store_timeout,
        }
    }

    /// Attempts to acquire `key` for `ttl` under a fresh token.
    ///
    /// Returns `None` when another holder owns the key. Store failures are
    /// returned as errors; the caller decides whether to proceed unguarded.
    pub async fn acquire(&self, key: &str, ttl: Duration) -> AppResult<Option<LockLease>> {
        validate_lock_ttl(ttl)?;
        let token = LockToken::generate();
        let lease = LockLease::new(key, token, ttl)?;

        let acquired = bounded_store_call(
            self.metrics.as_ref(),
            "lock.acquire",
            self.store_timeout,
            self.coordinator.try_acquire(lease.key(), lease.token(), ttl),
        )
        .await?;

        if acquired {
            tracing::debug!(key = lease.key(), "lock acquired");
            return Ok(Some(lease));
        }

        Ok(None)
    }

    /// Extends a lease by its ttl; false means the lease is no longer held.
    pub async fn renew(&self, lease: &LockLease) -> AppResult<bool> {
        bounded_store_call(
            self.metrics.as_ref(),
            "lock.renew",
            self.store_timeout,
            self.coordinator
                .renew(lease.key(), lease.token(), lease.ttl()),
        )
        .await
    }

    /// Releases a lease; false means the key was absent or held by another
    /// token, which is left untouched.
    pub async fn release(&self, lease: &LockLease) -> AppResult<bool> {
        let released = bounded_store_call(
            self.metrics.as_ref(),
            "lock.release",
            self.store_timeout,
            self.coordinator.release(lease.key(), lease.token()),
        )
        .await?;

        if !released {
            tracing::debug!(key = lease.key(), "lock already expired or taken over");
        }

        Ok(released)
    }

    /// Starts renewing `lease` every third of its ttl until stopped.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn start_heartbeat(&self, lease: &LockLease) -> LeaseHeartbeat {
        LeaseHeartbeat::spawn(self.clone(), lease.clone())
    }
}
