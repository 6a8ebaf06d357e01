use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tradeguard_core::{AppError, AppResult};

/// Handle given to a cache loader.
///
/// Long loaders should call [`Self::ensure_lease_held`] between steps so
/// they stop early once another instance may have taken over the key.
#[derive(Debug, Clone)]
pub struct LoadContext {
    key: String,
    lease_lost: Option<Arc<AtomicBool>>,
}

impl LoadContext {
    pub(super) fn exclusive(key: &str, lease_lost: Arc<AtomicBool>) -> Self {
        Self {
            key: key.to_owned(),
            lease_lost: Some(lease_lost),
        }
    }

    pub(super) fn unguarded(key: &str) -> Self {
        Self {
            key: key.to_owned(),
            lease_lost: None,
        }
    }

    /// Returns the namespaced cache key being computed.
    #[must_use]
    pub fn key(&self) -> &str {
        self.key.as_str()
    }

    /// Returns whether this load runs under the recompute lock.
    #[must_use]
    pub fn is_exclusive(&self) -> bool {
        self.lease_lost.is_some()
    }

    /// Returns true once the recompute lease has been lost.
    #[must_use]
    pub fn lease_lost(&self) -> bool {
        self.lease_lost
            .as_ref()
            .is_some_and(|lost| lost.load(Ordering::SeqCst))
    }

    /// Fails with `LockLost` once the recompute lease has been lost.
    pub fn ensure_lease_held(&self) -> AppResult<()> {
        if self.lease_lost() {
            return Err(AppError::LockLost(format!(
                "lease on '{}' was lost during recompute",
                self.key
            )));
        }

        Ok(())
    }
}
