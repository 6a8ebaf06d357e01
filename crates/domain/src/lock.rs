use std::time::Duration;

use serde::{Deserialize, Serialize};
use tradeguard_core::{AppError, AppResult, NonEmptyString};

/// Shortest heartbeat interval a lease will schedule.
pub const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(10);

/// Owner token unique to one acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockToken(String);

impl LockToken {
    /// Generates a fresh random token.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Generates a token prefixed with a holder identity for diagnostics.
    #[must_use]
    pub fn for_holder(holder_id: &str) -> Self {
        Self(format!("{holder_id}:{}", uuid::Uuid::new_v4()))
    }

    /// Returns the token value stored in the coordination store.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<String> for LockToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Lock held by one caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockLease {
    key: String,
    token: LockToken,
    ttl: Duration,
}

impl LockLease {
    /// Creates a lease record for an acquired lock.
    pub fn new(key: impl Into<String>, token: LockToken, ttl: Duration) -> AppResult<Self> {
        let key = NonEmptyString::new(key)
            .map_err(|_| AppError::ConfigInvalid("lock key must not be empty".to_owned()))?;
        validate_lock_ttl(ttl)?;

        Ok(Self {
            key: key.into(),
            token,
            ttl,
        })
    }

    /// Returns the lock key.
    #[must_use]
    pub fn key(&self) -> &str {
        self.key.as_str()
    }

    /// Returns the owner token.
    #[must_use]
    pub fn token(&self) -> &LockToken {
        &self.token
    }

    /// Returns the lease duration.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the renewal interval, one third of the lease.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        (self.ttl / 3).max(MIN_HEARTBEAT_INTERVAL)
    }
}

/// Rejects lease durations the store cannot express.
pub fn validate_lock_ttl(ttl: Duration) -> AppResult<()> {
    if ttl.as_millis() == 0 {
        return Err(AppError::ConfigInvalid(
            "lock ttl must be at least one millisecond".to_owned(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{LockLease, LockToken, MIN_HEARTBEAT_INTERVAL};

    #[test]
    fn generated_tokens_are_unique() {
        assert_ne!(LockToken::generate(), LockToken::generate());
        assert!(LockToken::for_holder("node-a").as_str().starts_with("node-a:"));
    }

    #[test]
    fn heartbeat_runs_at_a_third_of_the_lease() {
        let lease = LockLease::new("quotes:600519", LockToken::generate(), Duration::from_secs(9));
        assert!(lease.is_ok());
        assert_eq!(
            lease.unwrap_or_else(|_| unreachable!()).heartbeat_interval(),
            Duration::from_secs(3)
        );
    }

    #[test]
    fn heartbeat_interval_has_a_floor() {
        let lease = LockLease::new("k", LockToken::generate(), Duration::from_millis(3));
        assert!(lease.is_ok());
        assert_eq!(
            lease.unwrap_or_else(|_| unreachable!()).heartbeat_interval(),
            MIN_HEARTBEAT_INTERVAL
        );
    }

    #[test]
    fn empty_key_and_zero_ttl_are_rejected() {
        assert!(LockLease::new(" ", LockToken::generate(), Duration::from_secs(1)).is_err());
        assert!(LockLease::new("k", LockToken::generate(), Duration::from_micros(10)).is_err());
    }
}
