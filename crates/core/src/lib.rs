//! Shared primitives for all Rust crates in Tradeguard.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across Tradeguard crates.
pub type AppResult<T> = Result<T, AppError>;

/// A validated non-empty UTF-8 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NonEmptyString(String);

impl NonEmptyString {
    /// Creates a validated non-empty string.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::ConfigInvalid(
                "value must not be empty or whitespace".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

impl std::fmt::Display for NonEmptyString {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

/// Common error categories of the resilience layer.
///
/// `RateLimited`, `CircuitOpen` and `LockLost` are the only variants business
/// callers are expected to branch on. `StoreUnavailable` is absorbed by each
/// primitive and converted into its fallback before it reaches them.
#[derive(Debug, Error)]
pub enum AppError {
    /// Non-positive threshold, empty key, or otherwise unusable configuration.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Admission was denied by a rate limit.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Admission was denied because the named circuit is open.
    #[error("circuit open: {0}")]
    CircuitOpen(String),

    /// The shared coordination store failed or timed out.
    #[error("coordination store unavailable: {0}")]
    StoreUnavailable(String),

    /// A lock lease was lost while the guarded computation was running.
    #[error("lock lost: {0}")]
    LockLost(String),

    /// A bounded operation ran past its deadline.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns true for expected "try later" rejections.
    #[must_use]
    pub fn is_admission_denied(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::CircuitOpen(_))
    }
}
