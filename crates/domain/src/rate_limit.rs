use std::time::Duration;

use serde::{Deserialize, Serialize};
use tradeguard_core::{AppError, AppResult, NonEmptyString};

/// Slowest refill rate the local fallback bucket is allowed to use.
pub const MIN_FALLBACK_REFILL_PER_SECOND: f64 = 0.01;

/// Extra store-level expiry kept on a sliding window beyond the window itself.
pub const WINDOW_EXPIRY_GRACE: Duration = Duration::from_secs(1);

const GLOBAL_IDENTIFIER: &str = "all";

/// Admission dimension a rate limit applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitScope {
    /// One quota shared by every caller.
    Global,
    /// One quota per user.
    User,
    /// One quota per request category.
    Category,
}

impl RateLimitScope {
    /// Order in which multi-dimensional checks are enforced.
    ///
    /// The widest dimension goes first so overload is shed before any
    /// per-user or per-category window is touched.
    pub const CHECK_ORDER: [Self; 3] = [Self::Global, Self::User, Self::Category];

    /// Returns stable scope value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::User => "user",
            Self::Category => "category",
        }
    }
}

/// Composite key identifying one rate-limit counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RateLimitKey {
    scope: RateLimitScope,
    identifier: String,
}

impl RateLimitKey {
    /// Creates a key for one scope and identifier.
    pub fn new(scope: RateLimitScope, identifier: impl Into<String>) -> AppResult<Self> {
        let identifier = NonEmptyString::new(identifier).map_err(|_| {
            AppError::ConfigInvalid(format!(
                "{} rate limit identifier must not be empty",
                scope.as_str()
            ))
        })?;

        Ok(Self {
            scope,
            identifier: identifier.into(),
        })
    }

    /// Creates the single global key.
    #[must_use]
    pub fn global() -> Self {
        Self {
            scope: RateLimitScope::Global,
            identifier: GLOBAL_IDENTIFIER.to_owned(),
        }
    }

    /// Creates a per-user key.
    pub fn user(user_id: impl Into<String>) -> AppResult<Self> {
        Self::new(RateLimitScope::User, user_id)
    }

    /// Creates a per-category key.
    pub fn category(category: impl Into<String>) -> AppResult<Self> {
        Self::new(RateLimitScope::Category, category)
    }

    /// Returns the key scope.
    #[must_use]
    pub fn scope(&self) -> RateLimitScope {
        self.scope
    }

    /// Returns the identifier within the scope.
    #[must_use]
    pub fn identifier(&self) -> &str {
        self.identifier.as_str()
    }

    /// Returns the namespaced key used by both the shared window and the
    /// local bucket.
    #[must_use]
    pub fn storage_key(&self) -> String {
        format!("{}:{}", self.scope.as_str(), self.identifier.as_str())
    }
}

/// Validated quota for one dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    limit: u32,
    window: Duration,
}

impl RateLimitPolicy {
    /// Creates a policy admitting at most `limit` permits per `window`.
    pub fn new(limit: u32, window: Duration) -> AppResult<Self> {
        if limit == 0 {
            return Err(AppError::ConfigInvalid(
                "rate limit must be greater than zero".to_owned(),
            ));
        }

        if window.is_zero() {
            return Err(AppError::ConfigInvalid(
                "rate limit window must be greater than zero".to_owned(),
            ));
        }

        Ok(Self { limit, window })
    }

    /// Returns the maximum permits per window.
    #[must_use]
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Returns the sliding window length.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns the store-level expiry for the window record.
    #[must_use]
    pub fn store_expiry(&self) -> Duration {
        self.window.saturating_add(WINDOW_EXPIRY_GRACE)
    }

    /// Returns the refill rate of the local fallback bucket.
    #[must_use]
    pub fn fallback_refill_per_second(&self) -> f64 {
        (f64::from(self.limit) / self.window.as_secs_f64()).max(MIN_FALLBACK_REFILL_PER_SECOND)
    }
}
