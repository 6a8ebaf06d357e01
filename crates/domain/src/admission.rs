use serde::{Deserialize, Serialize};
use tradeguard_core::{AppError, AppResult};

use crate::rate_limit::RateLimitScope;

/// Which limiter was authoritative for a rate-limit decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimiterKind {
    /// Shared sliding window evaluated by the coordination store.
    SlidingWindow,
    /// In-process token bucket used while the store is unavailable.
    LocalTokenBucket,
}

impl LimiterKind {
    /// Returns stable limiter type value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SlidingWindow => "sliding_window",
            Self::LocalTokenBucket => "local_token_bucket",
        }
    }
}

/// Why an admission check rejected a unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RejectionReason {
    /// A quota for one dimension is exhausted for the current window.
    RateLimited {
        /// Dimension that rejected.
        scope: RateLimitScope,
        /// Identifier within the dimension.
        identifier: String,
        /// Limiter that made the decision.
        limiter: LimiterKind,
    },
    /// More permits were requested than the dimension's limit allows in any
    /// window; no limiter was consulted.
    PermitsExceedLimit {
        /// Dimension whose limit is too small.
        scope: RateLimitScope,
        /// Identifier within the dimension.
        identifier: String,
        /// Permits requested.
        permits: u32,
        /// Configured limit.
        limit: u32,
    },
    /// The named dependency's circuit is open.
    CircuitOpen {
        /// Circuit breaker name.
        name: String,
    },
}

/// Outcome of an admission check.
///
/// Rejection is a normal, frequent result and is therefore a value rather
/// than an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Admission {
    /// The unit of work may proceed.
    Admitted,
    /// The unit of work must not proceed.
    Rejected(RejectionReason),
}

impl Admission {
    /// Returns whether the unit of work may proceed.
    #[must_use]
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted)
    }

    /// Converts the outcome into a typed "try later" error for callers that
    /// propagate with `?`.
    pub fn into_result(self) -> AppResult<()> {
        match self {
            Self::Admitted => Ok(()),
            Self::Rejected(RejectionReason::RateLimited {
                scope, identifier, ..
            }) => Err(AppError::RateLimited(format!(
                "{} quota exhausted for '{identifier}'",
                scope.as_str()
            ))),
            Self::Rejected(RejectionReason::PermitsExceedLimit {
                scope,
                identifier,
                permits,
                limit,
            }) => Err(AppError::RateLimited(format!(
                "{permits} permits exceed the {} limit of {limit} for '{identifier}'",
                scope.as_str()
            ))),
            Self::Rejected(RejectionReason::CircuitOpen { name }) => {
                Err(AppError::CircuitOpen(name))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tradeguard_core::AppError;

    use super::{Admission, LimiterKind, RejectionReason};
    use crate::RateLimitScope;

    #[test]
    fn admitted_converts_to_ok() {
        assert!(Admission::Admitted.into_result().is_ok());
    }

    #[test]
    fn rate_limited_rejection_maps_to_rate_limited_error() {
        let admission = Admission::Rejected(RejectionReason::RateLimited {
            scope: RateLimitScope::User,
            identifier: "u-1".to_owned(),
            limiter: LimiterKind::SlidingWindow,
        });

        assert!(!admission.is_admitted());
        assert!(matches!(
            admission.into_result(),
            Err(AppError::RateLimited(message)) if message.contains("u-1")
        ));
    }

    #[test]
    fn circuit_rejection_maps_to_circuit_open_error() {
        let admission = Admission::Rejected(RejectionReason::CircuitOpen {
            name: "quotes".to_owned(),
        });

        assert!(matches!(
            admission.into_result(),
            Err(AppError::CircuitOpen(name)) if name == "quotes"
        ));
    }
}
