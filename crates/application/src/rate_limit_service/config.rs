use std::time::Duration;

use tradeguard_domain::{RateLimitPolicy, RateLimitScope};

use crate::DEFAULT_STORE_TIMEOUT;

/// Longest a fallback caller may wait for its bucket to refill.
pub const DEFAULT_FALLBACK_MAX_WAIT: Duration = Duration::from_millis(25);

/// Timeouts governing one rate limit service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitOptions {
    /// Deadline for one shared-store admission call.
    pub store_timeout: Duration,
    /// Bounded wait for local bucket tokens while the store is unavailable.
    pub fallback_max_wait: Duration,
}

impl Default for RateLimitOptions {
    fn default() -> Self {
        Self {
            store_timeout: DEFAULT_STORE_TIMEOUT,
            fallback_max_wait: DEFAULT_FALLBACK_MAX_WAIT,
        }
    }
}

/// Per-dimension quotas applied by [`RateLimitService::admit_request`].
///
/// A dimension without a rule is not checked.
///
/// [`RateLimitService::admit_request`]: crate::RateLimitService::admit_request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitRules {
    global: Option<RateLimitPolicy>,
    user: Option<RateLimitPolicy>,
    category: Option<RateLimitPolicy>,
}

impl RateLimitRules {
    /// Returns the rules with `policy` applied to `scope`.
    #[must_use]
    pub fn with_rule(mut self, scope: RateLimitScope, policy: RateLimitPolicy) -> Self {
        self.set_rule(scope, Some(policy));
        self
    }

    /// Replaces or clears the rule of one scope.
    pub fn set_rule(&mut self, scope: RateLimitScope, policy: Option<RateLimitPolicy>) {
        match scope {
            RateLimitScope::Global => self.global = policy,
            RateLimitScope::User => self.user = policy,
            RateLimitScope::Category => self.category = policy,
        }
    }

    /// Returns the rule of one scope.
    #[must_use]
    pub fn rule(&self, scope: RateLimitScope) -> Option<RateLimitPolicy> {
        match scope {
            RateLimitScope::Global => self.global,
            RateLimitScope::User => self.user,
            RateLimitScope::Category => self.category,
        }
    }
}
