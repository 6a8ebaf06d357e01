use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tradeguard_core::{AppError, AppResult};
use tradeguard_domain::{
    Admission, LimiterKind, RateLimitKey, RateLimitPolicy, RateLimitScope, RejectionReason,
};

use crate::resilience_ports::{Clock, ResilienceMetrics, SlidingWindowStore};
use crate::store_call::bounded_store_call;

use super::config::{RateLimitOptions, RateLimitRules};
use super::token_bucket::TokenBucket;

const TRY_ACQUIRE_OPERATION: &str = "rate_limit.try_acquire";
pub(super) const LOCAL_BUCKET_PRUNE_THRESHOLD: usize = 1_024;

/// Application service for distributed admission control.
#[derive(Clone)]
pub struct RateLimitService {
    store: Arc<dyn SlidingWindowStore>,
    metrics: Arc<dyn ResilienceMetrics>,
    clock: Arc<dyn Clock>,
    options: RateLimitOptions,
    rules: Arc<RwLock<RateLimitRules>>,
    local_buckets: Arc<DashMap<String, Arc<Mutex<TokenBucket>>>>,
}

impl RateLimitService {
    /// Creates a new rate limit service.
    #[must_use]
    pub fn new(
        store: Arc<dyn SlidingWindowStore>,
        metrics: Arc<dyn ResilienceMetrics>,
        clock: Arc<dyn Clock>,
        options: RateLimitOptions,
        rules: RateLimitRules,
    ) -> Self {
        Self {
            store,
            metrics,
            clock,
            options,
            rules: Arc::new(RwLock::new(rules)),
            local_buckets: Arc::new(DashMap::new()),
        }
    }

    /// Returns the active per-dimension rules.
    #[must_use]
    pub fn rules(&self) -> RateLimitRules {
        *self.rules.read()
    }

    /// Replaces or clears one dimension's rule; the next request observes it.
    pub fn set_rule(&self, scope: RateLimitScope, policy: Option<RateLimitPolicy>) {
        self.rules.write().set_rule(scope, policy);
        match policy {
            Some(policy) => tracing::info!(
                scope = scope.as_str(),
                limit = policy.limit(),
                window_ms = policy.window().as_millis() as u64,
                "rate limit rule updated"
            ),
            None => tracing::info!(scope = scope.as_str(), "rate limit rule cleared"),
        }
    }

    /// Attempts to admit `permits` requests against one key.
    ///
    /// The shared window is authoritative. Store errors and timeouts switch
    /// this call to the local token bucket for the same key; the store is
    /// tried again on the next call.
    pub async fn try_acquire(
        &self,
        key: &RateLimitKey,
        permits: u32,
        policy: RateLimitPolicy,
    ) -> AppResult<Admission> {
        if permits == 0 {
            return Err(AppError::ConfigInvalid(
                "rate limit permits must be greater than zero".to_owned(),
            ));
        }

        if permits > policy.limit() {
            tracing::debug!(
                scope = key.scope().as_str(),
                identifier = key.identifier(),
                permits,
                limit = policy.limit(),
                "rate limit request larger than the limit"
            );
            return Ok(Admission::Rejected(RejectionReason::PermitsExceedLimit {
                scope: key.scope(),
                identifier: key.identifier().to_owned(),
                permits,
                limit: policy.limit(),
            }));
        }

        let storage_key = key.storage_key();
        let admitted = bounded_store_call(
            self.metrics.as_ref(),
            TRY_ACQUIRE_OPERATION,
            self.options.store_timeout,
            self.store
                .try_admit(&storage_key, permits, policy, self.clock.epoch_millis()),
        )
        .await;

        if admitted.is_ok() {
            self.drop_local_buckets();
        }

        match admitted {
            Ok(true) => Ok(Admission::Admitted),
            Ok(false) => Ok(self.reject(key, LimiterKind::SlidingWindow)),
            Err(error) => {
                tracing::warn!(
                    key = %storage_key,
                    error = %error,
                    "sliding window store unavailable, using local token bucket"
                );
                Ok(self.try_acquire_local(key, storage_key, permits, policy).await)
            }
        }
    }

    /// Checks each `(key, policy)` pair in order and stops at the first
    /// rejection. Permits taken by earlier dimensions are not returned.
    pub async fn check_all(
        &self,
        checks: &[(RateLimitKey, RateLimitPolicy)],
        permits: u32,
    ) -> AppResult<Admission> {
        for (key, policy) in checks {
            let admission = self.try_acquire(key, permits, *policy).await?;
            if !admission.is_admitted() {
                return Ok(admission);
            }
        }

        Ok(Admission::Admitted)
    }

    /// Applies the configured rules in global, user, category order.
    ///
    /// Dimensions without a rule, and user or category dimensions without an
    /// identifier, are skipped.
    pub async fn admit_request(
        &self,
        user_id: Option<&str>,
        category: Option<&str>,
        permits: u32,
    ) -> AppResult<Admission> {
        let rules = self.rules();
        let mut checks = Vec::with_capacity(RateLimitScope::CHECK_ORDER.len());

        for scope in RateLimitScope::CHECK_ORDER {
            let Some(policy) = rules.rule(scope) else {
                continue;
            };

            let key = match scope {
                RateLimitScope::Global => RateLimitKey::global(),
                RateLimitScope::User => match user_id {
                    Some(user_id) => RateLimitKey::user(user_id)?,
                    None => continue,
                },
                RateLimitScope::Category => match category {
                    Some(category) => RateLimitKey::category(category)?,
                    None => continue,
                },
            };
            checks.push((key, policy));
        }

        self.check_all(&checks, permits).await
    }

    async fn try_acquire_local(
        &self,
        key: &RateLimitKey,
        storage_key: String,
        permits: u32,
        policy: RateLimitPolicy,
    ) -> Admission {
        self.prune_idle_buckets();
        let bucket = Arc::clone(
            self.local_buckets
                .entry(storage_key)
                .or_insert_with(|| Arc::new(Mutex::new(TokenBucket::new(policy, self.clock.now()))))
                .value(),
        );

        let wait = {
            let mut bucket = bucket.lock();
            bucket.reconfigure(policy);
            match bucket.try_take(permits, self.clock.now()) {
                Ok(()) => return Admission::Admitted,
                Err(wait) => wait,
            }
        };

        if wait > self.options.fallback_max_wait {
            return self.reject(key, LimiterKind::LocalTokenBucket);
        }

        tokio::time::sleep(wait).await;
        if bucket.lock().try_take(permits, self.clock.now()).is_ok() {
            return Admission::Admitted;
        }

        self.reject(key, LimiterKind::LocalTokenBucket)
    }

    /// The shared window is authoritative again; local state is discarded.
    fn drop_local_buckets(&self) {
        if self.local_buckets.is_empty() {
            return;
        }

        let dropped = self.local_buckets.len();
        self.local_buckets.clear();
        tracing::info!(dropped, "sliding window store reachable, dropped local token buckets");
    }

    // A refilled bucket behaves exactly like a new one, so it can go.
    fn prune_idle_buckets(&self) {
        if self.local_buckets.len() < LOCAL_BUCKET_PRUNE_THRESHOLD {
            return;
        }

        let now = self.clock.now();
        self.local_buckets
            .retain(|_, bucket| !bucket.lock().is_full_at(now));
    }

    #[cfg(test)]
    pub(super) fn local_bucket_count(&self) -> usize {
        self.local_buckets.len()
    }

    fn reject(&self, key: &RateLimitKey, limiter: LimiterKind) -> Admission {
        self.metrics
            .record_rejection(limiter.as_str(), key.scope().as_str());
        tracing::debug!(
            scope = key.scope().as_str(),
            identifier = key.identifier(),
            limiter = limiter.as_str(),
            "rate limit rejected request"
        );

        Admission::Rejected(RejectionReason::RateLimited {
            scope: key.scope(),
            identifier: key.identifier().to_owned(),
            limiter,
        })
    }
}
