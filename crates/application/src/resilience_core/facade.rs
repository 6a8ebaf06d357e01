use std::future::Future;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tradeguard_core::{AppError, AppResult};
use tradeguard_domain::{Admission, CacheTtlPolicy, RejectionReason};

use crate::bloom_service::BloomPreFilter;
use crate::cache_service::{LoadContext, StampedeSafeCache};
use crate::circuit_breaker_service::CircuitBreakerRegistry;
use crate::lock_service::DistributedLockService;
use crate::rate_limit_service::{RateLimitOptions, RateLimitService};

use super::settings::{CoordinationPorts, ResilienceSettings};

/// One read through the full admission and caching path.
#[derive(Debug, Clone, Copy)]
pub struct GuardedRead<'a> {
    /// Cache key of the value.
    pub cache_key: &'a str,
    /// Value checked against the bloom pre-filter, if any.
    pub bloom_value: Option<&'a str>,
    /// Caller identity for the per-user quota.
    pub user_id: Option<&'a str>,
    /// Request category for the per-category quota.
    pub category: Option<&'a str>,
    /// Circuit breaker guarding the loader's downstream.
    pub dependency: &'a str,
    /// Freshness policy of the cached value.
    pub ttl: CacheTtlPolicy,
}

impl<'a> GuardedRead<'a> {
    /// Creates a read with no bloom check and no caller dimensions.
    #[must_use]
    pub fn new(cache_key: &'a str, dependency: &'a str, ttl: CacheTtlPolicy) -> Self {
        Self {
            cache_key,
            bloom_value: None,
            user_id: None,
            category: None,
            dependency,
            ttl,
        }
    }

    /// Checks `value` against the bloom pre-filter first.
    #[must_use]
    pub fn with_bloom_value(mut self, value: &'a str) -> Self {
        self.bloom_value = Some(value);
        self
    }

    /// Charges the read to `user_id`.
    #[must_use]
    pub fn for_user(mut self, user_id: &'a str) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Charges the read to `category`.
    #[must_use]
    pub fn in_category(mut self, category: &'a str) -> Self {
        self.category = Some(category);
        self
    }
}

/// Result of a guarded read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome<T> {
    /// The value, from cache or freshly computed.
    Served(T),
    /// The bloom pre-filter ruled the key out.
    KnownAbsent,
    /// A rate limit or open circuit denied the read.
    Rejected(RejectionReason),
    /// No value could be produced in time; see
    /// [`StampedeSafeCache::get_or_compute`].
    Unavailable,
}

/// Facade owning one instance of every resilience primitive.
#[derive(Clone)]
pub struct ResilienceCore {
    rate_limits: RateLimitService,
    breakers: CircuitBreakerRegistry,
    locks: DistributedLockService,
    cache: StampedeSafeCache,
    bloom: Option<BloomPreFilter>,
}

impl ResilienceCore {
    /// Wires the primitives to the given ports.
    pub fn new(ports: CoordinationPorts, settings: ResilienceSettings) -> AppResult<Self> {
        let rate_limits = RateLimitService::new(
            ports.sliding_windows,
            ports.metrics.clone(),
            ports.clock.clone(),
            RateLimitOptions {
                store_timeout: settings.store_timeout,
                fallback_max_wait: settings.fallback_max_wait,
            },
            settings.rate_limit_rules,
        );
        let breakers = CircuitBreakerRegistry::new(
            settings.breaker_defaults,
            ports.metrics.clone(),
            ports.clock.clone(),
        );
        let locks =
            DistributedLockService::new(ports.locks, ports.metrics.clone(), settings.store_timeout);
        let cache = StampedeSafeCache::new(
            ports.shared_cache,
            locks.clone(),
            ports.metrics.clone(),
            ports.clock,
            settings.cache,
        )?;
        let bloom = settings
            .bloom
            .map(|bloom| {
                BloomPreFilter::new(
                    ports.bloom_bits,
                    ports.metrics,
                    bloom.filter_key,
                    bloom.config,
                    settings.store_timeout,
                )
            })
            .transpose()?;

        Ok(Self {
            rate_limits,
            breakers,
            locks,
            cache,
            bloom,
        })
    }

    /// Returns the rate limiter.
    #[must_use]
    pub fn rate_limits(&self) -> &RateLimitService {
        &self.rate_limits
    }

    /// Returns the breaker registry.
    #[must_use]
    pub fn breakers(&self) -> &CircuitBreakerRegistry {
        &self.breakers
    }

    /// Returns the lock service.
    #[must_use]
    pub fn locks(&self) -> &DistributedLockService {
        &self.locks
    }

    /// Returns the cache.
    #[must_use]
    pub fn cache(&self) -> &StampedeSafeCache {
        &self.cache
    }

    /// Returns the bloom pre-filter when configured.
    #[must_use]
    pub fn bloom(&self) -> Option<&BloomPreFilter> {
        self.bloom.as_ref()
    }

    /// Reads one value through bloom check, rate limits and cache.
    ///
    /// Cache hits are served even while the dependency's circuit is open;
    /// the breaker only guards `loader`.
    pub async fn guarded_read<T, F, Fut>(
        &self,
        request: GuardedRead<'_>,
        loader: F,
    ) -> AppResult<ReadOutcome<T>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce(LoadContext) -> Fut + Send + 'static,
        Fut: Future<Output = AppResult<T>> + Send + 'static,
    {
        if let (Some(bloom), Some(value)) = (&self.bloom, request.bloom_value)
            && !bloom.might_contain(value).await
        {
            return Ok(ReadOutcome::KnownAbsent);
        }

        let admission = self
            .rate_limits
            .admit_request(request.user_id, request.category, 1)
            .await?;
        if let Admission::Rejected(reason) = admission {
            return Ok(ReadOutcome::Rejected(reason));
        }

        let breakers = self.breakers.clone();
        let dependency = request.dependency.to_owned();
        let guarded_loader = move |context: LoadContext| async move {
            breakers.call(&dependency, loader(context)).await
        };

        match self
            .cache
            .get_or_compute(request.cache_key, request.ttl, guarded_loader)
            .await
        {
            Ok(Some(value)) => Ok(ReadOutcome::Served(value)),
            Ok(None) => Ok(ReadOutcome::Unavailable),
            Err(AppError::CircuitOpen(name)) => {
                Ok(ReadOutcome::Rejected(RejectionReason::CircuitOpen { name }))
            }
            Err(error) => Err(error),
        }
    }
}
