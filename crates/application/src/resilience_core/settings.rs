use std::sync::Arc;
use std::time::Duration;

use tradeguard_domain::{BloomConfig, CircuitBreakerConfig};

use crate::cache_service::CacheOptions;
use crate::rate_limit_service::{DEFAULT_FALLBACK_MAX_WAIT, RateLimitRules};
use crate::resilience_ports::{
    BloomBitStore, Clock, LockCoordinator, ResilienceMetrics, SharedCacheStore,
    SlidingWindowStore,
};
use crate::DEFAULT_STORE_TIMEOUT;

/// Adapters the core is wired to.
#[derive(Clone)]
pub struct CoordinationPorts {
    /// Sliding-window counters.
    pub sliding_windows: Arc<dyn SlidingWindowStore>,
    /// Token-owned locks.
    pub locks: Arc<dyn LockCoordinator>,
    /// Shared cache tier.
    pub shared_cache: Arc<dyn SharedCacheStore>,
    /// Bloom filter bits.
    pub bloom_bits: Arc<dyn BloomBitStore>,
    /// Observability sink.
    pub metrics: Arc<dyn ResilienceMetrics>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
}

/// Bloom pre-filter placement and geometry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BloomSettings {
    /// Store key of the bit array.
    pub filter_key: String,
    /// Filter geometry.
    pub config: BloomConfig,
}

/// Startup configuration of the core.
#[derive(Debug, Clone, PartialEq)]
pub struct ResilienceSettings {
    /// Deadline for one rate limit, lock or bloom store call.
    pub store_timeout: Duration,
    /// Bounded wait on the local fallback bucket.
    pub fallback_max_wait: Duration,
    /// Initial per-dimension quotas.
    pub rate_limit_rules: RateLimitRules,
    /// Configuration of breakers created on first use.
    pub breaker_defaults: CircuitBreakerConfig,
    /// Cache tuning.
    pub cache: CacheOptions,
    /// Optional bloom pre-filter; reads skip the check without one.
    pub bloom: Option<BloomSettings>,
}

impl Default for ResilienceSettings {
    fn default() -> Self {
        Self {
            store_timeout: DEFAULT_STORE_TIMEOUT,
            fallback_max_wait: DEFAULT_FALLBACK_MAX_WAIT,
            rate_limit_rules: RateLimitRules::default(),
            breaker_defaults: CircuitBreakerConfig::default(),
            cache: CacheOptions::default(),
            bloom: None,
        }
    }
}
