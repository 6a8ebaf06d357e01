//! Application services and ports of the resilience layer.

#![forbid(unsafe_code)]

mod bloom_service;
mod cache_service;
mod circuit_breaker_service;
mod lock_service;
mod rate_limit_service;
mod resilience_core;
mod resilience_ports;
mod store_call;

#[cfg(test)]
mod test_support;

pub use bloom_service::BloomPreFilter;
pub use cache_service::{
    CacheOptions, LoadContext, LockLossPolicy, StampedeSafeCache, StoreFailurePolicy,
};
pub use circuit_breaker_service::CircuitBreakerRegistry;
pub use lock_service::{DistributedLockService, LeaseHeartbeat};
pub use rate_limit_service::{
    DEFAULT_FALLBACK_MAX_WAIT, RateLimitOptions, RateLimitRules, RateLimitService,
};
pub use resilience_core::{
    BloomSettings, CoordinationPorts, GuardedRead, ReadOutcome, ResilienceCore,
    ResilienceSettings,
};
pub use resilience_ports::{
    BloomBitStore, Clock, LockCoordinator, NoopMetrics, ResilienceMetrics, SharedCacheStore,
    SlidingWindowStore, SystemClock,
};
pub use store_call::DEFAULT_STORE_TIMEOUT;
