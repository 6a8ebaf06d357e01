//! Domain value types and invariants of the resilience layer.

#![forbid(unsafe_code)]

mod admission;
mod bloom;
mod cache;
mod circuit_breaker;
mod lock;
mod rate_limit;

pub use admission::{Admission, LimiterKind, RejectionReason};
pub use bloom::{BloomConfig, DEFAULT_BLOOM_SEEDS, MAX_BLOOM_BITS};
pub use cache::{CacheEntry, CacheTtlPolicy, Freshness};
pub use circuit_breaker::{
    CircuitBreakerConfig, CircuitBreakerEntry, CircuitBreakerSnapshot, CircuitState,
    CircuitTransition,
};
pub use lock::{LockLease, LockToken, MIN_HEARTBEAT_INTERVAL, validate_lock_ttl};
pub use rate_limit::{
    MIN_FALLBACK_REFILL_PER_SECOND, RateLimitKey, RateLimitPolicy, RateLimitScope,
    WINDOW_EXPIRY_GRACE,
};
