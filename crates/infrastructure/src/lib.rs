//! Infrastructure adapters for the resilience ports.

#![forbid(unsafe_code)]

mod in_memory_coordination_store;
mod redis_bloom_bit_store;
mod redis_connection;
mod redis_lock_coordinator;
mod redis_shared_cache_store;
mod redis_sliding_window_store;
mod tracing_metrics_sink;

pub use in_memory_coordination_store::InMemoryCoordinationStore;
pub use redis_bloom_bit_store::RedisBloomBitStore;
pub use redis_connection::connect_redis;
pub use redis_lock_coordinator::RedisLockCoordinator;
pub use redis_shared_cache_store::RedisSharedCacheStore;
pub use redis_sliding_window_store::RedisSlidingWindowStore;
pub use tracing_metrics_sink::TracingMetricsSink;
