use async_trait::async_trait;
use tradeguard_core::AppResult;
use tradeguard_domain::RateLimitPolicy;

/// Shared coordination port for sliding-window admission counters.
#[async_trait]
pub trait SlidingWindowStore: Send + Sync {
    /// Atomically drops timestamps older than `now_ms - window`, counts the
    /// rest and, when `count + permits <= limit`, records `permits` new
    /// timestamps at `now_ms`.
    ///
    /// Returns whether the request was admitted. The purge, count and append
    /// must be a single step in the store so concurrent callers on any
    /// instance never overshoot the limit.
    async fn try_admit(
        &self,
        key: &str,
        permits: u32,
        policy: RateLimitPolicy,
        now_ms: i64,
    ) -> AppResult<bool>;
}
