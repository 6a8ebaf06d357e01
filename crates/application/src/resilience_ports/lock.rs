use std::time::Duration;

use async_trait::async_trait;
use tradeguard_core::AppResult;
use tradeguard_domain::LockToken;

/// Distributed coordination port for token-owned locks.
#[async_trait]
pub trait LockCoordinator: Send + Sync {
    /// Sets the key to `token` with expiry `ttl` only when the key is absent.
    async fn try_acquire(&self, key: &str, token: &LockToken, ttl: Duration) -> AppResult<bool>;

    /// Extends the expiry only while the stored token equals `token`.
    async fn renew(&self, key: &str, token: &LockToken, ttl: Duration) -> AppResult<bool>;

    /// Deletes the key only while the stored token equals `token`.
    async fn release(&self, key: &str, token: &LockToken) -> AppResult<bool>;
}
