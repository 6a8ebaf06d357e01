use std::time::Duration;

use async_trait::async_trait;
use tradeguard_core::AppResult;

/// Shared cache tier holding serialized entries.
#[async_trait]
pub trait SharedCacheStore: Send + Sync {
    /// Returns the serialized entry for a key.
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Stores a serialized entry, replacing any existing one.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()>;

    /// Stores a serialized entry only when the key is absent.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> AppResult<bool>;

    /// Removes a key.
    async fn delete(&self, key: &str) -> AppResult<()>;
}
