//! Redis-backed token-owned locks.

use std::time::Duration;

use async_trait::async_trait;
use redis::Script;
use redis::aio::ConnectionManager;
use tradeguard_application::LockCoordinator;
use tradeguard_core::{AppError, AppResult};
use tradeguard_domain::LockToken;

use crate::redis_connection::expiry_millis;

const RELEASE_LOCK_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
else
  return 0
end
"#;

const RENEW_LOCK_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('PEXPIRE', KEYS[1], ARGV[2])
else
  return 0
end
"#;

/// Redis implementation of the lock coordinator port.
#[derive(Clone)]
pub struct RedisLockCoordinator {
    connection: ConnectionManager,
    key_prefix: String,
}

impl RedisLockCoordinator {
    /// Creates a coordinator with a shared connection and key prefix.
    #[must_use]
    pub fn new(connection: ConnectionManager, key_prefix: impl Into<String>) -> Self {
        Self {
            connection,
            key_prefix: key_prefix.into(),
        }
    }

    fn key_for(&self, key: &str) -> String {
        format!("{}:lock:{key}", self.key_prefix)
    }
}

#[async_trait]
impl LockCoordinator for RedisLockCoordinator {
    async fn try_acquire(&self, key: &str, token: &LockToken, ttl: Duration) -> AppResult<bool> {
        let mut connection = self.connection.clone();

        // Value and expiry in one command; a lock never exists without a TTL.
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.key_for(key))
            .arg(token.as_str())
            .arg("NX")
            .arg("PX")
            .arg(expiry_millis(ttl))
            .query_async(&mut connection)
            .await
            .map_err(|error| AppError::StoreUnavailable(format!("failed to acquire lock: {error}")))?;

        Ok(reply.is_some())
    }

    async fn renew(&self, key: &str, token: &LockToken, ttl: Duration) -> AppResult<bool> {
        let mut connection = self.connection.clone();
        let renewed: i32 = Script::new(RENEW_LOCK_SCRIPT)
            .key(self.key_for(key))
            .arg(token.as_str())
            .arg(expiry_millis(ttl))
            .invoke_async(&mut connection)
            .await
            .map_err(|error| AppError::StoreUnavailable(format!("failed to renew lock: {error}")))?;

        Ok(renewed > 0)
    }

    async fn release(&self, key: &str, token: &LockToken) -> AppResult<bool> {
        let mut connection = self.connection.clone();
        let released: i32 = Script::new(RELEASE_LOCK_SCRIPT)
            .key(self.key_for(key))
            .arg(token.as_str())
            .invoke_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::StoreUnavailable(format!("failed to release lock: {error}"))
            })?;

        Ok(released > 0)
    }
}
