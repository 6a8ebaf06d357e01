//! Redis-backed shared cache tier.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tradeguard_application::SharedCacheStore;
use tradeguard_core::{AppError, AppResult};

use crate::redis_connection::expiry_millis;

/// Redis implementation of the shared cache store port.
#[derive(Clone)]
pub struct RedisSharedCacheStore {
    connection: ConnectionManager,
    key_prefix: String,
}

impl RedisSharedCacheStore {
    /// Creates a store with a shared connection and key prefix.
    #[must_use]
    pub fn new(connection: ConnectionManager, key_prefix: impl Into<String>) -> Self {
        Self {
            connection,
            key_prefix: key_prefix.into(),
        }
    }

    fn key_for(&self, key: &str) -> String {
        format!("{}:{key}", self.key_prefix)
    }
}

#[async_trait]
impl SharedCacheStore for RedisSharedCacheStore {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut connection = self.connection.clone();
        connection
            .get(self.key_for(key))
            .await
            .map_err(|error| AppError::StoreUnavailable(format!("failed to read cache entry: {error}")))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        let mut connection = self.connection.clone();
        connection
            .pset_ex::<_, _, ()>(self.key_for(key), value, expiry_millis(ttl))
            .await
            .map_err(|error| {
                AppError::StoreUnavailable(format!("failed to write cache entry: {error}"))
            })
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> AppResult<bool> {
        let mut connection = self.connection.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.key_for(key))
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(expiry_millis(ttl))
            .query_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::StoreUnavailable(format!("failed to write cache entry: {error}"))
            })?;

        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let mut connection = self.connection.clone();
        connection
            .del::<_, ()>(self.key_for(key))
            .await
            .map_err(|error| {
                AppError::StoreUnavailable(format!("failed to delete cache entry: {error}"))
            })
    }
}
