//! Redis-backed bloom filter bits.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tradeguard_application::BloomBitStore;
use tradeguard_core::{AppError, AppResult};
use tradeguard_domain::MAX_BLOOM_BITS;

/// Largest bit offset a Redis string can address.
const MAX_BIT_OFFSET: u64 = MAX_BLOOM_BITS - 1;

/// Redis implementation of the bloom bit store port, one string per filter.
#[derive(Clone)]
pub struct RedisBloomBitStore {
    connection: ConnectionManager,
    key_prefix: String,
}

impl RedisBloomBitStore {
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

fn check_offset(offset: u64) -> AppResult<()> {
    if offset > MAX_BIT_OFFSET {
        return Err(AppError::ConfigInvalid(format!(
            "bloom bit offset {offset} exceeds the redis limit of {MAX_BIT_OFFSET}"
        )));
    }

    Ok(())
}

#[async_trait]
impl BloomBitStore for RedisBloomBitStore {
    async fn get_bit(&self, key: &str, offset: u64) -> AppResult<bool> {
        check_offset(offset)?;

        let mut connection = self.connection.clone();
        let bit: i32 = redis::cmd("GETBIT")
            .arg(self.key_for(key))
            .arg(offset)
            .query_async(&mut connection)
            .await
            .map_err(|error| AppError::StoreUnavailable(format!("failed to read bloom bit: {error}")))?;

        Ok(bit == 1)
    }

    async fn set_bits(&self, key: &str, offsets: &[u64]) -> AppResult<()> {
        let redis_key = self.key_for(key);
        let mut pipeline = redis::pipe();
        for offset in offsets {
            check_offset(*offset)?;
            pipeline
                .cmd("SETBIT")
                .arg(redis_key.as_str())
                .arg(*offset)
                .arg(1)
                .ignore();
        }

        let mut connection = self.connection.clone();
        pipeline
            .query_async::<()>(&mut connection)
            .await
            .map_err(|error| {
                AppError::StoreUnavailable(format!("failed to write bloom bits: {error}"))
            })
    }
}
