//! Redis-backed sliding window admission counters.

use async_trait::async_trait;
use redis::Script;
use redis::aio::ConnectionManager;
use tradeguard_application::SlidingWindowStore;
use tradeguard_core::{AppError, AppResult};
use tradeguard_domain::RateLimitPolicy;

use crate::redis_connection::expiry_millis;

// Purge, count and append must run as one atomic step.
const TRY_ADMIT_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])
local permits = tonumber(ARGV[4])
local expiry = tonumber(ARGV[5])
local member = ARGV[6]

redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window)
local count = redis.call('ZCARD', key)
if count + permits > limit then
  return 0
end

for index = 1, permits do
  redis.call('ZADD', key, now, member .. ':' .. index)
end
redis.call('PEXPIRE', key, expiry)
return 1
"#;

/// Redis implementation of the sliding window store port.
///
/// Each window is a sorted set of admission timestamps scored by epoch
/// milliseconds.
#[derive(Clone)]
pub struct RedisSlidingWindowStore {
    connection: ConnectionManager,
    key_prefix: String,
    script: Script,
}

impl RedisSlidingWindowStore {
    /// Creates a store with a shared connection and key prefix.
    #[must_use]
    pub fn new(connection: ConnectionManager, key_prefix: impl Into<String>) -> Self {
        Self {
            connection,
            key_prefix: key_prefix.into(),
            script: Script::new(TRY_ADMIT_SCRIPT),
        }
    }

    fn key_for(&self, key: &str) -> String {
        format!("{}:ratelimit:{key}", self.key_prefix)
    }
}

#[async_trait]
impl SlidingWindowStore for RedisSlidingWindowStore {
    async fn try_admit(
        &self,
        key: &str,
        permits: u32,
        policy: RateLimitPolicy,
        now_ms: i64,
    ) -> AppResult<bool> {
        let mut connection = self.connection.clone();
        let admitted: i32 = self
            .script
            .key(self.key_for(key))
            .arg(now_ms)
            .arg(expiry_millis(policy.window()))
            .arg(policy.limit())
            .arg(permits)
            .arg(expiry_millis(policy.store_expiry()))
            .arg(uuid::Uuid::new_v4().to_string())
            .invoke_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::StoreUnavailable(format!("failed to evaluate sliding window: {error}"))
            })?;

        Ok(admitted == 1)
    }
}
