//! Shared Redis connection for every adapter.

use std::time::Duration;

use redis::aio::ConnectionManager;
use tradeguard_core::{AppError, AppResult};

/// Opens a reconnecting multiplexed connection to `redis_url`.
pub async fn connect_redis(redis_url: &str) -> AppResult<ConnectionManager> {
    let client = redis::Client::open(redis_url)
        .map_err(|error| AppError::ConfigInvalid(format!("invalid REDIS_URL: {error}")))?;

    client
        .get_connection_manager()
        .await
        .map_err(|error| AppError::StoreUnavailable(format!("failed to connect to redis: {error}")))
}

/// Converts a duration to whole milliseconds for `PX`/`PEXPIRE`, never zero.
pub(crate) fn expiry_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX).max(1)
}
