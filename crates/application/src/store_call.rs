use std::future::Future;
use std::time::{Duration, Instant};

use tradeguard_core::{AppError, AppResult};

use crate::resilience_ports::ResilienceMetrics;

/// Default deadline for one coordination store call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(150);

/// Runs one coordination store call under `timeout` and records its latency.
///
/// An elapsed deadline is reported as `StoreUnavailable`, the same as a
/// store error, so every caller has a single fallback path.
pub(crate) async fn bounded_store_call<T>(
    metrics: &dyn ResilienceMetrics,
    operation: &str,
    timeout: Duration,
    call: impl Future<Output = AppResult<T>>,
) -> AppResult<T> {
    let started_at = Instant::now();
    let result = match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(AppError::StoreUnavailable(format!(
            "{operation} timed out after {}ms",
            timeout.as_millis()
        ))),
    };
    metrics.record_latency(operation, started_at.elapsed());

    result
}
