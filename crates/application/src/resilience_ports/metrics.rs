use std::time::Duration;

/// Observability sink for the resilience layer.
///
/// Calls are synchronous and must return quickly; they sit on the hot path
/// of every admission decision.
pub trait ResilienceMetrics: Send + Sync {
    /// Counts one denied admission.
    fn record_rejection(&self, limit_type: &str, dimension: &str);

    /// Records the duration of one store-backed operation.
    fn record_latency(&self, operation: &str, elapsed: Duration);
}

/// Metrics sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl ResilienceMetrics for NoopMetrics {
    fn record_rejection(&self, _limit_type: &str, _dimension: &str) {}

    fn record_latency(&self, _operation: &str, _elapsed: Duration) {}
}
