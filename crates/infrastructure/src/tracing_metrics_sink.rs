use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tradeguard_application::ResilienceMetrics;

/// Metrics sink that emits structured tracing events and keeps rejection
/// counts per limit type and dimension.
#[derive(Debug, Default)]
pub struct TracingMetricsSink {
    rejections: Mutex<HashMap<(String, String), u64>>,
}

impl TracingMetricsSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns rejections counted so far, sorted by limit type then dimension.
    #[must_use]
    pub fn rejection_counts(&self) -> Vec<(String, String, u64)> {
        let mut counts: Vec<(String, String, u64)> = self
            .rejections
            .lock()
            .iter()
            .map(|((limit_type, dimension), count)| {
                (limit_type.clone(), dimension.clone(), *count)
            })
            .collect();
        counts.sort();
        counts
    }
}

impl ResilienceMetrics for TracingMetricsSink {
    fn record_rejection(&self, limit_type: &str, dimension: &str) {
        let total = {
            let mut rejections = self.rejections.lock();
            let count = rejections
                .entry((limit_type.to_owned(), dimension.to_owned()))
                .or_default();
            *count += 1;
            *count
        };

        tracing::info!(
            limit_type = %limit_type,
            dimension = %dimension,
            total,
            "request rejected"
        );
    }

    fn record_latency(&self, operation: &str, elapsed: Duration) {
        tracing::debug!(
            operation = %operation,
            elapsed_ms = elapsed.as_secs_f64() * 1_000.0,
            "store operation finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tradeguard_application::ResilienceMetrics;

    use super::TracingMetricsSink;

    #[test]
    fn rejections_are_counted_per_type_and_dimension() {
        let sink = TracingMetricsSink::new();
        sink.record_rejection("sliding_window", "user");
        sink.record_rejection("sliding_window", "user");
        sink.record_rejection("circuit_breaker", "quote-feed");
        sink.record_latency("cache.get", Duration::from_millis(3));

        assert_eq!(
            sink.rejection_counts(),
            vec![
                ("circuit_breaker".to_owned(), "quote-feed".to_owned(), 1),
                ("sliding_window".to_owned(), "user".to_owned(), 2),
            ]
        );
    }
}
