use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tradeguard_core::{AppError, AppResult};
use tradeguard_domain::{
    Admission, CircuitBreakerConfig, CircuitBreakerEntry, CircuitBreakerSnapshot,
    CircuitTransition, RejectionReason,
};

use crate::resilience_ports::{Clock, ResilienceMetrics};

const CIRCUIT_BREAKER_LIMIT_TYPE: &str = "circuit_breaker";

/// Registry of named circuit breakers.
///
/// Breakers are created lazily with the default configuration on first use.
/// Each entry has its own lock, so breakers for different dependencies never
/// contend with each other.
#[derive(Clone)]
pub struct CircuitBreakerRegistry {
    entries: Arc<DashMap<String, Arc<Mutex<CircuitBreakerEntry>>>>,
    default_config: Arc<RwLock<CircuitBreakerConfig>>,
    metrics: Arc<dyn ResilienceMetrics>,
    clock: Arc<dyn Clock>,
}

impl CircuitBreakerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(
        default_config: CircuitBreakerConfig,
        metrics: Arc<dyn ResilienceMetrics>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            default_config: Arc::new(RwLock::new(default_config)),
            metrics,
            clock,
        }
    }

    /// Returns whether a call to `name` may proceed.
    pub fn allow_request(&self, name: &str) -> bool {
        let entry = self.entry(name);
        let mut entry = entry.lock();
        let before = entry.state();
        let allowed = entry.allow_request(self.clock.now());

        if entry.state() != before {
            log_transition(name, CircuitTransition::HalfOpened, &entry);
        }

        if !allowed {
            self.metrics
                .record_rejection(CIRCUIT_BREAKER_LIMIT_TYPE, name);
            tracing::debug!(breaker = name, "circuit open, call rejected");
        }

        allowed
    }

    /// Same as [`Self::allow_request`], expressed as an admission outcome.
    pub fn check(&self, name: &str) -> Admission {
        if self.allow_request(name) {
            Admission::Admitted
        } else {
            Admission::Rejected(RejectionReason::CircuitOpen {
                name: name.to_owned(),
            })
        }
    }

    /// Records a successful call to `name`.
    pub fn record_success(&self, name: &str) {
        let entry = self.entry(name);
        let mut entry = entry.lock();
        if let Some(transition) = entry.record_success(self.clock.now()) {
            log_transition(name, transition, &entry);
        }
    }

    /// Records a failed call to `name`.
    pub fn record_failure(&self, name: &str) {
        let entry = self.entry(name);
        let mut entry = entry.lock();
        if let Some(transition) = entry.record_failure(self.clock.now()) {
            log_transition(name, transition, &entry);
        }
    }

    /// Runs `operation` behind the breaker.
    ///
    /// Returns `CircuitOpen` without polling `operation` when the breaker
    /// rejects. Any error returned by `operation` counts as a failure, and so
    /// does dropping the call before it completes (a timed out or aborted
    /// caller).
    pub async fn call<T, F>(&self, name: &str, operation: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        if !self.allow_request(name) {
            return Err(AppError::CircuitOpen(name.to_owned()));
        }

        let mut pending = PendingCall {
            registry: self,
            name,
            settled: false,
        };
        let result = operation.await;
        pending.settled = true;

        match &result {
            Ok(_) => self.record_success(name),
            Err(_) => self.record_failure(name),
        }

        result
    }

    /// Returns a point-in-time view of one breaker.
    #[must_use]
    pub fn snapshot(&self, name: &str) -> CircuitBreakerSnapshot {
        self.entry(name).lock().snapshot(self.clock.now())
    }

    /// Returns views of every breaker created so far, sorted by name.
    #[must_use]
    pub fn snapshots(&self) -> Vec<CircuitBreakerSnapshot> {
        let now = self.clock.now();
        let mut snapshots: Vec<CircuitBreakerSnapshot> = self
            .entries
            .iter()
            .map(|entry| entry.value().lock().snapshot(now))
            .collect();
        snapshots.sort_by(|left, right| left.name.cmp(&right.name));
        snapshots
    }

    /// Overrides the configuration of one breaker, keeping its state.
    pub fn configure(&self, name: &str, config: CircuitBreakerConfig) {
        self.entry(name).lock().replace_config(config);
        tracing::info!(
            breaker = name,
            failure_threshold = config.failure_threshold(),
            open_ms = config.open_state_duration().as_millis() as u64,
            half_open_success_threshold = config.half_open_success_threshold(),
            "circuit breaker reconfigured"
        );
    }

    /// Changes the configuration used for breakers created from now on.
    pub fn set_default_config(&self, config: CircuitBreakerConfig) {
        *self.default_config.write() = config;
    }

    /// Returns the configuration used for new breakers.
    #[must_use]
    pub fn default_config(&self) -> CircuitBreakerConfig {
        *self.default_config.read()
    }

    /// Forces one breaker back to CLOSED.
    pub fn reset(&self, name: &str) {
        let entry = self.entry(name);
        let mut entry = entry.lock();
        if let Some(transition) = entry.reset(self.clock.now()) {
            log_transition(name, transition, &entry);
        }
    }

    fn entry(&self, name: &str) -> Arc<Mutex<CircuitBreakerEntry>> {
        if let Some(entry) = self.entries.get(name) {
            return Arc::clone(entry.value());
        }

        Arc::clone(
            self.entries
                .entry(name.to_owned())
                .or_insert_with(|| {
                    Arc::new(Mutex::new(CircuitBreakerEntry::new(
                        name,
                        self.default_config(),
                        self.clock.now(),
                    )))
                })
                .value(),
        )
    }
}

/// Records a failure for an admitted call that never reported an outcome.
struct PendingCall<'a> {
    registry: &'a CircuitBreakerRegistry,
    name: &'a str,
    settled: bool,
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::debug!(breaker = self.name, "guarded call cancelled before completing");
            self.registry.record_failure(self.name);
        }
    }
}

fn log_transition(name: &str, transition: CircuitTransition, entry: &CircuitBreakerEntry) {
    let config = entry.config();
    match transition {
        CircuitTransition::Opened => tracing::warn!(
            breaker = name,
            open_ms = config.open_state_duration().as_millis() as u64,
            "circuit breaker OPEN"
        ),
        CircuitTransition::HalfOpened => tracing::info!(
            breaker = name,
            probes = config.half_open_success_threshold(),
            "circuit breaker HALF_OPEN, probing"
        ),
        CircuitTransition::Closed => tracing::info!(breaker = name, "circuit breaker CLOSED"),
    }
}
