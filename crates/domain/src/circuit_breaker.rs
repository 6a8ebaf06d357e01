//! Circuit breaker state machine.
//!
//! ```text
//!     CLOSED ──fail(N)──→ OPEN ──timeout──→ HALF_OPEN
//!        ▲                                      │
//!        │               success(M)             │
//!        └──────────────────────────────────────┘
//!                             │
//!                            fail
//!                             ▼
//!                           OPEN
//! ```
//!
//! The entry never reads the clock itself; callers pass `now` so every
//! transition is deterministic under test.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tradeguard_core::{AppError, AppResult};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls flow and consecutive failures are counted.
    Closed,
    /// Calls fail fast until the open duration elapses.
    Open,
    /// A bounded number of probe calls test recovery.
    HalfOpen,
}

impl CircuitState {
    /// Returns stable state value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Transition produced by recording an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitTransition {
    /// Entered OPEN.
    Opened,
    /// Entered HALF_OPEN.
    HalfOpened,
    /// Entered CLOSED.
    Closed,
}

/// Validated per-breaker thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    failure_threshold: u32,
    open_state_duration: Duration,
    half_open_success_threshold: u32,
}

impl CircuitBreakerConfig {
    /// Creates a breaker configuration.
    pub fn new(
        failure_threshold: u32,
        open_state_duration: Duration,
        half_open_success_threshold: u32,
    ) -> AppResult<Self> {
        if failure_threshold == 0 {
            return Err(AppError::ConfigInvalid(
                "circuit breaker failure_threshold must be greater than zero".to_owned(),
            ));
        }

        if open_state_duration.is_zero() {
            return Err(AppError::ConfigInvalid(
                "circuit breaker open_state_duration must be greater than zero".to_owned(),
            ));
        }

        if half_open_success_threshold == 0 {
            return Err(AppError::ConfigInvalid(
                "circuit breaker half_open_success_threshold must be greater than zero"
                    .to_owned(),
            ));
        }

        Ok(Self {
            failure_threshold,
            open_state_duration,
            half_open_success_threshold,
        })
    }

    /// Consecutive failures that open the circuit.
    #[must_use]
    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    /// Time spent OPEN before probing.
    #[must_use]
    pub fn open_state_duration(&self) -> Duration {
        self.open_state_duration
    }

    /// Successful probes that close the circuit.
    #[must_use]
    pub fn half_open_success_threshold(&self) -> u32 {
        self.half_open_success_threshold
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_state_duration: Duration::from_secs(30),
            half_open_success_threshold: 3,
        }
    }
}

/// Point-in-time view of one breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerSnapshot {
    /// Breaker name.
    pub name: String,
    /// Current state.
    pub state: CircuitState,
    /// Consecutive failures while CLOSED.
    pub consecutive_failures: u32,
    /// Successful probes since entering HALF_OPEN.
    pub half_open_successes: u32,
    /// Probes admitted and not yet recorded.
    pub half_open_in_flight: u32,
    /// Time since the current state was entered.
    pub state_age: Duration,
    /// Active configuration.
    pub config: CircuitBreakerConfig,
}

/// State of one named breaker.
#[derive(Debug, Clone)]
pub struct CircuitBreakerEntry {
    name: String,
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    half_open_in_flight: u32,
    state_entered_at: Instant,
    last_probe_at: Instant,
    config: CircuitBreakerConfig,
}

impl CircuitBreakerEntry {
    /// Creates a CLOSED entry.
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig, now: Instant) -> Self {
        Self {
            name: name.into(),
            state: CircuitState::Closed,
            consecutive_failures: 0,
            half_open_successes: 0,
            half_open_in_flight: 0,
            state_entered_at: now,
            last_probe_at: now,
            config,
        }
    }

    /// Returns the breaker name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the current state without applying the lazy OPEN timeout.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Returns the active configuration.
    #[must_use]
    pub fn config(&self) -> CircuitBreakerConfig {
        self.config
    }

    /// Decides whether one guarded call may run.
    ///
    /// An OPEN breaker whose duration has elapsed moves to HALF_OPEN here and
    /// the caller becomes the first probe. In HALF_OPEN at most
    /// `half_open_success_threshold` probes are in flight; probes that never
    /// report back are reclaimed after another open duration.
    pub fn allow_request(&mut self, now: Instant) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                if now.saturating_duration_since(self.state_entered_at)
                    < self.config.open_state_duration
                {
                    return false;
                }

                self.enter(CircuitState::HalfOpen, now);
                self.admit_probe(now);
                true
            }
            CircuitState::HalfOpen => {
                if self.half_open_in_flight >= self.config.half_open_success_threshold
                    && now.saturating_duration_since(self.last_probe_at)
                        >= self.config.open_state_duration
                {
                    self.half_open_in_flight = 0;
                }

                if self.half_open_in_flight < self.config.half_open_success_threshold {
                    self.admit_probe(now);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Records one successful guarded call.
    pub fn record_success(&mut self, now: Instant) -> Option<CircuitTransition> {
        match self.state {
            CircuitState::Closed => {
                self.consecutive_failures = 0;
                None
            }
            CircuitState::HalfOpen => {
                self.half_open_in_flight = self.half_open_in_flight.saturating_sub(1);
                self.half_open_successes = self.half_open_successes.saturating_add(1);
                if self.half_open_successes >= self.config.half_open_success_threshold {
                    self.enter(CircuitState::Closed, now);
                    Some(CircuitTransition::Closed)
                } else {
                    None
                }
            }
            // Late results from calls admitted before the circuit opened.
            CircuitState::Open => None,
        }
    }

    /// Records one failed guarded call.
    pub fn record_failure(&mut self, now: Instant) -> Option<CircuitTransition> {
        match self.state {
            CircuitState::Closed => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                if self.consecutive_failures >= self.config.failure_threshold {
                    self.enter(CircuitState::Open, now);
                    Some(CircuitTransition::Opened)
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => {
                self.enter(CircuitState::Open, now);
                Some(CircuitTransition::Opened)
            }
            CircuitState::Open => None,
        }
    }

    /// Replaces the configuration, keeping state and counters.
    pub fn replace_config(&mut self, config: CircuitBreakerConfig) {
        self.config = config;
    }

    /// Forces the breaker back to CLOSED.
    pub fn reset(&mut self, now: Instant) -> Option<CircuitTransition> {
        let was_closed = self.state == CircuitState::Closed;
        self.enter(CircuitState::Closed, now);
        (!was_closed).then_some(CircuitTransition::Closed)
    }

    /// Returns a point-in-time view.
    #[must_use]
    pub fn snapshot(&self, now: Instant) -> CircuitBreakerSnapshot {
        CircuitBreakerSnapshot {
            name: self.name.clone(),
            state: self.state,
            consecutive_failures: self.consecutive_failures,
            half_open_successes: self.half_open_successes,
            half_open_in_flight: self.half_open_in_flight,
            state_age: now.saturating_duration_since(self.state_entered_at),
            config: self.config,
        }
    }

    fn admit_probe(&mut self, now: Instant) {
        self.half_open_in_flight = self.half_open_in_flight.saturating_add(1);
        self.last_probe_at = now;
    }

    fn enter(&mut self, state: CircuitState, now: Instant) {
        self.state = state;
        self.state_entered_at = now;
        self.consecutive_failures = 0;
        self.half_open_successes = 0;
        self.half_open_in_flight = 0;
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::{CircuitBreakerConfig, CircuitBreakerEntry, CircuitState, CircuitTransition};

    fn config(failures: u32, open_seconds: u64, successes: u32) -> CircuitBreakerConfig {
        let config = CircuitBreakerConfig::new(failures, Duration::from_secs(open_seconds), successes);
        assert!(config.is_ok());
        config.unwrap_or_else(|_| unreachable!())
    }

    #[test]
    fn zero_thresholds_are_rejected() {
        assert!(CircuitBreakerConfig::new(0, Duration::from_secs(1), 1).is_err());
        assert!(CircuitBreakerConfig::new(1, Duration::ZERO, 1).is_err());
        assert!(CircuitBreakerConfig::new(1, Duration::from_secs(1), 0).is_err());
    }

    #[test]
    fn five_failures_open_and_thirty_seconds_half_open() {
        let start = Instant::now();
        let mut entry = CircuitBreakerEntry::new("quotes", config(5, 30, 3), start);

        for attempt in 1..=5 {
            assert!(entry.allow_request(start));
            let transition = entry.record_failure(start);
            if attempt < 5 {
                assert_eq!(transition, None);
            } else {
                assert_eq!(transition, Some(CircuitTransition::Opened));
            }
        }

        assert_eq!(entry.state(), CircuitState::Open);
        assert!(!entry.allow_request(start + Duration::from_secs(29)));
        assert!(entry.allow_request(start + Duration::from_secs(30)));
        assert_eq!(entry.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn success_in_closed_resets_consecutive_failures() {
        let start = Instant::now();
        let mut entry = CircuitBreakerEntry::new("news", config(3, 10, 1), start);

        entry.record_failure(start);
        entry.record_failure(start);
        entry.record_success(start);
        entry.record_failure(start);
        entry.record_failure(start);

        assert_eq!(entry.state(), CircuitState::Closed);
        assert_eq!(entry.snapshot(start).consecutive_failures, 2);
    }

    #[test]
    fn exactly_threshold_successes_close_half_open() {
        let start = Instant::now();
        let mut entry = CircuitBreakerEntry::new("f9", config(1, 10, 2), start);
        entry.record_failure(start);

        let later = start + Duration::from_secs(10);
        assert!(entry.allow_request(later));
        assert!(entry.allow_request(later));
        assert_eq!(entry.record_success(later), None);
        assert_eq!(entry.state(), CircuitState::HalfOpen);
        assert_eq!(entry.record_success(later), Some(CircuitTransition::Closed));
        assert_eq!(entry.state(), CircuitState::Closed);
        assert_eq!(entry.snapshot(later).half_open_successes, 0);
    }

    #[test]
    fn failure_in_half_open_reopens_immediately() {
        let start = Instant::now();
        let mut entry = CircuitBreakerEntry::new("f9", config(1, 10, 3), start);
        entry.record_failure(start);

        let later = start + Duration::from_secs(10);
        assert!(entry.allow_request(later));
        entry.record_success(later);
        assert_eq!(entry.record_failure(later), Some(CircuitTransition::Opened));
        assert_eq!(entry.state(), CircuitState::Open);
        assert!(!entry.allow_request(later + Duration::from_secs(9)));
    }

    #[test]
    fn half_open_caps_concurrent_probes() {
        let start = Instant::now();
        let mut entry = CircuitBreakerEntry::new("quotes", config(1, 10, 2), start);
        entry.record_failure(start);

        let later = start + Duration::from_secs(10);
        assert!(entry.allow_request(later));
        assert!(entry.allow_request(later));
        assert!(!entry.allow_request(later));
        assert_eq!(entry.snapshot(later).half_open_in_flight, 2);
    }

    #[test]
    fn abandoned_probes_are_reclaimed_after_open_duration() {
        let start = Instant::now();
        let mut entry = CircuitBreakerEntry::new("quotes", config(1, 10, 1), start);
        entry.record_failure(start);

        let probe_time = start + Duration::from_secs(10);
        assert!(entry.allow_request(probe_time));
        assert!(!entry.allow_request(probe_time + Duration::from_secs(5)));
        assert!(entry.allow_request(probe_time + Duration::from_secs(10)));
    }

    #[test]
    fn replacing_config_keeps_counters() {
        let start = Instant::now();
        let mut entry = CircuitBreakerEntry::new("quotes", config(5, 30, 3), start);
        entry.record_failure(start);
        entry.record_failure(start);

        entry.replace_config(config(3, 30, 3));
        assert_eq!(entry.snapshot(start).consecutive_failures, 2);
        assert_eq!(entry.record_failure(start), Some(CircuitTransition::Opened));
    }

    #[test]
    fn reset_closes_open_breaker() {
        let start = Instant::now();
        let mut entry = CircuitBreakerEntry::new("quotes", config(1, 30, 1), start);
        entry.record_failure(start);

        assert_eq!(entry.reset(start), Some(CircuitTransition::Closed));
        assert_eq!(entry.reset(start), None);
        assert!(entry.allow_request(start));
    }
}
