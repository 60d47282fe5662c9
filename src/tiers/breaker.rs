//! Per-tier circuit breaker
//!
//! Tracks consecutive tier failures and fails fast once a tier is deemed
//! unhealthy:
//! - Closed: calls pass; `failure_threshold` failures trip the breaker
//! - Open: calls rejected until `recovery_timeout` has elapsed
//! - HalfOpen: a bounded number of probe calls decide between Closed and Open
//!
//! All state lives behind a single mutex so every transition happens exactly
//! once per threshold crossing, no matter how many callers race.

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }

    /// Numeric encoding for the state gauge
    fn gauge_value(&self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::HalfOpen => 1.0,
            CircuitState::Open => 2.0,
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static breaker thresholds
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Consecutive tier failures that trip the breaker
    pub failure_threshold: u32,
    /// Time spent open before probing is allowed
    pub recovery_timeout: Duration,
    /// Probe successes needed to close again
    pub half_open_success_threshold: u32,
    /// Probe calls allowed in flight at once while half-open
    pub half_open_max_concurrent_probes: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            half_open_success_threshold: 2,
            half_open_max_concurrent_probes: 1,
        }
    }
}

impl CircuitBreakerConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    #[must_use]
    pub fn with_recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_half_open_success_threshold(mut self, threshold: u32) -> Self {
        self.half_open_success_threshold = threshold.max(1);
        self
    }

    #[must_use]
    pub fn with_half_open_max_probes(mut self, probes: u32) -> Self {
        self.half_open_max_concurrent_probes = probes.max(1);
        self
    }
}

/// Permission to call a tier, handed out by [`CircuitBreaker::try_acquire`]
///
/// Carries the half-open generation when it holds a probe slot, so an outcome
/// arriving after the breaker has moved on cannot free a slot it never took,
/// nor count as a probe success for a window it was never admitted to.
#[derive(Debug)]
pub struct Admission {
    probe_generation: Option<u64>,
}

impl Admission {
    /// Admission for a desperation call that bypassed the breaker
    pub(crate) fn unguarded() -> Self {
        Self {
            probe_generation: None,
        }
    }
}

/// Which probe slot an outcome releases
enum Slot {
    /// Any in-flight probe of the current half-open window
    Any,
    /// Only a slot from this half-open generation
    Generation(u64),
    None,
}

/// Point-in-time view of a breaker
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub in_flight_probes: u32,
    pub times_opened: u64,
    pub since_transition_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_until_half_open_ms: Option<u64>,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    in_flight_probes: u32,
    last_transition: Instant,
    times_opened: u64,
    /// Bumped on every entry into HalfOpen
    generation: u64,
}

/// Circuit breaker guarding one tier
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        metrics::gauge!("tiergate_circuit_state", "tier" => name.clone())
            .set(CircuitState::Closed.gauge_value());
        Self {
            name,
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                in_flight_probes: 0,
                last_transition: Instant::now(),
                times_opened: 0,
                generation: 0,
            }),
        }
    }

    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, CircuitBreakerConfig::default())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        // State stays consistent even if a holder panicked: every mutation is
        // a handful of field writes with no early exit.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current state without triggering the lazy Open -> HalfOpen check
    pub fn current_state(&self) -> CircuitState {
        self.lock().state
    }

    /// When the breaker last changed state
    pub fn last_transition(&self) -> Instant {
        self.lock().last_transition
    }

    /// Check whether a call would be admitted, without reserving a probe slot
    ///
    /// Performs the lazy Open -> HalfOpen transition.
    pub fn is_call_permitted(&self) -> bool {
        let mut inner = self.lock();
        self.refresh(&mut inner);
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                inner.in_flight_probes < self.config.half_open_max_concurrent_probes
            }
        }
    }

    /// Admit a call, reserving a probe slot while half-open
    pub fn try_acquire(&self) -> Option<Admission> {
        let mut inner = self.lock();
        self.refresh(&mut inner);
        match inner.state {
            CircuitState::Closed => Some(Admission {
                probe_generation: None,
            }),
            CircuitState::Open => None,
            CircuitState::HalfOpen => {
                if inner.in_flight_probes >= self.config.half_open_max_concurrent_probes {
                    debug!(
                        tier = %self.name,
                        in_flight = inner.in_flight_probes,
                        "Half-open probe capacity reached, rejecting call"
                    );
                    return None;
                }
                inner.in_flight_probes += 1;
                Some(Admission {
                    probe_generation: Some(inner.generation),
                })
            }
        }
    }

    /// Admit a call; in half-open state this reserves one of the probe slots
    ///
    /// A `true` answer must be followed by `record_success`, `record_failure`
    /// or `release_probe`.
    pub fn allow_request(&self) -> bool {
        self.try_acquire().is_some()
    }

    pub fn record_success(&self) {
        self.complete(Slot::Any, true);
    }

    pub fn record_failure(&self) {
        self.complete(Slot::Any, false);
    }

    /// Record the outcome of a call admitted through [`try_acquire`](Self::try_acquire)
    pub fn record_outcome(&self, admission: Admission, success: bool) {
        let slot = match admission.probe_generation {
            Some(generation) => Slot::Generation(generation),
            None => Slot::None,
        };
        self.complete(slot, success);
    }

    /// Give back a probe slot taken by `allow_request` without an outcome
    pub fn release_probe(&self) {
        let mut inner = self.lock();
        self.release_slot(&mut inner, Slot::Any);
    }

    /// Give back an admission that never produced an outcome
    pub fn release(&self, admission: Admission) {
        if let Some(generation) = admission.probe_generation {
            let mut inner = self.lock();
            self.release_slot(&mut inner, Slot::Generation(generation));
        }
    }

    /// Administrative override: close the breaker and clear all counters
    pub fn force_reset(&self) {
        let mut inner = self.lock();
        info!(tier = %self.name, from = %inner.state, "Circuit breaker force reset");
        if inner.state == CircuitState::Closed {
            inner.failure_count = 0;
            inner.success_count = 0;
            inner.in_flight_probes = 0;
        } else {
            self.transition(&mut inner, CircuitState::Closed);
        }
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        let since = inner.last_transition.elapsed();
        let time_until_half_open = (inner.state == CircuitState::Open)
            .then(|| self.config.recovery_timeout.saturating_sub(since).as_millis() as u64);
        BreakerSnapshot {
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            in_flight_probes: inner.in_flight_probes,
            times_opened: inner.times_opened,
            since_transition_ms: since.as_millis() as u64,
            time_until_half_open_ms: time_until_half_open,
        }
    }

    fn complete(&self, slot: Slot, success: bool) {
        let mut inner = self.lock();
        let held_probe = self.release_slot(&mut inner, slot);

        match (inner.state, success) {
            (CircuitState::Closed, true) => {
                inner.failure_count = 0;
            }
            (CircuitState::Closed, false) => {
                inner.failure_count += 1;
                debug!(
                    tier = %self.name,
                    failures = inner.failure_count,
                    threshold = self.config.failure_threshold,
                    "Circuit breaker failure recorded"
                );
                if inner.failure_count >= self.config.failure_threshold {
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            (CircuitState::HalfOpen, true) if !held_probe => {
                // Admitted before this half-open window opened, or bypassed the breaker
                debug!(tier = %self.name, "Success without a probe slot ignored while half-open");
            }
            (CircuitState::HalfOpen, true) => {
                inner.success_count += 1;
                debug!(
                    tier = %self.name,
                    successes = inner.success_count,
                    threshold = self.config.half_open_success_threshold,
                    "Circuit breaker probe succeeded"
                );
                if inner.success_count >= self.config.half_open_success_threshold {
                    self.transition(&mut inner, CircuitState::Closed);
                }
            }
            (CircuitState::HalfOpen, false) => {
                warn!(tier = %self.name, "Probe failed in half-open state, reopening circuit");
                self.transition(&mut inner, CircuitState::Open);
                inner.failure_count = self.config.failure_threshold;
            }
            (CircuitState::Open, _) => {
                // Late or desperation outcome; recovery goes through HalfOpen
                debug!(tier = %self.name, success, "Outcome ignored while circuit open");
            }
        }
    }

    /// Returns whether the outcome belonged to a probe of the current window
    fn release_slot(&self, inner: &mut BreakerInner, slot: Slot) -> bool {
        if inner.state != CircuitState::HalfOpen {
            return false;
        }
        let matches = match slot {
            Slot::Any => true,
            Slot::Generation(generation) => generation == inner.generation,
            Slot::None => false,
        };
        if matches {
            inner.in_flight_probes = inner.in_flight_probes.saturating_sub(1);
        }
        matches
    }

    fn refresh(&self, inner: &mut BreakerInner) {
        if inner.state == CircuitState::Open
            && inner.last_transition.elapsed() >= self.config.recovery_timeout
        {
            self.transition(inner, CircuitState::HalfOpen);
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        inner.last_transition = Instant::now();
        inner.success_count = 0;
        inner.in_flight_probes = 0;

        match to {
            CircuitState::Closed => {
                inner.failure_count = 0;
                info!(tier = %self.name, from = %from, "Circuit breaker closed");
            }
            CircuitState::Open => {
                inner.times_opened += 1;
                warn!(
                    tier = %self.name,
                    from = %from,
                    failures = inner.failure_count,
                    recovery_secs = self.config.recovery_timeout.as_secs_f64(),
                    "Circuit breaker opened"
                );
            }
            CircuitState::HalfOpen => {
                inner.generation += 1;
                info!(tier = %self.name, "Circuit breaker entering half-open state");
            }
        }

        metrics::gauge!("tiergate_circuit_state", "tier" => self.name.clone())
            .set(to.gauge_value());
        metrics::counter!(
            "tiergate_circuit_transitions_total",
            "tier" => self.name.clone(),
            "to" => to.as_str()
        )
        .increment(1);
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.current_state())
            .finish()
    }
}
