//! Fallback router
//!
//! Executes one logical operation against the best available tier:
//! 1. Order tiers from the routing context (explicit, realtime, bulk, primary)
//! 2. Drop tiers whose circuit breaker rejects calls
//! 3. Walk the remaining tiers, retrying transient failures within a tier
//! 4. Return the first success, or a failure report covering every tier

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::breaker::{Admission, CircuitBreaker};
use super::client::{dispatch, Operation, OperationOutput};
use super::config::{RoutingRules, TierProfile};
use super::error::{RegistryError, RouterError, TierError};
use super::registry::{CircuitBreakerRegistry, Tier, TierHealth};
use super::trace::{AttemptRecord, FailureReport, Routed, TierOutcome, TierTrace};

/// Result of a routed operation
pub type RouterResult = Result<Routed, RouterError>;

/// Per-request routing hints supplied by the caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingContext {
    pub is_agent_context: bool,
    pub requires_realtime: bool,
    pub record_count: usize,
    /// Pin the request to one tier, with no fallback
    pub explicit_tier: Option<String>,
}

impl RoutingContext {
    pub fn agent() -> Self {
        Self {
            is_agent_context: true,
            ..Self::default()
        }
    }

    pub fn bulk(record_count: usize) -> Self {
        Self {
            record_count,
            ..Self::default()
        }
    }

    pub fn explicit(tier: impl Into<String>) -> Self {
        Self {
            explicit_tier: Some(tier.into()),
            ..Self::default()
        }
    }
}

/// Breaker admission held for the duration of one tier trial
///
/// Dropping the trial without an outcome (cancelled request, deadline) hands
/// any half-open probe slot back to the breaker.
struct Trial<'a> {
    breaker: &'a CircuitBreaker,
    admission: Option<Admission>,
}

impl<'a> Trial<'a> {
    fn new(breaker: &'a CircuitBreaker, admission: Admission) -> Self {
        Self {
            breaker,
            admission: Some(admission),
        }
    }

    fn finish(mut self, success: bool) {
        if let Some(admission) = self.admission.take() {
            self.breaker.record_outcome(admission, success);
        }
    }
}

impl Drop for Trial<'_> {
    fn drop(&mut self) {
        if let Some(admission) = self.admission.take() {
            self.breaker.release(admission);
        }
    }
}

/// Outcome of running the retry loop against one tier
struct TierRun {
    trace: TierTrace,
    output: Option<OperationOutput>,
    /// The tier itself failed (as opposed to the caller running out of time)
    counts_as_failure: bool,
}

/// Tier-cascading router
pub struct FallbackRouter {
    registry: Arc<CircuitBreakerRegistry>,
    rules: RoutingRules,
}

impl FallbackRouter {
    pub fn new(registry: Arc<CircuitBreakerRegistry>, rules: RoutingRules) -> Self {
        Self { registry, rules }
    }

    pub fn registry(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.registry
    }

    pub fn rules(&self) -> &RoutingRules {
        &self.rules
    }

    /// Compute the tier order for a request, before health filtering
    pub fn tier_order(&self, context: &RoutingContext) -> Result<Vec<String>, RouterError> {
        if let Some(explicit) = &context.explicit_tier {
            if !self.registry.contains(explicit) {
                return Err(RouterError::UnknownTier(explicit.clone()));
            }
            return Ok(vec![explicit.clone()]);
        }

        let first_tier = if context.is_agent_context || context.requires_realtime {
            self.realtime_tier()
        } else if context.record_count > self.rules.bulk_threshold {
            self.bulk_tier().or_else(|| self.primary_tier())
        } else {
            self.primary_tier()
        };
        let first = first_tier.map(|tier| tier.name());

        let order = first
            .into_iter()
            .chain(
                self.registry
                    .tiers()
                    .iter()
                    .map(|t| t.name())
                    .filter(|name| Some(*name) != first),
            )
            .map(str::to_string)
            .collect();
        Ok(order)
    }

    /// Tier with the lowest latency profile
    fn realtime_tier(&self) -> Option<&Tier> {
        let tiers = self.registry.tiers();
        tiers
            .iter()
            .find(|t| t.config().profile == TierProfile::Realtime)
            .or_else(|| tiers.iter().min_by_key(|t| t.config().timeout))
    }

    fn bulk_tier(&self) -> Option<&Tier> {
        self.registry
            .tiers()
            .iter()
            .find(|t| t.config().profile == TierProfile::Bulk)
    }

    fn primary_tier(&self) -> Option<&Tier> {
        self.rules
            .primary_tier
            .as_deref()
            .and_then(|name| self.registry.tier(name))
            .or_else(|| self.registry.tiers().first())
    }

    /// Execute an operation with retries and tier fallback
    ///
    /// Tier and attempt failures never escape individually; the caller gets
    /// either the first success or a report covering every tier.
    #[instrument(
        skip_all,
        fields(request_id = %Uuid::new_v4(), operation = operation.kind())
    )]
    pub async fn execute(
        &self,
        operation: &Operation,
        context: &RoutingContext,
        deadline: Option<Duration>,
    ) -> RouterResult {
        let started = Instant::now();
        let deadline_at = deadline.map(|d| started + d);

        let order = self.tier_order(context)?;
        let candidates = self.registry.eligible_tiers(&order);
        debug!(
            order = ?order,
            eligible = candidates.len(),
            "Routing operation"
        );

        let mut trace: Vec<TierTrace> = Vec::with_capacity(order.len());
        let mut total_attempts = 0;
        let mut deadline_exceeded = false;

        for name in &order {
            let Some(candidate) = candidates.iter().find(|c| c.tier.name() == name) else {
                trace.push(TierTrace::skipped(name));
                continue;
            };
            let tier = candidate.tier;

            if deadline_at.is_some_and(|d| Instant::now() >= d) {
                warn!(tier = %name, "Deadline reached, abandoning remaining tiers");
                deadline_exceeded = true;
                break;
            }

            let admission = if candidate.desperation {
                Admission::unguarded()
            } else {
                match tier.breaker().try_acquire() {
                    Some(admission) => admission,
                    None => {
                        debug!(tier = %name, "Circuit rejected call at dispatch, skipping tier");
                        trace.push(TierTrace::skipped(name));
                        continue;
                    }
                }
            };
            let trial = Trial::new(tier.breaker(), admission);

            let run = self.run_tier(tier, operation, deadline_at).await;
            total_attempts += run.trace.attempts;
            let mut tier_trace = run.trace;
            tier_trace.desperation = candidate.desperation;

            if let Some(output) = run.output {
                trial.finish(true);
                trace.push(tier_trace);
                info!(
                    tier = %name,
                    total_attempts,
                    desperation = candidate.desperation,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Operation served"
                );
                metrics::counter!("tiergate_router_requests_total", "outcome" => "success")
                    .increment(1);
                return Ok(Routed {
                    output,
                    tier: name.clone(),
                    total_attempts,
                    desperation: candidate.desperation,
                    trace,
                });
            }

            if run.counts_as_failure {
                trial.finish(false);
            } else {
                drop(trial);
            }

            if tier_trace.outcome.is_deadline() {
                deadline_exceeded = true;
                trace.push(tier_trace);
                break;
            }
            warn!(tier = %name, outcome = ?tier_trace.outcome, "Tier failed, falling back");
            trace.push(tier_trace);
        }

        let report = FailureReport::new(trace, deadline_exceeded);
        warn!(
            tiers = report.tiers.len(),
            total_attempts = report.total_attempts,
            deadline_exceeded,
            "All tiers failed"
        );
        let outcome = if deadline_exceeded { "deadline" } else { "failure" };
        metrics::counter!("tiergate_router_requests_total", "outcome" => outcome).increment(1);
        Err(RouterError::AllTiersFailed(report))
    }

    /// Retry loop against a single tier
    async fn run_tier(
        &self,
        tier: &Tier,
        operation: &Operation,
        deadline: Option<Instant>,
    ) -> TierRun {
        let config = tier.config();
        let policy = &config.retry;
        let tier_started = Instant::now();
        let mut attempt_log = Vec::new();
        let mut attempt: u32 = 0;
        let mut last_error: Option<TierError> = None;

        let (outcome, output, counts_as_failure) = loop {
            attempt += 1;

            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            if remaining == Some(Duration::ZERO) {
                attempt -= 1;
                break (TierOutcome::deadline(last_error.as_ref()), None, false);
            }
            let call_timeout = remaining.map_or(config.timeout, |r| r.min(config.timeout));
            let truncated = call_timeout < config.timeout;

            let call_started = Instant::now();
            let result = match tokio::time::timeout(
                call_timeout,
                dispatch(tier.client(), operation),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(TierError::Timeout(call_timeout)),
            };
            let latency = call_started.elapsed();
            record_attempt_metric(tier.name(), latency, result.as_ref().err());

            let error = match result {
                Ok(output) => {
                    tier.metrics().record_success(latency);
                    attempt_log.push(AttemptRecord::succeeded(
                        tier.name(),
                        attempt,
                        latency.as_millis() as u64,
                    ));
                    break (TierOutcome::Succeeded, Some(output), false);
                }
                Err(error) => error,
            };

            let category = error.category();
            tier.metrics().record_failure(latency, category);
            attempt_log.push(AttemptRecord::failed(
                tier.name(),
                attempt,
                latency.as_millis() as u64,
                &error,
            ));

            if truncated && matches!(error, TierError::Timeout(_)) {
                debug!(tier = %tier.name(), attempt, "Call cut short by caller deadline");
                break (TierOutcome::deadline(Some(&error)), None, false);
            }

            if !policy.should_retry(attempt, category) {
                debug!(
                    tier = %tier.name(),
                    attempt,
                    category = %category,
                    error = %error,
                    "Tier trial failed, no more retries"
                );
                break (TierOutcome::from_error(&error), None, true);
            }

            let delay = policy.delay_with_hint(attempt - 1, error.retry_after());
            if deadline.is_some_and(|d| Instant::now() + delay >= d) {
                debug!(tier = %tier.name(), attempt, "Backoff would pass caller deadline");
                break (TierOutcome::deadline(Some(&error)), None, true);
            }

            warn!(
                tier = %tier.name(),
                attempt,
                max_attempts = policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Tier call failed, retrying"
            );
            last_error = Some(error);
            tokio::time::sleep(delay).await;
        };

        TierRun {
            trace: TierTrace {
                tier: tier.name().to_string(),
                attempts: attempt,
                latency_ms: tier_started.elapsed().as_millis() as u64,
                outcome,
                desperation: false,
                attempt_log,
            },
            output,
            counts_as_failure,
        }
    }

    /// Per-tier state, success rate and p95 latency
    pub fn get_health_snapshot(&self) -> BTreeMap<String, TierHealth> {
        self.registry.health_snapshot()
    }

    /// Administrative escape hatch: close a tier's circuit
    pub fn force_reset_tier(&self, name: &str) -> Result<(), RegistryError> {
        self.registry.force_reset(name)
    }
}

fn record_attempt_metric(tier: &str, latency: Duration, error: Option<&TierError>) {
    let outcome = match error {
        None => "success",
        Some(e) => e.code(),
    };
    metrics::counter!(
        "tiergate_tier_attempts_total",
        "tier" => tier.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    metrics::histogram!("tiergate_tier_attempt_duration_seconds", "tier" => tier.to_string())
        .record(latency.as_secs_f64());
}
