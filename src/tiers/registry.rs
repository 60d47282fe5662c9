//! Circuit breaker registry
//!
//! Owns every configured tier together with its breaker and metrics window.
//! Constructed once at startup and shared by `Arc` between the router and the
//! health monitor; nothing here is process-global.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use super::client::TierClient;
use super::config::{TierConfig, TierProfile};
use super::error::RegistryError;
use super::metrics::{TierMetrics, DEFAULT_WINDOW};

/// A configured tier with its runtime health state
pub struct Tier {
    config: TierConfig,
    client: Arc<dyn TierClient>,
    breaker: CircuitBreaker,
    metrics: TierMetrics,
}

impl Tier {
    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &TierConfig {
        &self.config
    }

    pub fn client(&self) -> &dyn TierClient {
        self.client.as_ref()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn metrics(&self) -> &TierMetrics {
        &self.metrics
    }
}

impl std::fmt::Debug for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tier")
            .field("config", &self.config)
            .field("breaker", &self.breaker)
            .finish()
    }
}

/// A tier selected for a request
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub tier: &'a Tier,
    /// Selected only because every breaker rejected; the call bypasses the breaker
    pub desperation: bool,
}

/// Health report for one tier
#[derive(Debug, Clone, Serialize)]
pub struct TierHealth {
    pub state: CircuitState,
    pub success_rate: f64,
    pub p95_latency_ms: Option<u64>,
    pub p50_latency_ms: Option<u64>,
    pub p99_latency_ms: Option<u64>,
    pub samples: usize,
    pub failure_count: u32,
    pub times_opened: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure_at: Option<DateTime<Utc>>,
    pub priority: u32,
    pub profile: TierProfile,
}

/// Registry of tiers, keyed by name and kept in priority order
pub struct CircuitBreakerRegistry {
    tiers: Vec<Tier>,
    index: HashMap<String, usize>,
    breaker_config: CircuitBreakerConfig,
    metrics_window: usize,
}

impl CircuitBreakerRegistry {
    pub fn new(breaker_config: CircuitBreakerConfig, metrics_window: usize) -> Self {
        Self {
            tiers: Vec::new(),
            index: HashMap::new(),
            breaker_config,
            metrics_window,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(CircuitBreakerConfig::default(), DEFAULT_WINDOW)
    }

    /// Add a tier; tiers are kept sorted by priority, ties in registration order
    pub fn register(
        &mut self,
        config: TierConfig,
        client: Arc<dyn TierClient>,
    ) -> Result<(), RegistryError> {
        if self.index.contains_key(&config.name) {
            return Err(RegistryError::DuplicateTier(config.name));
        }

        info!(
            tier = %config.name,
            priority = config.priority,
            profile = %config.profile,
            timeout_ms = config.timeout.as_millis() as u64,
            max_attempts = config.retry.max_attempts,
            "Registering tier"
        );

        let tier = Tier {
            breaker: CircuitBreaker::new(config.name.clone(), self.breaker_config.clone()),
            metrics: TierMetrics::new(self.metrics_window),
            config,
            client,
        };
        let position = self
            .tiers
            .iter()
            .position(|t| t.config.priority > tier.config.priority)
            .unwrap_or(self.tiers.len());
        self.tiers.insert(position, tier);
        self.reindex();
        Ok(())
    }

    fn reindex(&mut self) {
        self.index = self
            .tiers
            .iter()
            .enumerate()
            .map(|(i, t)| (t.config.name.clone(), i))
            .collect();
    }

    /// All tiers in priority order
    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    pub fn tier(&self, name: &str) -> Option<&Tier> {
        self.index.get(name).map(|&i| &self.tiers[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    /// Filter candidates down to tiers whose breaker admits calls
    ///
    /// Input order is preserved and unknown names are dropped. When nothing is
    /// admitted, the open tier that has been open the longest is returned
    /// alone as a desperation candidate.
    pub fn eligible_tiers<'a, S: AsRef<str>>(&'a self, ordered: &[S]) -> Vec<Candidate<'a>> {
        let known: Vec<&Tier> = ordered
            .iter()
            .filter_map(|name| self.tier(name.as_ref()))
            .collect();

        let eligible: Vec<Candidate<'a>> = known
            .iter()
            .filter(|tier| tier.breaker.is_call_permitted())
            .map(|&tier| Candidate {
                tier,
                desperation: false,
            })
            .collect();

        if !eligible.is_empty() || known.is_empty() {
            return eligible;
        }

        let fallback = known
            .iter()
            .filter(|tier| tier.breaker.current_state() == CircuitState::Open)
            .min_by_key(|tier| tier.breaker.last_transition());

        match fallback {
            Some(&tier) => {
                warn!(
                    tier = %tier.name(),
                    "All tier circuits rejecting, selecting desperation candidate"
                );
                vec![Candidate {
                    tier,
                    desperation: true,
                }]
            }
            None => Vec::new(),
        }
    }

    /// Per-tier state, success rate and latency
    pub fn health_snapshot(&self) -> BTreeMap<String, TierHealth> {
        self.tiers
            .iter()
            .map(|tier| {
                let breaker = tier.breaker.snapshot();
                let summary = tier.metrics.summary();
                (
                    tier.config.name.clone(),
                    TierHealth {
                        state: breaker.state,
                        success_rate: summary.success_rate,
                        p95_latency_ms: summary.p95_latency_ms,
                        p50_latency_ms: summary.p50_latency_ms,
                        p99_latency_ms: summary.p99_latency_ms,
                        samples: summary.samples,
                        failure_count: breaker.failure_count,
                        times_opened: breaker.times_opened,
                        last_failure_at: summary.last_failure_at,
                        priority: tier.config.priority,
                        profile: tier.config.profile,
                    },
                )
            })
            .collect()
    }

    /// True when at least one tier is not open
    pub fn any_available(&self) -> bool {
        self.tiers
            .iter()
            .any(|tier| tier.breaker.current_state() != CircuitState::Open)
    }

    pub fn force_reset(&self, name: &str) -> Result<(), RegistryError> {
        let tier = self
            .tier(name)
            .ok_or_else(|| RegistryError::UnknownTier(name.to_string()))?;
        tier.breaker.force_reset();
        Ok(())
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
