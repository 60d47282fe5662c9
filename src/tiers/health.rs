//! Background tier health monitor
//!
//! Periodically probes every tier so that open circuits can recover without
//! live traffic. Probes go through the breaker like any other call: a tier
//! whose circuit rejects is skipped, and a half-open tier is probed using one
//! of its probe slots.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::breaker::CircuitState;
use super::registry::{CircuitBreakerRegistry, Tier};

/// Configuration for the health monitor
#[derive(Debug, Clone, PartialEq)]
pub struct HealthMonitorConfig {
    /// Time between probe rounds (default: 30 seconds)
    pub interval: Duration,
    /// Timeout for a single probe (default: 1 second)
    pub probe_timeout: Duration,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(1),
        }
    }
}

/// Result of probing one tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    Healthy,
    Unhealthy,
    TimedOut,
    /// Breaker rejected the probe
    Skipped,
}

impl ProbeResult {
    fn as_str(&self) -> &'static str {
        match self {
            ProbeResult::Healthy => "healthy",
            ProbeResult::Unhealthy => "unhealthy",
            ProbeResult::TimedOut => "timeout",
            ProbeResult::Skipped => "skipped",
        }
    }
}

/// Periodic prober for all registered tiers
pub struct HealthMonitor {
    registry: Arc<CircuitBreakerRegistry>,
    config: HealthMonitorConfig,
}

/// Handle to a running monitor task
pub struct HealthMonitorHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl HealthMonitor {
    pub fn new(registry: Arc<CircuitBreakerRegistry>, config: HealthMonitorConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &HealthMonitorConfig {
        &self.config
    }

    /// Probe every tier concurrently, once
    ///
    /// Returns the per-tier results in priority order.
    pub async fn run_once(&self) -> Vec<(String, ProbeResult)> {
        let probes = self
            .registry
            .tiers()
            .iter()
            .map(|tier| self.probe(tier));
        join_all(probes).await
    }

    async fn probe(&self, tier: &Tier) -> (String, ProbeResult) {
        let name = tier.name().to_string();
        let breaker = tier.breaker();

        let Some(admission) = breaker.try_acquire() else {
            debug!(tier = %name, "Circuit open, skipping health probe");
            return (name, self.finish(tier, ProbeResult::Skipped));
        };

        let started = Instant::now();
        let result = match tokio::time::timeout(
            self.config.probe_timeout,
            tier.client().health_probe(),
        )
        .await
        {
            Ok(true) => ProbeResult::Healthy,
            Ok(false) => ProbeResult::Unhealthy,
            Err(_) => ProbeResult::TimedOut,
        };

        let was_half_open = breaker.current_state() == CircuitState::HalfOpen;
        breaker.record_outcome(admission, result == ProbeResult::Healthy);

        if result == ProbeResult::Healthy {
            debug!(
                tier = %name,
                latency_ms = started.elapsed().as_millis() as u64,
                half_open = was_half_open,
                "Health probe succeeded"
            );
        } else {
            warn!(
                tier = %name,
                result = result.as_str(),
                latency_ms = started.elapsed().as_millis() as u64,
                state = breaker.current_state().as_str(),
                "Health probe failed"
            );
        }

        (name, self.finish(tier, result))
    }

    fn finish(&self, tier: &Tier, result: ProbeResult) -> ProbeResult {
        metrics::counter!(
            "tiergate_health_probes_total",
            "tier" => tier.name().to_string(),
            "result" => result.as_str()
        )
        .increment(1);
        result
    }

    /// Run probe rounds on a background task until the handle is shut down
    pub fn spawn(self) -> HealthMonitorHandle {
        let (shutdown, receiver) = watch::channel(false);
        let task = tokio::spawn(self.run(receiver));
        HealthMonitorHandle { shutdown, task }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_s = self.config.interval.as_secs(),
            probe_timeout_ms = self.config.probe_timeout.as_millis() as u64,
            tiers = self.registry.len(),
            "Starting tier health monitor"
        );

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick completes immediately; probing starts one interval in
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let results = self.run_once().await;
                    let unhealthy = results
                        .iter()
                        .filter(|(_, r)| !matches!(r, ProbeResult::Healthy))
                        .count();
                    debug!(probed = results.len(), unhealthy, "Health probe round complete");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Tier health monitor shutting down");
                        break;
                    }
                }
            }
        }
    }
}

impl HealthMonitorHandle {
    /// Signal the monitor to stop and wait for the task to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Health monitor task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
