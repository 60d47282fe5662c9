//! Tiergate - Resilient multi-tier request router
//!
//! This library provides the core functionality for the Tiergate service.
//! It routes CRM data operations across several access tiers with per-tier
//! retries, circuit breakers, health metrics and automatic fallback.

pub mod config;
pub mod error;
pub mod routes;
pub mod tiers;

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;

pub use crate::config::Config;
pub use crate::tiers::{CircuitBreakerRegistry, FallbackRouter, HealthMonitor, HttpTierClient};

/// Application state shared across all request handlers
pub struct AppState {
    pub config: Config,
    pub start_time: Instant,
    /// Tiers with their breakers and metrics
    pub registry: Arc<CircuitBreakerRegistry>,
    pub router: Arc<FallbackRouter>,
}

impl AppState {
    /// Create a new application state with an HTTP client per configured tier
    pub fn new(config: Config) -> Result<Self> {
        // Shared HTTP client with connection pooling; per-call timeouts come from tier config
        let http_client = reqwest::Client::builder()
            .pool_max_idle_per_host(100)
            .build()?;

        let mut registry = CircuitBreakerRegistry::new(config.breaker.clone(), config.metrics_window);
        for endpoint in &config.tiers {
            let client = Arc::new(HttpTierClient::new(
                http_client.clone(),
                endpoint.url.clone(),
                endpoint.config.timeout,
            ));
            registry.register(endpoint.config.clone(), client)?;
        }

        Ok(Self::from_registry(config, registry))
    }

    /// Build state around an already populated registry
    pub fn from_registry(config: Config, registry: CircuitBreakerRegistry) -> Self {
        let registry = Arc::new(registry);
        let router = Arc::new(FallbackRouter::new(
            registry.clone(),
            config.routing.clone(),
        ));

        Self {
            config,
            start_time: Instant::now(),
            registry,
            router,
        }
    }

    /// Health monitor over this state's registry
    pub fn health_monitor(&self) -> HealthMonitor {
        HealthMonitor::new(self.registry.clone(), self.config.health.clone())
    }

    /// Create a new application state for testing with scripted tier clients
    ///
    /// Tiers are registered in order with priorities 1, 2, 3... and the
    /// realtime, bulk, standard profiles by position.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn new_for_testing(
        breaker: tiers::CircuitBreakerConfig,
        clients: Vec<Arc<tiers::testing::ScriptedTierClient>>,
        names: &[&str],
    ) -> Self {
        use crate::config::TierEndpoint;
        use crate::tiers::{RetryPolicy, TierConfig, TierProfile};
        use std::time::Duration;

        let tiers: Vec<TierEndpoint> = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let profile = match i {
                    0 => TierProfile::Realtime,
                    1 => TierProfile::Bulk,
                    _ => TierProfile::Standard,
                };
                TierEndpoint {
                    config: TierConfig::new(*name, i as u32 + 1, profile)
                        .with_timeout(Duration::from_millis(200))
                        .with_retry(
                            RetryPolicy::new()
                                .with_base_delay(Duration::from_millis(1))
                                .with_max_delay(Duration::from_millis(5))
                                .with_jitter(false),
                        ),
                    url: format!("scripted://{}", name),
                }
            })
            .collect();

        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 0,
            tiers: tiers.clone(),
            routing: tiers::RoutingRules::default(),
            breaker: breaker.clone(),
            metrics_window: 100,
            health: tiers::HealthMonitorConfig::default(),
            log_json: false,
        };

        let mut registry = CircuitBreakerRegistry::new(breaker, config.metrics_window);
        for (endpoint, client) in tiers.into_iter().zip(clients) {
            registry
                .register(endpoint.config, client)
                .expect("duplicate tier name in test setup");
        }

        Self::from_registry(config, registry)
    }
}
