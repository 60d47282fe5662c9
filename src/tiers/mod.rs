//! Multi-tier request routing
//!
//! Routes CRM data operations across several access tiers, with per-tier
//! retries, circuit breakers, sliding-window metrics and fallback.

pub mod breaker;
pub mod client;
pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod metrics;
pub mod registry;
pub mod retry;
pub mod router;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
pub mod trace;

pub use breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use client::{Operation, OperationOutput, Record, TierClient};
pub use config::{RoutingRules, TierConfig, TierProfile};
pub use error::{ErrorCategory, RegistryError, RouterError, TierError};
pub use health::{HealthMonitor, HealthMonitorConfig, HealthMonitorHandle};
pub use http::HttpTierClient;
pub use metrics::TierMetrics;
pub use registry::{CircuitBreakerRegistry, TierHealth};
pub use retry::RetryPolicy;
pub use router::{FallbackRouter, RoutingContext};
pub use trace::{FailureReport, Routed, TierOutcome, TierTrace};
