//! Health check endpoints
//!
//! Provides endpoints for monitoring and container orchestration:
//! - `/health` - Full health check with per-tier circuit status
//! - `/health/ready` - Readiness probe
//! - `/health/live` - Liveness probe

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::tiers::{CircuitState, TierHealth};
use crate::AppState;

/// Health status enum
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Overall status from tier circuits: all closed is healthy, none usable is unhealthy
    pub fn from_tiers(tiers: &BTreeMap<String, TierHealth>) -> Self {
        if tiers.is_empty() || tiers.values().all(|t| t.state == CircuitState::Open) {
            HealthStatus::Unhealthy
        } else if tiers.values().all(|t| t.state == CircuitState::Closed) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        }
    }
}

/// Application statistics
#[derive(Debug, Serialize)]
pub struct HealthStats {
    pub uptime_seconds: u64,
    pub tiers_total: usize,
    pub tiers_open: usize,
}

/// Full health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub timestamp: String,
    pub tiers: BTreeMap<String, TierHealth>,
    pub stats: HealthStats,
}

/// Simple health response for liveness/readiness
#[derive(Debug, Serialize)]
pub struct SimpleHealthResponse {
    pub status: HealthStatus,
}

/// Full health check endpoint
///
/// Returns comprehensive health information including:
/// - Overall status
/// - Version info
/// - Uptime
/// - Circuit state, success rate and latency for every tier
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<HealthResponse>) {
    let tiers = state.router.get_health_snapshot();
    let overall_status = HealthStatus::from_tiers(&tiers);
    let uptime = state.start_time.elapsed().as_secs();

    let stats = HealthStats {
        uptime_seconds: uptime,
        tiers_total: tiers.len(),
        tiers_open: tiers
            .values()
            .filter(|t| t.state == CircuitState::Open)
            .count(),
    };

    let status_code = match overall_status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    let response = HealthResponse {
        status: overall_status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
        timestamp: chrono::Utc::now().to_rfc3339(),
        tiers,
        stats,
    };

    (status_code, Json(response))
}

/// Readiness probe endpoint
///
/// Returns 200 OK while at least one tier circuit is not open.
/// Used by Kubernetes readiness probes.
pub async fn readiness_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<SimpleHealthResponse>) {
    if !state.registry.any_available() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(SimpleHealthResponse {
                status: HealthStatus::Unhealthy,
            }),
        );
    }

    (
        StatusCode::OK,
        Json(SimpleHealthResponse {
            status: HealthStatus::Healthy,
        }),
    )
}

/// Liveness probe endpoint
///
/// Returns 200 OK if the application is alive.
/// Used by Kubernetes liveness probes.
pub async fn liveness_check() -> (StatusCode, Json<SimpleHealthResponse>) {
    (
        StatusCode::OK,
        Json(SimpleHealthResponse {
            status: HealthStatus::Healthy,
        }),
    )
}
