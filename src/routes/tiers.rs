//! Tier administration endpoints
//!
//! Health snapshot and manual circuit reset for operators.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tracing::info;

use crate::{
    error::AppResult,
    tiers::{CircuitState, TierHealth},
    AppState,
};

/// Result of a manual circuit reset
#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub tier: String,
    pub state: CircuitState,
}

/// Per-tier circuit state, success rate and latency percentiles
pub async fn tier_health(
    State(state): State<Arc<AppState>>,
) -> Json<BTreeMap<String, TierHealth>> {
    Json(state.router.get_health_snapshot())
}

/// Force a tier's circuit closed
pub async fn reset_tier(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> AppResult<(StatusCode, Json<ResetResponse>)> {
    state.router.force_reset_tier(&name)?;
    info!(tier = %name, "Tier circuit reset by operator");

    Ok((
        StatusCode::OK,
        Json(ResetResponse {
            tier: name,
            state: CircuitState::Closed,
        }),
    ))
}
