//! Operations endpoint
//!
//! Routes a single CRM data operation through the tier cascade.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::{
    error::{AppError, AppResult},
    routes::metrics::record_operation,
    tiers::{Operation, Routed, RoutingContext},
    AppState,
};

/// Body of `POST /v1/operations`
#[derive(Debug, Clone, Deserialize)]
pub struct OperationRequest {
    pub operation: Operation,
    #[serde(default)]
    pub context: RoutingContext,
    /// Overall budget for the request across all tiers
    #[serde(default)]
    pub deadline_ms: Option<u64>,
}

/// Execute an operation with retries and tier fallback
///
/// When the caller does not state a record count, it is taken from the
/// operation itself so bulk operations reach the bulk tier.
#[instrument(skip_all, fields(operation = request.operation.kind()))]
pub async fn execute_operation(
    State(state): State<Arc<AppState>>,
    Json(request): Json<OperationRequest>,
) -> AppResult<(StatusCode, Json<Routed>)> {
    let OperationRequest {
        operation,
        mut context,
        deadline_ms,
    } = request;

    if context.record_count == 0 {
        context.record_count = operation.record_count();
    }
    if deadline_ms == Some(0) {
        return Err(AppError::BadRequest(
            "deadline_ms must be greater than zero".to_string(),
        ));
    }

    debug!(context = ?context, deadline_ms, "Routing operation request");

    let started = Instant::now();
    let result = state
        .router
        .execute(&operation, &context, deadline_ms.map(Duration::from_millis))
        .await;

    let status = if result.is_ok() { "success" } else { "failure" };
    record_operation(operation.kind(), status, started.elapsed().as_secs_f64());

    let routed = result?;
    Ok((StatusCode::OK, Json(routed)))
}
