//! Prometheus metrics endpoint
//!
//! Exposes application metrics in Prometheus format for monitoring.

use axum::response::IntoResponse;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;

/// Global Prometheus handle for metrics export
static PROMETHEUS_HANDLE: Lazy<PrometheusHandle> = Lazy::new(|| {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
});

/// Initialize metrics (call once at startup)
pub fn init_metrics() {
    // Force initialization of the lazy static
    let _ = &*PROMETHEUS_HANDLE;

    register_metrics();
}

/// Describe all custom metrics
fn register_metrics() {
    metrics::describe_counter!(
        "tiergate_tier_attempts_total",
        "Individual tier calls by outcome code"
    );
    metrics::describe_histogram!(
        "tiergate_tier_attempt_duration_seconds",
        "Latency of individual tier calls in seconds"
    );
    metrics::describe_gauge!(
        "tiergate_circuit_state",
        "Circuit state per tier (0 closed, 1 half-open, 2 open)"
    );
    metrics::describe_counter!(
        "tiergate_circuit_transitions_total",
        "Circuit state transitions by target state"
    );
    metrics::describe_counter!(
        "tiergate_router_requests_total",
        "Routed operations by final outcome"
    );
    metrics::describe_counter!(
        "tiergate_health_probes_total",
        "Background health probes by result"
    );
    metrics::describe_histogram!(
        "tiergate_operation_duration_seconds",
        "End-to-end duration of routed operations in seconds"
    );
}

/// Prometheus metrics endpoint handler
///
/// Returns metrics in Prometheus text format for scraping.
pub async fn prometheus_metrics() -> impl IntoResponse {
    PROMETHEUS_HANDLE.render()
}

/// Record an operation served (or failed) through the HTTP surface
pub fn record_operation(operation: &str, status: &str, duration_secs: f64) {
    metrics::histogram!(
        "tiergate_operation_duration_seconds",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .record(duration_secs);
}
