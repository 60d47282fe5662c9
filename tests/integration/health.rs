//! Health endpoint integration tests
//!
//! Tests for the health check endpoints:
//! - GET /health - Full health check with per-tier circuit status
//! - GET /health/ready - Readiness probe
//! - GET /health/live - Liveness probe
//! - GET /metrics - Prometheus exposition

use axum::http::StatusCode;
use serde_json::Value;

use crate::common::{get_request, TestApp};

#[tokio::test]
async fn test_health_endpoint_returns_proper_structure() {
    let app = TestApp::healthy();

    let response = app.server.get("/health").await;

    response.assert_status_ok();

    let json: Value = response.json();

    // Verify response structure
    assert!(json.get("status").is_some(), "Response should have 'status' field");
    assert!(json.get("version").is_some(), "Response should have 'version' field");
    assert!(json.get("uptime_seconds").is_some(), "Response should have 'uptime_seconds' field");
    assert!(json.get("timestamp").is_some(), "Response should have 'timestamp' field");
    assert!(json.get("tiers").is_some(), "Response should have 'tiers' field");
    assert!(json.get("stats").is_some(), "Response should have 'stats' field");

    assert_eq!(json["status"], "healthy");
    assert_eq!(json["stats"]["tiers_total"], 3);
    assert_eq!(json["stats"]["tiers_open"], 0);
}

#[tokio::test]
async fn test_health_degraded_when_tier_open() {
    let app = TestApp::healthy();
    app.open_circuit("bulk");

    let response = app.server.get("/health").await;

    response.assert_status_ok();
    let json: Value = response.json();
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["tiers"]["bulk"]["state"], "OPEN");
    assert_eq!(json["stats"]["tiers_open"], 1);
}

#[tokio::test]
async fn test_health_unhealthy_when_all_open() {
    let app = TestApp::healthy();
    for name in ["agent", "bulk", "rest"] {
        app.open_circuit(name);
    }

    let response = app.server.get("/health").await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.json::<Value>()["status"], "unhealthy");

    let ready = app.server.get("/health/ready").await;
    ready.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(ready.json::<Value>()["status"], "unhealthy");
}

#[tokio::test]
async fn test_health_ready_endpoint() {
    let app = TestApp::healthy();
    app.open_circuit("agent");
    app.open_circuit("bulk");

    let response = app.server.get("/health/ready").await;

    // One usable tier is enough
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "healthy");
}

#[tokio::test]
async fn test_health_live_endpoint() {
    let app = TestApp::healthy();
    for name in ["agent", "bulk", "rest"] {
        app.open_circuit(name);
    }

    let response = app.server.get("/health/live").await;

    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "healthy");
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_router_metrics() {
    tiergate::routes::metrics::init_metrics();
    let app = TestApp::healthy();
    app.server
        .post("/v1/operations")
        .json(&get_request("001"))
        .await
        .assert_status_ok();

    let response = app.server.get("/metrics").await;

    response.assert_status_ok();
    let text = response.text();
    assert!(text.contains("tiergate_router_requests_total"), "{text}");
    assert!(text.contains("tiergate_tier_attempts_total"), "{text}");
}

#[tokio::test]
async fn test_health_endpoints_reject_post() {
    let app = TestApp::healthy();

    app.server
        .post("/health")
        .await
        .assert_status(StatusCode::METHOD_NOT_ALLOWED);
    app.server
        .post("/health/ready")
        .await
        .assert_status(StatusCode::METHOD_NOT_ALLOWED);
    app.server
        .post("/health/live")
        .await
        .assert_status(StatusCode::METHOD_NOT_ALLOWED);
}
