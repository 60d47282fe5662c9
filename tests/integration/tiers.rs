//! Tier administration integration tests
//!
//! Tests for:
//! - GET /v1/tiers/health - Per-tier health snapshot
//! - POST /v1/tiers/{name}/reset - Manual circuit reset

use axum::http::StatusCode;
use serde_json::Value;
use tiergate::tiers::CircuitState;

use crate::common::{get_request, TestApp};

#[tokio::test]
async fn test_health_snapshot_lists_all_tiers() {
    let app = TestApp::healthy();

    let response = app.server.get("/v1/tiers/health").await;

    response.assert_status_ok();
    let json: Value = response.json();
    for name in ["agent", "bulk", "rest"] {
        assert_eq!(json[name]["state"], "CLOSED", "tier {name}");
        assert_eq!(json[name]["success_rate"], 1.0);
    }
    assert_eq!(json["agent"]["profile"], "realtime");
    assert_eq!(json["bulk"]["priority"], 2);
}

#[tokio::test]
async fn test_health_snapshot_reflects_traffic() {
    let app = TestApp::healthy();
    app.server
        .post("/v1/operations")
        .json(&get_request("001"))
        .await
        .assert_status_ok();
    app.open_circuit("rest");

    let json: Value = app.server.get("/v1/tiers/health").await.json();

    assert_eq!(json["agent"]["samples"], 1);
    assert!(json["agent"]["p95_latency_ms"].is_u64());
    assert_eq!(json["rest"]["state"], "OPEN");
    assert_eq!(json["rest"]["times_opened"], 1);
}

#[tokio::test]
async fn test_reset_closes_circuit() {
    let app = TestApp::healthy();
    app.open_circuit("agent");

    let response = app.server.post("/v1/tiers/agent/reset").await;

    response.assert_status_ok();
    let json: Value = response.json();
    assert_eq!(json["tier"], "agent");
    assert_eq!(json["state"], "CLOSED");
    assert_eq!(app.circuit_state("agent"), CircuitState::Closed);

    // Traffic flows to the reset tier again
    let routed: Value = app
        .server
        .post("/v1/operations")
        .json(&get_request("001"))
        .await
        .json();
    assert_eq!(routed["tier"], "agent");
}

#[tokio::test]
async fn test_reset_unknown_tier() {
    let app = TestApp::healthy();

    let response = app.server.post("/v1/tiers/ghost/reset").await;

    response.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(response.json::<Value>()["error"]["code"], "NOT_FOUND");
}
