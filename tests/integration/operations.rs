//! Operations endpoint integration tests
//!
//! Tests for POST /v1/operations:
//! - Routing to the first healthy tier
//! - Fallback, skip-on-open and circuit opening across requests
//! - Failure reports, deadlines and request validation

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tiergate::tiers::{testing::Step, CircuitState, TierError};
use std::time::Duration;

use crate::common::{bulk_read_request, get_request, TestApp};

// ===========================================
// Successful routing
// ===========================================

#[tokio::test]
async fn test_get_served_by_primary_tier() {
    let app = TestApp::healthy();

    let response = app.server.post("/v1/operations").json(&get_request("001")).await;

    response.assert_status_ok();
    let json: Value = response.json();
    assert_eq!(json["tier"], "agent");
    assert_eq!(json["total_attempts"], 1);
    assert_eq!(json["desperation"], false);
    assert_eq!(json["output"]["type"], "record");
    assert_eq!(json["output"]["data"]["id"], "001");
    assert_eq!(json["output"]["data"]["served_by"], "agent");
    assert_eq!(json["trace"][0]["outcome"]["status"], "succeeded");
}

#[tokio::test]
async fn test_large_bulk_read_prefers_bulk_tier() {
    let app = TestApp::healthy();

    let response = app.server.post("/v1/operations").json(&bulk_read_request(25)).await;

    response.assert_status_ok();
    let json: Value = response.json();
    assert_eq!(json["tier"], "bulk");
    assert_eq!(json["output"]["type"], "records");
    assert_eq!(json["output"]["data"].as_array().unwrap().len(), 25);
    assert_eq!(app.client("agent").calls(), 0);
}

#[tokio::test]
async fn test_agent_context_overrides_bulk_preference() {
    let app = TestApp::healthy();
    let mut body = bulk_read_request(25);
    body["context"] = json!({ "is_agent_context": true });

    let response = app.server.post("/v1/operations").json(&body).await;

    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["tier"], "agent");
}

#[tokio::test]
async fn test_explicit_tier() {
    let app = TestApp::healthy();
    let mut body = get_request("001");
    body["context"] = json!({ "explicit_tier": "rest" });

    let response = app.server.post("/v1/operations").json(&body).await;

    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["tier"], "rest");
    assert_eq!(app.client("agent").calls(), 0);
}

// ===========================================
// Fallback & circuits
// ===========================================

#[tokio::test]
async fn test_fallback_to_next_tier() {
    let app = TestApp::with_failing("agent", TierError::NotFound("001".into()));

    let response = app.server.post("/v1/operations").json(&get_request("001")).await;

    response.assert_status_ok();
    let json: Value = response.json();
    assert_eq!(json["tier"], "bulk");
    assert_eq!(json["trace"].as_array().unwrap().len(), 2);
    assert_eq!(json["trace"][0]["outcome"]["status"], "failed");
    assert_eq!(json["trace"][0]["outcome"]["category"], "permanent");
}

#[tokio::test]
async fn test_open_tier_skipped() {
    let app = TestApp::healthy();
    app.open_circuit("agent");

    let response = app.server.post("/v1/operations").json(&get_request("001")).await;

    response.assert_status_ok();
    let json: Value = response.json();
    assert_eq!(json["tier"], "bulk");
    assert_eq!(json["total_attempts"], 1);
    assert_eq!(json["trace"][0]["outcome"]["status"], "circuit_open");
    assert_eq!(app.client("agent").calls(), 0);
}

#[tokio::test]
async fn test_repeated_failures_open_circuit() {
    let app = TestApp::with_failing("agent", TierError::Connection("refused".into()));

    // Each request is one failed trial against the agent tier
    for _ in 0..3 {
        app.server
            .post("/v1/operations")
            .json(&get_request("001"))
            .await
            .assert_status_ok();
    }
    assert_eq!(app.circuit_state("agent"), CircuitState::Open);
    let calls_when_opened = app.client("agent").calls();
    assert_eq!(calls_when_opened, 9);

    let response = app.server.post("/v1/operations").json(&get_request("001")).await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["tier"], "bulk");
    assert_eq!(app.client("agent").calls(), calls_when_opened);
}

#[tokio::test]
async fn test_transient_failure_retried_within_tier() {
    let app = TestApp::new(vec![
        tiergate::tiers::testing::ScriptedTierClient::new("agent").with_script([
            Step::Fail(TierError::Upstream {
                status: 502,
                message: "bad gateway".into(),
            }),
        ]),
        tiergate::tiers::testing::ScriptedTierClient::new("bulk"),
        tiergate::tiers::testing::ScriptedTierClient::new("rest"),
    ]);

    let response = app.server.post("/v1/operations").json(&get_request("001")).await;

    response.assert_status_ok();
    let json: Value = response.json();
    assert_eq!(json["tier"], "agent");
    assert_eq!(json["total_attempts"], 2);
    assert_eq!(app.circuit_state("agent"), CircuitState::Closed);
}

// ===========================================
// Failures
// ===========================================

#[tokio::test]
async fn test_all_tiers_failed_returns_report() {
    let app = TestApp::new(
        ["agent", "bulk", "rest"]
            .into_iter()
            .map(|name| {
                tiergate::tiers::testing::ScriptedTierClient::failing(
                    name,
                    TierError::Connection("refused".into()),
                )
            })
            .collect(),
    );

    let response = app.server.post("/v1/operations").json(&get_request("001")).await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let json: Value = response.json();
    assert_eq!(json["error"]["code"], "ALL_TIERS_FAILED");
    let details = &json["error"]["details"];
    assert_eq!(details["tiers"].as_array().unwrap().len(), 3);
    assert_eq!(details["total_attempts"], 9);
    assert_eq!(details["deadline_exceeded"], false);
}

#[tokio::test]
async fn test_all_permanent_failures_rejected() {
    let app = TestApp::new(
        ["agent", "bulk", "rest"]
            .into_iter()
            .map(|name| {
                tiergate::tiers::testing::ScriptedTierClient::failing(
                    name,
                    TierError::InvalidRequest("unknown field".into()),
                )
            })
            .collect(),
    );

    let response = app.server.post("/v1/operations").json(&get_request("001")).await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let json: Value = response.json();
    assert_eq!(json["error"]["code"], "OPERATION_REJECTED");
    assert_eq!(json["error"]["details"]["total_attempts"], 3);
}

#[tokio::test]
async fn test_deadline_exceeded() {
    let app = TestApp::new(vec![
        tiergate::tiers::testing::ScriptedTierClient::new("agent")
            .with_script([Step::Delay(Duration::from_secs(5))]),
        tiergate::tiers::testing::ScriptedTierClient::new("bulk"),
        tiergate::tiers::testing::ScriptedTierClient::new("rest"),
    ]);
    let mut body = get_request("001");
    body["deadline_ms"] = json!(50);

    let response = app.server.post("/v1/operations").json(&body).await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let json: Value = response.json();
    assert_eq!(json["error"]["code"], "DEADLINE_EXCEEDED");
    assert_eq!(json["error"]["details"]["deadline_exceeded"], true);
    assert_eq!(app.client("bulk").calls(), 0);
}

#[tokio::test]
async fn test_unknown_explicit_tier_is_bad_request() {
    let app = TestApp::healthy();
    let mut body = get_request("001");
    body["context"] = json!({ "explicit_tier": "ghost" });

    let response = app.server.post("/v1/operations").json(&body).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_zero_deadline_is_bad_request() {
    let app = TestApp::healthy();
    let mut body = get_request("001");
    body["deadline_ms"] = json!(0);

    let response = app.server.post("/v1/operations").json(&body).await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_operation_type_rejected() {
    let app = TestApp::healthy();

    let response = app
        .server
        .post("/v1/operations")
        .json(&json!({ "operation": { "type": "delete", "id": "001" } }))
        .await;

    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(app.client("agent").calls(), 0);
}
