//! Mock REST tier backend for testing
//!
//! Provides wiremock-based mocks for the endpoints `HttpTierClient` calls:
//! - GET/PATCH /records/{id} - Single record read and update
//! - POST /records/search - Search
//! - POST /records/bulk-read - Bulk read
//! - POST /records/bulk-write - Bulk write
//! - GET /health - Health probe
//!
//! # Example
//!
//! ```rust,ignore
//! use crate::mocks::tier_server::MockTierServer;
//!
//! #[tokio::test]
//! async fn test_with_tier_mock() {
//!     let mock_server = MockTierServer::start().await;
//!     mock_server.mock_get_record("001", json!({"Name": "Acme"})).await;
//!
//!     // Use mock_server.uri() as the tier URL
//!     // ...
//! }
//! ```

use std::time::Duration;

use serde_json::{json, Value};
use wiremock::{
    matchers::{method, path, path_regex},
    Mock, MockServer, ResponseTemplate,
};

/// Mock tier backend wrapper
pub struct MockTierServer {
    server: MockServer,
}

impl MockTierServer {
    /// Start a new mock tier server
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        Self { server }
    }

    /// Get the mock server URI
    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Get all received requests (for assertion in tests)
    pub async fn received_requests(&self) -> Vec<wiremock::Request> {
        self.server.received_requests().await.unwrap_or_default()
    }

    /// Requests received on one path
    pub async fn requests_to(&self, request_path: &str) -> Vec<wiremock::Request> {
        self.received_requests()
            .await
            .into_iter()
            .filter(|r| r.url.path() == request_path)
            .collect()
    }

    // =========================================================================
    // Records
    // =========================================================================

    /// Mock a successful GET for one record
    pub async fn mock_get_record(&self, id: &str, fields: Value) {
        let mut body = fields;
        body["id"] = json!(id);
        Mock::given(method("GET"))
            .and(path(format!("/records/{}", id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Mock a PATCH that echoes the patch back as the updated record
    pub async fn mock_update_record(&self, id: &str, fields: Value) {
        let mut body = fields;
        body["id"] = json!(id);
        Mock::given(method("PATCH"))
            .and(path(format!("/records/{}", id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Mock search and bulk-read returning `records`
    pub async fn mock_record_list(&self, request_path: &str, records: Value) {
        Mock::given(method("POST"))
            .and(path(request_path))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "records": records })))
            .mount(&self.server)
            .await;
    }

    /// Mock a bulk write summary
    pub async fn mock_bulk_write(&self, succeeded: usize, failed: usize) {
        Mock::given(method("POST"))
            .and(path("/records/bulk-write"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "succeeded": succeeded,
                "failed": failed
            })))
            .mount(&self.server)
            .await;
    }

    // =========================================================================
    // Failures
    // =========================================================================

    /// Every record request answers with `status`
    pub async fn mock_records_status(&self, status: u16) {
        Mock::given(path_regex(r"^/records"))
            .respond_with(ResponseTemplate::new(status).set_body_string("tier error"))
            .mount(&self.server)
            .await;
    }

    /// Every record request answers 429 with a Retry-After header
    pub async fn mock_rate_limited(&self, retry_after_secs: u64) {
        Mock::given(path_regex(r"^/records"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("Retry-After", retry_after_secs.to_string().as_str()),
            )
            .mount(&self.server)
            .await;
    }

    /// Record requests answer 200 after `delay`
    pub async fn mock_slow_records(&self, delay: Duration) {
        Mock::given(path_regex(r"^/records"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "id": "slow" }))
                    .set_delay(delay),
            )
            .mount(&self.server)
            .await;
    }

    /// Record requests answer 200 with a body that is not a record
    pub async fn mock_malformed_records(&self) {
        Mock::given(path_regex(r"^/records"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&self.server)
            .await;
    }

    // =========================================================================
    // GET /health
    // =========================================================================

    pub async fn mock_health(&self, status: u16) {
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiergate::tiers::client::SearchCriteria;
    use tiergate::tiers::{ErrorCategory, HttpTierClient, Record, TierClient, TierError};
    use tokio_test::assert_ok;

    fn client(server: &MockTierServer) -> HttpTierClient {
        HttpTierClient::new(reqwest::Client::new(), server.uri(), Duration::from_millis(500))
    }

    #[tokio::test]
    async fn test_get_record() {
        let server = MockTierServer::start().await;
        server.mock_get_record("001", json!({ "Name": "Acme" })).await;

        let record = assert_ok!(client(&server).get("001").await);
        assert_eq!(record.id, "001");
        assert_eq!(record.fields["Name"], "Acme");
    }

    #[tokio::test]
    async fn test_update_sends_patch_body() {
        let server = MockTierServer::start().await;
        server.mock_update_record("001", json!({ "Status": "Closed" })).await;

        let mut patch = serde_json::Map::new();
        patch.insert("Status".to_string(), json!("Closed"));
        let record = assert_ok!(client(&server).update("001", &patch).await);
        assert_eq!(record.fields["Status"], "Closed");

        let requests = server.requests_to("/records/001").await;
        assert_eq!(requests.len(), 1);
        let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(sent, json!({ "Status": "Closed" }));
    }

    #[tokio::test]
    async fn test_search_and_bulk_paths() {
        let server = MockTierServer::start().await;
        server
            .mock_record_list("/records/search", json!([{ "id": "a" }, { "id": "b" }]))
            .await;
        server
            .mock_record_list("/records/bulk-read", json!([{ "id": "x" }]))
            .await;
        server.mock_bulk_write(2, 1).await;
        let client = client(&server);

        let found = assert_ok!(
            client
                .search(&SearchCriteria {
                    object: "Account".to_string(),
                    ..Default::default()
                })
                .await
        );
        assert_eq!(found.len(), 2);

        let read = assert_ok!(client.bulk_read(&["x".to_string()]).await);
        assert_eq!(read[0].id, "x");
        let sent: Value =
            serde_json::from_slice(&server.requests_to("/records/bulk-read").await[0].body)
                .unwrap();
        assert_eq!(sent, json!({ "ids": ["x"] }));

        let summary = assert_ok!(
            client
                .bulk_write(&[Record::new("n1"), Record::new("n2"), Record::new("n3")])
                .await
        );
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
    }

    #[tokio::test]
    async fn test_status_classification() {
        let cases = [
            (503, ErrorCategory::Transient, "upstream"),
            (500, ErrorCategory::Transient, "upstream"),
            (404, ErrorCategory::Permanent, "not_found"),
            (401, ErrorCategory::Permanent, "unauthorized"),
            (422, ErrorCategory::Permanent, "invalid_request"),
        ];
        for (status, category, code) in cases {
            let server = MockTierServer::start().await;
            server.mock_records_status(status).await;

            let err = client(&server).get("001").await.unwrap_err();
            assert_eq!(err.category(), category, "status {status}");
            assert_eq!(err.code(), code, "status {status}");
        }
    }

    #[tokio::test]
    async fn test_rate_limit_retry_after() {
        let server = MockTierServer::start().await;
        server.mock_rate_limited(4).await;

        let err = client(&server).get("001").await.unwrap_err();
        assert!(matches!(err, TierError::RateLimited { .. }));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(4)));
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let server = MockTierServer::start().await;
        server.mock_slow_records(Duration::from_secs(2)).await;

        let client = HttpTierClient::new(
            reqwest::Client::new(),
            server.uri(),
            Duration::from_millis(100),
        );
        let err = client.get("001").await.unwrap_err();
        assert!(matches!(err, TierError::Timeout(_)), "{err:?}");
        assert_eq!(err.category(), ErrorCategory::Transient);
    }

    #[tokio::test]
    async fn test_malformed_body_is_transient() {
        let server = MockTierServer::start().await;
        server.mock_malformed_records().await;

        let err = client(&server).get("001").await.unwrap_err();
        assert!(matches!(err, TierError::Upstream { status: 200, .. }));
        assert_eq!(err.category(), ErrorCategory::Transient);
    }

    #[tokio::test]
    async fn test_connection_refused_is_transient() {
        // Reserve a free port, then close it so nothing is listening
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let uri = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let client = HttpTierClient::new(reqwest::Client::new(), uri, Duration::from_millis(500));
        let err = client.get("001").await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Transient);
    }

    #[tokio::test]
    async fn test_health_probe() {
        let healthy = MockTierServer::start().await;
        healthy.mock_health(200).await;
        assert!(client(&healthy).health_probe().await);

        let unhealthy = MockTierServer::start().await;
        unhealthy.mock_health(503).await;
        assert!(!client(&unhealthy).health_probe().await);
    }
}
