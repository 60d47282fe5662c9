//! HTTP tier client
//!
//! `TierClient` over a plain REST backend. Used for every configured tier
//! that points at a URL; embedding applications can register their own
//! clients instead.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, instrument, warn};

use super::client::{BulkWriteSummary, Record, SearchCriteria, TierClient};
use super::error::TierError;

#[derive(Debug, Deserialize)]
struct RecordList {
    records: Vec<Record>,
}

#[derive(Debug, Serialize)]
struct BulkReadRequest<'a> {
    ids: &'a [String],
}

#[derive(Debug, Serialize)]
struct BulkWriteRequest<'a> {
    records: &'a [Record],
}

/// REST-backed tier client
pub struct HttpTierClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpTierClient {
    /// Create a client for `base_url`; `timeout` bounds each HTTP request
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, TierError> {
        let response = request
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        debug!(status = %status, "Tier response status");

        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let text = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %text, "Tier request failed");
            return Err(classify_status(status, retry_after, text));
        }

        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        serde_json::from_str(&body).map_err(|e| {
            error!(error = %e, body = %body, "Failed to parse tier response");
            TierError::Upstream {
                status: status.as_u16(),
                message: format!("Failed to parse tier response: {}", e),
            }
        })
    }

    fn transport_error(&self, e: reqwest::Error) -> TierError {
        if e.is_timeout() {
            TierError::Timeout(self.timeout)
        } else {
            TierError::Connection(e.to_string())
        }
    }
}

/// Map a non-success HTTP status to a tier error
pub fn classify_status(status: StatusCode, retry_after: Option<Duration>, body: String) -> TierError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => TierError::RateLimited { retry_after },
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => TierError::InvalidRequest(body),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => TierError::Unauthorized(body),
        StatusCode::NOT_FOUND => TierError::NotFound(body),
        StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED => TierError::Unsupported(body),
        s if s.is_client_error() => TierError::InvalidRequest(body),
        s => TierError::Upstream {
            status: s.as_u16(),
            message: body,
        },
    }
}

/// Retry-After in delta-seconds form; HTTP dates are ignored
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[async_trait]
impl TierClient for HttpTierClient {
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    async fn get(&self, id: &str) -> Result<Record, TierError> {
        let request = self.client.get(self.url(&format!("/records/{}", id)));
        self.send(request).await
    }

    #[instrument(skip(self, patch), fields(base_url = %self.base_url))]
    async fn update(&self, id: &str, patch: &Map<String, Value>) -> Result<Record, TierError> {
        let request = self
            .client
            .patch(self.url(&format!("/records/{}", id)))
            .json(patch);
        self.send(request).await
    }

    #[instrument(skip(self, criteria), fields(base_url = %self.base_url, object = %criteria.object))]
    async fn search(&self, criteria: &SearchCriteria) -> Result<Vec<Record>, TierError> {
        let request = self.client.post(self.url("/records/search")).json(criteria);
        let list: RecordList = self.send(request).await?;
        Ok(list.records)
    }

    #[instrument(skip(self, ids), fields(base_url = %self.base_url, count = ids.len()))]
    async fn bulk_read(&self, ids: &[String]) -> Result<Vec<Record>, TierError> {
        let request = self
            .client
            .post(self.url("/records/bulk-read"))
            .json(&BulkReadRequest { ids });
        let list: RecordList = self.send(request).await?;
        Ok(list.records)
    }

    #[instrument(skip(self, records), fields(base_url = %self.base_url, count = records.len()))]
    async fn bulk_write(&self, records: &[Record]) -> Result<BulkWriteSummary, TierError> {
        let request = self
            .client
            .post(self.url("/records/bulk-write"))
            .json(&BulkWriteRequest { records });
        self.send(request).await
    }

    async fn health_probe(&self) -> bool {
        match self
            .client
            .get(self.url("/health"))
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(base_url = %self.base_url, error = %e, "Tier health probe failed");
                false
            }
        }
    }
}
