//! Tier client abstraction
//!
//! Defines the capability every backend access path implements so the router
//! can treat the agent-tool, bulk-SDK and REST paths interchangeably.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::TierError;

/// A CRM record as returned by a tier
///
/// The router never looks inside `fields`; mapping is the tier client's job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// Search request forwarded to a tier
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchCriteria {
    /// CRM object type, e.g. "Account"
    pub object: String,
    #[serde(default)]
    pub filters: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

/// Result of a bulk write
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkWriteSummary {
    pub succeeded: usize,
    pub failed: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// One logical CRM data operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    Get { id: String },
    Update { id: String, patch: Map<String, Value> },
    Search { criteria: SearchCriteria },
    BulkRead { ids: Vec<String> },
    BulkWrite { records: Vec<Record> },
}

impl Operation {
    /// Short name used in logs and metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Get { .. } => "get",
            Operation::Update { .. } => "update",
            Operation::Search { .. } => "search",
            Operation::BulkRead { .. } => "bulk_read",
            Operation::BulkWrite { .. } => "bulk_write",
        }
    }

    /// Number of records the operation touches, used as a routing hint
    pub fn record_count(&self) -> usize {
        match self {
            Operation::Get { .. } | Operation::Update { .. } | Operation::Search { .. } => 1,
            Operation::BulkRead { ids } => ids.len(),
            Operation::BulkWrite { records } => records.len(),
        }
    }
}

/// Payload returned by a successful operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum OperationOutput {
    Record(Record),
    Records(Vec<Record>),
    BulkWrite(BulkWriteSummary),
}

/// Capability implemented by every tier adapter
///
/// Implementations must be safe for concurrent use; the router does not
/// serialize calls. Errors must be classified through [`TierError`] so the
/// router can decide on retries without knowing the transport.
#[async_trait]
pub trait TierClient: Send + Sync {
    async fn get(&self, id: &str) -> Result<Record, TierError>;

    async fn update(&self, id: &str, patch: &Map<String, Value>) -> Result<Record, TierError>;

    async fn search(&self, criteria: &SearchCriteria) -> Result<Vec<Record>, TierError>;

    async fn bulk_read(&self, ids: &[String]) -> Result<Vec<Record>, TierError>;

    async fn bulk_write(&self, records: &[Record]) -> Result<BulkWriteSummary, TierError>;

    /// Lightweight liveness probe; `false` means the tier answered but is unhealthy
    async fn health_probe(&self) -> bool;
}

/// Run an operation against a tier client
pub async fn dispatch(
    client: &dyn TierClient,
    operation: &Operation,
) -> Result<OperationOutput, TierError> {
    match operation {
        Operation::Get { id } => client.get(id).await.map(OperationOutput::Record),
        Operation::Update { id, patch } => {
            client.update(id, patch).await.map(OperationOutput::Record)
        }
        Operation::Search { criteria } => {
            client.search(criteria).await.map(OperationOutput::Records)
        }
        Operation::BulkRead { ids } => client.bulk_read(ids).await.map(OperationOutput::Records),
        Operation::BulkWrite { records } => client
            .bulk_write(records)
            .await
            .map(OperationOutput::BulkWrite),
    }
}
