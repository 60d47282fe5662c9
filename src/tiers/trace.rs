//! Per-request attempt trace
//!
//! Built locally by the router while it walks the tier list and returned with
//! the final result so operators can see exactly which tier did what.

use serde::{Deserialize, Serialize};

use super::client::OperationOutput;
use super::error::{ErrorCategory, TierError};

/// A single call against a single tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub tier: String,
    /// 1-based attempt number within the tier
    pub attempt: u32,
    pub success: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<ErrorCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AttemptRecord {
    pub(crate) fn succeeded(tier: &str, attempt: u32, latency_ms: u64) -> Self {
        Self {
            tier: tier.to_string(),
            attempt,
            success: true,
            latency_ms,
            category: None,
            error: None,
        }
    }

    pub(crate) fn failed(tier: &str, attempt: u32, latency_ms: u64, error: &TierError) -> Self {
        Self {
            tier: tier.to_string(),
            attempt,
            success: false,
            latency_ms,
            category: Some(error.category()),
            error: Some(error.to_string()),
        }
    }
}

/// Terminal outcome of one tier trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TierOutcome {
    Succeeded,
    Failed {
        category: ErrorCategory,
        code: String,
        message: String,
    },
    /// Breaker rejected the call; no network attempt was made
    CircuitOpen,
    /// Caller deadline ran out during this tier
    DeadlineExceeded {
        /// Category of the last tier error seen before time ran out
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_category: Option<ErrorCategory>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_code: Option<String>,
    },
}

impl TierOutcome {
    pub(crate) fn from_error(error: &TierError) -> Self {
        TierOutcome::Failed {
            category: error.category(),
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }

    pub(crate) fn deadline(last_error: Option<&TierError>) -> Self {
        TierOutcome::DeadlineExceeded {
            last_category: last_error.map(TierError::category),
            last_code: last_error.map(|e| e.code().to_string()),
        }
    }

    pub fn is_deadline(&self) -> bool {
        matches!(self, TierOutcome::DeadlineExceeded { .. })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TierOutcome::Succeeded)
    }

    /// Final error category, if the tier failed with a tier error
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            TierOutcome::Failed { category, .. } => Some(*category),
            TierOutcome::DeadlineExceeded { last_category, .. } => *last_category,
            _ => None,
        }
    }
}

/// Everything that happened on one tier during a request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierTrace {
    pub tier: String,
    pub attempts: u32,
    /// Wall time spent on this tier, including backoff sleeps
    pub latency_ms: u64,
    pub outcome: TierOutcome,
    /// Tier was tried as a last resort while its circuit was open
    #[serde(default)]
    pub desperation: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempt_log: Vec<AttemptRecord>,
}

impl TierTrace {
    pub(crate) fn skipped(tier: &str) -> Self {
        Self {
            tier: tier.to_string(),
            attempts: 0,
            latency_ms: 0,
            outcome: TierOutcome::CircuitOpen,
            desperation: false,
            attempt_log: Vec::new(),
        }
    }
}

/// Aggregate failure returned when no tier served the request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureReport {
    pub tiers: Vec<TierTrace>,
    pub total_attempts: u32,
    pub deadline_exceeded: bool,
}

impl FailureReport {
    pub(crate) fn new(tiers: Vec<TierTrace>, deadline_exceeded: bool) -> Self {
        let total_attempts = tiers.iter().map(|t| t.attempts).sum();
        Self {
            tiers,
            total_attempts,
            deadline_exceeded,
        }
    }

    /// True when every tier that was reached rejected the operation permanently
    ///
    /// Distinguishes "this operation is bad" from "everything is down".
    pub fn all_permanent(&self) -> bool {
        let mut tried = self
            .tiers
            .iter()
            .filter(|t| !matches!(t.outcome, TierOutcome::CircuitOpen))
            .peekable();
        tried.peek().is_some()
            && tried.all(|t| t.outcome.category() == Some(ErrorCategory::Permanent))
    }
}

/// Successful routing result
#[derive(Debug, Clone, Serialize)]
pub struct Routed {
    pub output: OperationOutput,
    /// Tier that served the request
    pub tier: String,
    pub total_attempts: u32,
    pub desperation: bool,
    pub trace: Vec<TierTrace>,
}
