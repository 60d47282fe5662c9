//! Tier error taxonomy
//!
//! Every failure a tier client can report is a [`TierError`]. The router only
//! cares about its [`ErrorCategory`]: transient failures are retried within a
//! tier, permanent ones end the tier trial immediately. Both count as a
//! circuit-breaker failure.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::trace::FailureReport;

/// Retry classification of a failed call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Timeouts, connection errors, 5xx, rate limiting
    Transient,
    /// Malformed request, auth denied, not found
    Permanent,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Transient => write!(f, "transient"),
            ErrorCategory::Permanent => write!(f, "permanent"),
        }
    }
}

/// Error raised by a single tier call
#[derive(Debug, Clone, Error)]
pub enum TierError {
    #[error("call timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("upstream error {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("operation not supported by tier: {0}")]
    Unsupported(String),
}

impl TierError {
    /// Retry classification of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            TierError::Timeout(_)
            | TierError::Connection(_)
            | TierError::Upstream { .. }
            | TierError::RateLimited { .. } => ErrorCategory::Transient,
            TierError::InvalidRequest(_)
            | TierError::Unauthorized(_)
            | TierError::NotFound(_)
            | TierError::Unsupported(_) => ErrorCategory::Permanent,
        }
    }

    /// Server-provided hint for how long to wait before retrying
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            TierError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Stable short code used in traces and metrics labels
    pub fn code(&self) -> &'static str {
        match self {
            TierError::Timeout(_) => "timeout",
            TierError::Connection(_) => "connection",
            TierError::Upstream { .. } => "upstream",
            TierError::RateLimited { .. } => "rate_limited",
            TierError::InvalidRequest(_) => "invalid_request",
            TierError::Unauthorized(_) => "unauthorized",
            TierError::NotFound(_) => "not_found",
            TierError::Unsupported(_) => "unsupported",
        }
    }
}

/// Terminal errors returned by the fallback router
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("all tiers failed ({} tried)", .0.tiers.len())]
    AllTiersFailed(FailureReport),

    #[error("unknown tier: {0}")]
    UnknownTier(String),
}

/// Errors from registry administration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown tier: {0}")]
    UnknownTier(String),

    #[error("tier registered twice: {0}")]
    DuplicateTier(String),
}
