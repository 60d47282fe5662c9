//! Error types for Tiergate
//!
//! This module defines the HTTP-facing error type used by the route handlers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::tiers::{FailureReport, RegistryError, RouterError};

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("All tiers failed")]
    AllTiersFailed(FailureReport),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<RouterError> for AppError {
    fn from(err: RouterError) -> Self {
        match err {
            RouterError::AllTiersFailed(report) => AppError::AllTiersFailed(report),
            RouterError::UnknownTier(name) => AppError::BadRequest(format!("Unknown tier: {}", name)),
        }
    }
}

impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::UnknownTier(name) => AppError::NotFound(format!("Unknown tier: {}", name)),
            other => AppError::Internal(other.into()),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error details
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone(), None),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone(), None),
            AppError::AllTiersFailed(report) => {
                let code = if report.deadline_exceeded {
                    "DEADLINE_EXCEEDED"
                } else if report.all_permanent() {
                    "OPERATION_REJECTED"
                } else {
                    "ALL_TIERS_FAILED"
                };
                let message = format!(
                    "No tier served the request after {} attempts across {} tiers",
                    report.total_attempts,
                    report.tiers.len()
                );
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    code,
                    message,
                    serde_json::to_value(report).ok(),
                )
            }
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error".to_string(),
                None,
            ),
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
