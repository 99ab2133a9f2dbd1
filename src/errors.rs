//! Structured error types with machine-readable codes and categories
//! Provides detailed error information for debugging and client error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured error response for API clients
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code
    pub code: String,

    /// Error taxonomy category (validation, upstream_ai, timeout, ...)
    pub category: String,

    /// Human-readable error message
    pub message: String,

    /// Additional error context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Application error types with proper categorization
///
/// Categories follow the pipeline taxonomy: validation and persistence errors
/// propagate immediately; upstream-AI errors are retried inside the clients
/// before they surface here; timeouts are distinct from failures because the
/// background task may still succeed.
#[derive(Debug)]
pub enum AppError {
    // Validation errors (400)
    InvalidInput { field: String, reason: String },
    InvalidVin(String),

    // Not found (404)
    InspectionNotFound(String),

    // Conflict (409) - e.g. retry on a non-failed inspection
    InvalidTransition { from: String, reason: String },

    // Synchronous wait exceeded (500, distinct code - background work continues)
    ProcessingTimeout,

    // Vision/embedding call failed or returned a non-conforming response
    // after exhausting retries (500)
    UpstreamAi(String),

    // Inspection finished in the failed state (500)
    ProcessingFailed { category: String, message: String },

    // Store unavailable or write failed (500)
    StorageError(String),

    // Service errors (503)
    ServiceUnavailable(String),

    // Generic wrapper for external errors
    Internal(anyhow::Error),
}

impl AppError {
    /// Get error code for client identification
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::InvalidVin(_) => "INVALID_VIN",
            Self::InspectionNotFound(_) => "INSPECTION_NOT_FOUND",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::ProcessingTimeout => "PROCESSING_TIMEOUT",
            Self::UpstreamAi(_) => "UPSTREAM_AI_ERROR",
            Self::ProcessingFailed { .. } => "PROCESSING_FAILED",
            Self::StorageError(_) => "STORAGE_ERROR",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Taxonomy category used for failed-inspection records and alert tags
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } | Self::InvalidVin(_) => "validation",
            Self::InspectionNotFound(_) => "not_found",
            Self::InvalidTransition { .. } => "conflict",
            Self::ProcessingTimeout => "timeout",
            Self::UpstreamAi(_) => "upstream_ai",
            Self::ProcessingFailed { .. } => "processing",
            Self::StorageError(_) => "persistence",
            Self::ServiceUnavailable(_) => "service",
            Self::Internal(_) => "internal",
        }
    }

    /// Get HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput { .. } | Self::InvalidVin(_) => StatusCode::BAD_REQUEST,

            Self::InspectionNotFound(_) => StatusCode::NOT_FOUND,

            Self::InvalidTransition { .. } => StatusCode::CONFLICT,

            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,

            Self::ProcessingTimeout
            | Self::UpstreamAi(_)
            | Self::ProcessingFailed { .. }
            | Self::StorageError(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get detailed error message
    pub fn message(&self) -> String {
        match self {
            Self::InvalidInput { field, reason } => {
                format!("Invalid input for field '{field}': {reason}")
            }
            Self::InvalidVin(reason) => format!("Invalid VIN: {reason}"),
            Self::InspectionNotFound(id) => format!("Inspection not found: {id}"),
            Self::InvalidTransition { from, reason } => {
                format!("Invalid transition from status '{from}': {reason}")
            }
            Self::ProcessingTimeout => {
                "Processing did not finish within the synchronous wait; poll the inspection for its eventual status".to_string()
            }
            Self::UpstreamAi(msg) => format!("Upstream AI error: {msg}"),
            Self::ProcessingFailed { category, message } => {
                format!("Inspection processing failed ({category}): {message}")
            }
            Self::StorageError(msg) => format!("Storage error: {msg}"),
            Self::ServiceUnavailable(msg) => format!("Service unavailable: {msg}"),
            Self::Internal(err) => format!("Internal error: {err}"),
        }
    }

    /// Convert to structured error response
    ///
    /// Internal context stays in the logs; the payload carries only the
    /// code/category/message surface.
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.code().to_string(),
            category: self.category().to_string(),
            message: self.message(),
            details: None,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for AppError {}

/// Convert from anyhow::Error to AppError
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

/// Axum IntoResponse implementation for proper HTTP responses
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), "request failed: {}", self.message());
        }
        let body = self.to_response();

        (status, Json(body)).into_response()
    }
}

/// Helper trait to convert validation errors
pub trait ValidationErrorExt<T> {
    fn map_validation_err(self, field: &str) -> Result<T>;
}

impl<T> ValidationErrorExt<T> for anyhow::Result<T> {
    fn map_validation_err(self, field: &str) -> Result<T> {
        self.map_err(|e| AppError::InvalidInput {
            field: field.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Type alias for Results using AppError
pub type Result<T> = std::result::Result<T, AppError>;
