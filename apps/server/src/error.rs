//! Error handling for the Halftone server
//!
//! A single error enum using thiserror, with HTTP status code mapping
//! via Axum's IntoResponse trait.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::models::JobStatus;

/// Error response body returned to API clients
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for client-side handling
    pub code: &'static str,
    /// Human-readable error message
    pub message: String,
}

/// Main server error type
#[derive(Error, Debug)]
pub enum ServerError {
    // ========== Resource Errors ==========
    /// Requested resource not found
    #[error("{resource_type} not found: {id}")]
    NotFound {
        resource_type: &'static str,
        id: String,
    },

    // ========== Validation Errors ==========
    /// Request validation failed
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Missing required field
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// Invalid query parameter
    #[error("invalid query parameter '{name}': {reason}")]
    InvalidQueryParam { name: &'static str, reason: String },

    // ========== Job Errors ==========
    /// Job creation would produce an empty work item set
    #[error("nothing to process: the requested scope contains no work items")]
    NothingToProcess,

    /// Operation is not valid for the job's current status
    #[error("job is already {status}")]
    InvalidTransition { status: JobStatus },

    // ========== Infrastructure Errors ==========
    /// Database query failed
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON serialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Catch-all internal error
    #[error("internal server error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 404 Not Found
            Self::NotFound { .. } => StatusCode::NOT_FOUND,

            // 400 Bad Request
            Self::ValidationError(_)
            | Self::MissingField(_)
            | Self::InvalidQueryParam { .. } => StatusCode::BAD_REQUEST,

            // 409 Conflict
            Self::InvalidTransition { .. } => StatusCode::CONFLICT,

            // 422 Unprocessable Entity
            Self::NothingToProcess => StatusCode::UNPROCESSABLE_ENTITY,

            // 500 Internal Server Error
            Self::Database(_)
            | Self::Serialization(_)
            | Self::Configuration(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code string for client-side handling
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::MissingField(_) => "MISSING_FIELD",
            Self::InvalidQueryParam { .. } => "INVALID_QUERY_PARAM",
            Self::NothingToProcess => "NOTHING_TO_PROCESS",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Create a not found error for a specific resource
    pub fn not_found(resource_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type,
            id: id.into(),
        }
    }

    /// Log the error with severity based on status code
    pub fn log(&self) {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(
                error = %self,
                code = self.error_code(),
                status = status.as_u16(),
                "Server error occurred"
            );
        } else {
            tracing::debug!(
                error = %self,
                code = self.error_code(),
                status = status.as_u16(),
                "Client error"
            );
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        self.log();

        let status = self.status_code();
        let error_response = ErrorResponse {
            code: self.error_code(),
            message: self.to_string(),
        };

        (status, Json(error_response)).into_response()
    }
}

impl From<anyhow::Error> for ServerError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<ServerError>() {
            Ok(server_err) => server_err,
            Err(err) => Self::Internal(err.to_string()),
        }
    }
}

/// Result type alias for server operations
pub type ServerResult<T> = Result<T, ServerError>;
