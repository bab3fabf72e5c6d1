//! Rating service error types

use thiserror::Error;

/// Rating service client errors
#[derive(Error, Debug)]
pub enum RatingsError {
    /// Base URL is missing or empty
    #[error("a base URL is required for the rating service")]
    MissingBaseUrl,

    /// Invalid input provided to a client method
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed
    #[error("failed to parse rating service response: {0}")]
    Parse(#[from] serde_json::Error),

    /// Rating service returned an error status
    #[error("rating service error {status}: {message}")]
    Api { status: u16, message: String },

    /// Rating service rejected the sync request
    #[error("sync rejected: {0}")]
    SyncRejected(String),

    /// Target is unknown to the rating service
    #[error("target not found: {0}")]
    TargetNotFound(String),

    /// Rate limited by the rating service
    #[error("rate limited by rating service")]
    RateLimited,

    /// Request timeout
    #[error("request to rating service timed out")]
    Timeout,
}

impl RatingsError {
    /// Check if this error is retryable (transient failure)
    ///
    /// Retries on:
    /// - Timeouts
    /// - Rate limiting
    /// - Transport errors (connect, timeout)
    /// - Server errors (5xx)
    ///
    /// Does NOT retry on client errors (4xx except 429 rate limiting).
    pub fn is_retryable(&self) -> bool {
        match self {
            RatingsError::Timeout | RatingsError::RateLimited => true,
            RatingsError::Http(e) => {
                // Retry on transport issues
                if e.is_timeout() || e.is_connect() {
                    return true;
                }
                // Retry on server errors (5xx) but not client errors (4xx)
                matches!(e.status(), Some(status) if status.is_server_error())
            }
            RatingsError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Result type for rating service operations
pub type RatingsResult<T> = Result<T, RatingsError>;
