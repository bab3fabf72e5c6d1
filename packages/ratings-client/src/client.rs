//! Rating service client implementation

use std::fmt;
use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::{RatingsError, RatingsResult};
use crate::models::{ErrorResponse, RawSyncResponse, SyncRequest, SyncReport};

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default connection timeout in seconds
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Default number of retry attempts for transient failures
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (milliseconds)
const RETRY_BASE_DELAY_MS: u64 = 100;

/// Rating service API client
#[derive(Clone)]
pub struct RatingsClient {
    http_client: Client,
    base_url: String,
    api_key: Option<String>,
    max_retries: u32,
}

impl fmt::Debug for RatingsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RatingsClient")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl RatingsClient {
    /// Create a new rating service client
    ///
    /// # Errors
    /// Returns `RatingsError::MissingBaseUrl` if the base URL is empty.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> RatingsResult<Self> {
        Self::with_timeout(base_url, api_key, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a client with a custom request timeout
    pub fn with_timeout(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> RatingsResult<Self> {
        let base_url = base_url.into();
        if base_url.trim().is_empty() {
            return Err(RatingsError::MissingBaseUrl);
        }
        // Reject URLs reqwest would choke on later
        url::Url::parse(&base_url)
            .map_err(|e| RatingsError::InvalidInput(format!("invalid base URL: {}", e)))?;

        let http_client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
            .pool_max_idle_per_host(5)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent("Halftone/1.0")
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    /// Create a rating service client from environment variables
    ///
    /// Reads `RATINGS_SERVICE_URL` and the optional `RATINGS_SERVICE_API_KEY`.
    ///
    /// # Errors
    /// `RatingsError::MissingBaseUrl` if the URL variable is not set or empty.
    pub fn from_env() -> RatingsResult<Self> {
        match std::env::var("RATINGS_SERVICE_URL") {
            Ok(url) if url.is_empty() => Err(RatingsError::MissingBaseUrl),
            Ok(url) => Self::new(url, std::env::var("RATINGS_SERVICE_API_KEY").ok()),
            Err(_) => Err(RatingsError::MissingBaseUrl),
        }
    }

    /// Override the retry budget (useful for tests)
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Validate the source list for a sync call
    fn validate_sources(sources: &[String]) -> RatingsResult<()> {
        if sources.is_empty() {
            return Err(RatingsError::InvalidInput(
                "at least one source is required".to_string(),
            ));
        }
        if sources.iter().any(|s| s.trim().is_empty()) {
            return Err(RatingsError::InvalidInput(
                "source slugs cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Execute an operation with retry logic for transient failures
    async fn with_retry<T, F, Fut>(&self, operation: F) -> RatingsResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = RatingsResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay_ms = RETRY_BASE_DELAY_MS * 2u64.pow(attempt);
                    warn!(
                        attempt = attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay_ms,
                        error = %e,
                        "rating service request failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Make a sync request and handle common error cases
    async fn make_request(
        &self,
        path: &str,
        target_id: Uuid,
        sources: &[String],
        force_refresh: bool,
    ) -> RatingsResult<SyncReport> {
        let url = format!("{}/api/v1/{}", self.base_url, path);

        let mut request = self.http_client.post(&url).json(&SyncRequest {
            sources,
            force_refresh,
        });
        if let Some(ref key) = self.api_key {
            request = request.header("X-Api-Key", key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                RatingsError::Timeout
            } else {
                RatingsError::Http(e)
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            warn!("rating service rate limited");
            return Err(RatingsError::RateLimited);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(RatingsError::TargetNotFound(target_id.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            return Err(RatingsError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let raw: RawSyncResponse = serde_json::from_str(&response.text().await?)?;
        if !raw.success {
            return Err(RatingsError::SyncRejected(
                raw.error.unwrap_or_else(|| "unspecified failure".to_string()),
            ));
        }

        Ok(raw.into())
    }

    /// Sync ratings for one series against the given sources
    ///
    /// # Errors
    /// - `RatingsError::InvalidInput` - empty source list
    /// - `RatingsError::TargetNotFound` - the service does not know the series
    /// - `RatingsError::Api` / `RatingsError::Http` - transport or service failure
    #[instrument(skip(self, sources))]
    pub async fn sync_series(
        &self,
        series_id: Uuid,
        sources: &[String],
        force_refresh: bool,
    ) -> RatingsResult<SyncReport> {
        Self::validate_sources(sources)?;

        debug!(series_id = %series_id, source_count = sources.len(), "syncing series ratings");

        let path = format!("sync/series/{}", series_id);
        let report = self
            .with_retry(|| async {
                self.make_request(&path, series_id, sources, force_refresh)
                    .await
            })
            .await?;

        debug!(
            series_id = %series_id,
            has_data = report.has_data,
            unmatched = report.unmatched_sources.len(),
            "series sync finished"
        );

        Ok(report)
    }

    /// Sync ratings for one issue against the given sources
    ///
    /// Same contract as [`sync_series`](Self::sync_series), at issue
    /// granularity.
    #[instrument(skip(self, sources))]
    pub async fn sync_issue(
        &self,
        issue_id: Uuid,
        sources: &[String],
        force_refresh: bool,
    ) -> RatingsResult<SyncReport> {
        Self::validate_sources(sources)?;

        debug!(issue_id = %issue_id, source_count = sources.len(), "syncing issue ratings");

        let path = format!("sync/issue/{}", issue_id);
        let report = self
            .with_retry(|| async {
                self.make_request(&path, issue_id, sources, force_refresh)
                    .await
            })
            .await?;

        debug!(
            issue_id = %issue_id,
            has_data = report.has_data,
            "issue sync finished"
        );

        Ok(report)
    }
}
