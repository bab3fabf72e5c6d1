//! Mock rating-sync service for tests
//!
//! Mimics the HTTP surface of the external rating service:
//! `POST /api/v1/sync/series/{id}` and `POST /api/v1/sync/issue/{id}`.

use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mock rating service server
pub struct MockRatingsServer {
    server: MockServer,
    api_key: Option<String>,
}

impl MockRatingsServer {
    /// Start a new mock rating service without an API key
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
            api_key: None,
        }
    }

    /// Start a new mock rating service that requires an API key
    pub async fn start_with_api_key(api_key: &str) -> Self {
        Self {
            server: MockServer::start().await,
            api_key: Some(api_key.to_string()),
        }
    }

    /// Get the server URL
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Get the API key, if any
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    /// Get a reference to the underlying mock server for custom setups
    pub fn inner(&self) -> &MockServer {
        &self.server
    }

    fn apply_key(&self, mock: wiremock::MockBuilder) -> wiremock::MockBuilder {
        match &self.api_key {
            Some(key) => mock.and(header("X-Api-Key", key.as_str())),
            None => mock,
        }
    }

    /// Mount a catch-all mock answering every sync call with a match
    pub async fn mock_sync_matched(&self) {
        self.apply_key(
            Mock::given(method("POST")).and(path_regex(r"^/api/v1/sync/(series|issue)/.+$")),
        )
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "hasData": true,
            "unmatchedSources": []
        })))
        .mount(&self.server)
        .await;
    }

    /// Mount a catch-all mock answering every sync call with "no source matched"
    pub async fn mock_sync_unmatched(&self, unmatched_sources: &[&str]) {
        self.apply_key(
            Mock::given(method("POST")).and(path_regex(r"^/api/v1/sync/(series|issue)/.+$")),
        )
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "hasData": false,
            "unmatchedSources": unmatched_sources
        })))
        .mount(&self.server)
        .await;
    }

    /// Mount a mock for one specific series
    pub async fn mock_series(&self, series_id: Uuid, has_data: bool, unmatched: &[&str]) {
        self.apply_key(
            Mock::given(method("POST")).and(path(format!("/api/v1/sync/series/{}", series_id))),
        )
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "hasData": has_data,
            "unmatchedSources": unmatched
        })))
        .mount(&self.server)
        .await;
    }

    /// Mount a mock for one specific issue
    pub async fn mock_issue(&self, issue_id: Uuid, has_data: bool) {
        self.apply_key(
            Mock::given(method("POST")).and(path(format!("/api/v1/sync/issue/{}", issue_id))),
        )
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "hasData": has_data,
            "unmatchedSources": []
        })))
        .mount(&self.server)
        .await;
    }

    /// Mount a mock returning a service-level failure payload
    pub async fn mock_sync_rejected(&self, error_message: &str) {
        self.apply_key(
            Mock::given(method("POST")).and(path_regex(r"^/api/v1/sync/(series|issue)/.+$")),
        )
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "hasData": false,
            "unmatchedSources": [],
            "error": error_message
        })))
        .mount(&self.server)
        .await;
    }

    /// Mount a mock returning an HTTP error status
    pub async fn mock_sync_error(&self, status_code: u16, error_message: &str) {
        self.apply_key(
            Mock::given(method("POST")).and(path_regex(r"^/api/v1/sync/(series|issue)/.+$")),
        )
        .respond_with(ResponseTemplate::new(status_code).set_body_json(json!({
            "error": error_message
        })))
        .mount(&self.server)
        .await;
    }

    /// Mount a mock for an unknown target
    pub async fn mock_target_not_found(&self, target_id: Uuid) {
        self.apply_key(Mock::given(method("POST")).and(path_regex(format!(
            r"^/api/v1/sync/(series|issue)/{}$",
            target_id
        ))))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": "unknown target"
        })))
        .mount(&self.server)
        .await;
    }

    /// Mount a mock for rate limiting
    pub async fn mock_rate_limit(&self) {
        self.apply_key(
            Mock::given(method("POST")).and(path_regex(r"^/api/v1/sync/(series|issue)/.+$")),
        )
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("Retry-After", "60")
                .set_body_json(json!({
                    "error": "rate limit exceeded"
                })),
        )
        .mount(&self.server)
        .await;
    }

    /// Mount a mock with a delayed response
    pub async fn mock_slow_response(&self, delay_ms: u64) {
        self.apply_key(
            Mock::given(method("POST")).and(path_regex(r"^/api/v1/sync/(series|issue)/.+$")),
        )
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(std::time::Duration::from_millis(delay_ms))
                .set_body_json(json!({
                    "success": true,
                    "hasData": true,
                    "unmatchedSources": []
                })),
        )
        .mount(&self.server)
        .await;
    }
}
