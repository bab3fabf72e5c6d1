//! Rating-sync service configuration types

use crate::{get_env_or_default, parse_env, ConfigError, ConfigResult};

/// Configuration for the external rating-sync service
///
/// The rating service is the collaborator that does the actual scraping and
/// matching against community/critic rating sources. Halftone only talks to
/// it over HTTP.
#[derive(Debug, Clone)]
pub struct RatingsConfig {
    /// Rating service base URL
    pub url: String,

    /// Optional API key sent as `X-Api-Key`
    pub api_key: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Maximum retry attempts for transient failures
    pub max_retries: u32,
}

impl RatingsConfig {
    /// Load rating service configuration from environment variables
    pub fn from_env() -> ConfigResult<Self> {
        let url = get_env_or_default("RATINGS_SERVICE_URL", "http://localhost:8780");

        if url.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "RATINGS_SERVICE_URL".to_string(),
                "URL cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            url,
            api_key: std::env::var("RATINGS_SERVICE_API_KEY")
                .ok()
                .filter(|s| !s.is_empty()),
            timeout_secs: parse_env("RATINGS_SERVICE_TIMEOUT", 30)?,
            max_retries: parse_env("RATINGS_SERVICE_MAX_RETRIES", 3)?,
        })
    }

    /// Create a configuration with a custom URL (useful for testing)
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: None,
            timeout_secs: 30,
            max_retries: 3,
        }
    }

    /// Get the full URL for an API endpoint
    pub fn api_url(&self, path: &str) -> String {
        let base = self.url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{}/api/v1/{}", base, path)
    }
}
