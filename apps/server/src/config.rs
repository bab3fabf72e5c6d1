//! Server configuration

use std::env;

use anyhow::{Context, Result};
use halftone_shared_config::{CommonConfig, DatabaseConfig, RatingsConfig, RedisConfig};

use crate::sync::SchedulerConfig;

/// Default checkpoint cadence for series-level jobs.
const DEFAULT_CHECKPOINT_EVERY: u32 = 10;

/// Default checkpoint cadence for issue-level jobs. Issue jobs run many
/// more, cheaper items, so progress is flushed more often.
const DEFAULT_ISSUE_CHECKPOINT_EVERY: u32 = 5;

/// Default retention window for finished jobs, in days.
const DEFAULT_RETENTION_DAYS: i64 = 30;

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Common configuration shared across Halftone crates
    pub common: CommonConfig,

    /// Server port (default: 8570)
    pub port: u16,

    /// Flush job counters to the store every N series-level items
    pub checkpoint_every: u32,

    /// Flush job counters every N issue-level items
    pub issue_checkpoint_every: u32,

    /// Delete terminal jobs older than this many days on cleanup
    pub retention_days: i64,

    /// CORS allowed origins (optional)
    pub cors_allowed_origins: Option<Vec<String>>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let common = CommonConfig::from_env()
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

        Ok(Self {
            common,

            port: env::var("PORT")
                .unwrap_or_else(|_| "8570".to_string())
                .parse()
                .context("Invalid PORT value")?,

            checkpoint_every: env::var("SYNC_CHECKPOINT_EVERY")
                .unwrap_or_else(|_| DEFAULT_CHECKPOINT_EVERY.to_string())
                .parse()
                .context("Invalid SYNC_CHECKPOINT_EVERY value")?,

            issue_checkpoint_every: env::var("SYNC_ISSUE_CHECKPOINT_EVERY")
                .unwrap_or_else(|_| DEFAULT_ISSUE_CHECKPOINT_EVERY.to_string())
                .parse()
                .context("Invalid SYNC_ISSUE_CHECKPOINT_EVERY value")?,

            retention_days: env::var("SYNC_JOB_RETENTION_DAYS")
                .unwrap_or_else(|_| DEFAULT_RETENTION_DAYS.to_string())
                .parse()
                .context("Invalid SYNC_JOB_RETENTION_DAYS value")?,

            cors_allowed_origins: env::var("CORS_ORIGINS").ok().map(|s| {
                s.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            }),
        })
    }

    pub fn database(&self) -> &DatabaseConfig {
        &self.common.database
    }

    pub fn redis(&self) -> &RedisConfig {
        &self.common.redis
    }

    pub fn ratings(&self) -> &RatingsConfig {
        &self.common.ratings
    }

    pub fn is_production(&self) -> bool {
        self.common.environment.is_production()
    }

    /// Scheduler knobs derived from this configuration
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            checkpoint_every: self.checkpoint_every.max(1),
            issue_checkpoint_every: self.issue_checkpoint_every.max(1),
        }
    }
}
