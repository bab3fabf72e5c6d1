//! Rating sync job model
//!
//! A job is a persisted queue entry: what to sync (the frozen item
//! snapshot), running counters, and the recorded errors / unmatched
//! targets. Counters always satisfy
//! `processed = success + failed + unmatched`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::catalog::WorkItem;

/// Upper bound on recorded error messages per job. Counters keep
/// counting past this; only the detail list is capped.
pub const MAX_RECORDED_ERRORS: usize = 200;

/// Upper bound on recorded unmatched targets per job.
pub const MAX_RECORDED_UNMATCHED: usize = 200;

/// Lifecycle state of a rating sync job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "rating_job_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Terminal statuses never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

/// What scope of the catalog a job covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "rating_job_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// One series.
    Series,
    /// Every series with at least one issue in a library.
    Library,
    /// Every series in the catalog.
    Catalog,
    /// Every numbered issue of one series.
    Issues,
}

impl JobKind {
    /// Whether the kind needs a target id (series or library).
    pub fn requires_target(&self) -> bool {
        !matches!(self, Self::Catalog)
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Series => "series",
            Self::Library => "library",
            Self::Catalog => "catalog",
            Self::Issues => "issues",
        };
        write!(f, "{}", s)
    }
}

/// A target no rating source could match, kept for operator review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmatchedTarget {
    pub id: Uuid,
    pub name: String,
}

/// Parameters for creating a new job. The item snapshot must already be
/// enumerated; the store rejects an empty one.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub kind: JobKind,
    pub target_id: Option<Uuid>,
    pub sources: Vec<String>,
    pub force_refresh: bool,
    pub items: Vec<WorkItem>,
}

/// A persisted rating sync job.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RatingJob {
    pub id: Uuid,
    pub kind: JobKind,
    pub target_id: Option<Uuid>,
    pub sources: Vec<String>,
    pub force_refresh: bool,
    pub status: JobStatus,
    /// Frozen work item snapshot. Not serialized in API responses,
    /// which only expose the counters.
    #[serde(skip_serializing)]
    pub items: Json<Vec<WorkItem>>,
    pub total_items: i32,
    pub processed_items: i32,
    pub success_items: i32,
    pub failed_items: i32,
    pub unmatched_items: i32,
    pub errors: Json<Vec<String>>,
    pub unmatched_targets: Json<Vec<UnmatchedTarget>>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RatingJob {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Counter consistency: processed must equal the outcome sum and
    /// never exceed the frozen total.
    pub fn counters_consistent(&self) -> bool {
        self.processed_items == self.success_items + self.failed_items + self.unmatched_items
            && self.processed_items <= self.total_items
    }

    pub fn summary(&self) -> CompletionSummary {
        CompletionSummary {
            status: self.status,
            total_items: self.total_items,
            processed_items: self.processed_items,
            success_items: self.success_items,
            failed_items: self.failed_items,
            unmatched_items: self.unmatched_items,
            unmatched_targets: self.unmatched_targets.0.clone(),
        }
    }
}

/// Final counters for a finished job, published with the completion event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionSummary {
    pub status: JobStatus,
    pub total_items: i32,
    pub processed_items: i32,
    pub success_items: i32,
    pub failed_items: i32,
    pub unmatched_items: i32,
    pub unmatched_targets: Vec<UnmatchedTarget>,
}

/// In-memory progress accumulator for the worker loop.
///
/// The loop records one outcome per item and periodically flushes the
/// whole snapshot to the store (absolute values, not deltas), so a
/// checkpoint write is idempotent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Checkpoint {
    pub processed: i32,
    pub success: i32,
    pub failed: i32,
    pub unmatched: i32,
    pub errors: Vec<String>,
    pub unmatched_targets: Vec<UnmatchedTarget>,
}

impl Checkpoint {
    pub fn record_success(&mut self) {
        self.processed += 1;
        self.success += 1;
    }

    pub fn record_failure(&mut self, message: String) {
        self.processed += 1;
        self.failed += 1;
        if self.errors.len() < MAX_RECORDED_ERRORS {
            self.errors.push(message);
        }
    }

    pub fn record_unmatched(&mut self, item: &WorkItem) {
        self.processed += 1;
        self.unmatched += 1;
        if self.unmatched_targets.len() < MAX_RECORDED_UNMATCHED {
            self.unmatched_targets.push(UnmatchedTarget {
                id: item.id,
                name: item.name.clone(),
            });
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.processed == self.success + self.failed + self.unmatched
    }

    pub fn summary_for(&self, job: &RatingJob, status: JobStatus) -> CompletionSummary {
        CompletionSummary {
            status,
            total_items: job.total_items,
            processed_items: self.processed,
            success_items: self.success,
            failed_items: self.failed,
            unmatched_items: self.unmatched,
            unmatched_targets: self.unmatched_targets.clone(),
        }
    }
}
