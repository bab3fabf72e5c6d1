//! Per-item processing
//!
//! Runs one work item against the ratings service and classifies the
//! result. A failing item never fails the job: the outcome is recorded
//! and the loop moves on.

use std::sync::Arc;

use crate::models::{ItemKind, RatingJob, WorkItem};

use super::RatingSync;

/// Classification of a single processed item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// At least one source returned rating data.
    Success,
    /// The call succeeded but no source matched the target.
    Unmatched(Vec<String>),
    /// The call failed; the message is recorded with the job.
    Failed(String),
}

/// Processes work items against the ratings service.
#[derive(Clone)]
pub struct ItemProcessor {
    ratings: Arc<dyn RatingSync>,
}

impl ItemProcessor {
    pub fn new(ratings: Arc<dyn RatingSync>) -> Self {
        Self { ratings }
    }

    /// Process one item. Never returns an error; failures are folded
    /// into the outcome.
    pub async fn process(&self, item: &WorkItem, job: &RatingJob) -> ItemOutcome {
        let result = match item.kind {
            ItemKind::Series => {
                self.ratings
                    .sync_series(item.id, &job.sources, job.force_refresh)
                    .await
            }
            ItemKind::Issue => {
                self.ratings
                    .sync_issue(item.id, &job.sources, job.force_refresh)
                    .await
            }
        };

        match result {
            Ok(report) if report.has_data => ItemOutcome::Success,
            Ok(report) => {
                tracing::debug!(
                    item = %item.name,
                    sources = ?report.unmatched_sources,
                    "No rating source matched"
                );
                ItemOutcome::Unmatched(report.unmatched_sources)
            }
            Err(e) => {
                tracing::warn!(item = %item.name, error = %e, "Rating sync failed for item");
                ItemOutcome::Failed(format!("{}: {}", item.name, e))
            }
        }
    }
}
