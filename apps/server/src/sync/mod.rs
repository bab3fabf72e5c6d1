//! Rating synchronization pipeline
//!
//! Jobs are created through [`crate::services::JobService`], persisted
//! by a [`JobStore`], and drained oldest-first by the single scheduler
//! loop in [`scheduler`]. Progress is published over [`progress::JobPubSub`].

pub mod enumerator;
pub mod processor;
pub mod progress;
pub mod recovery;
pub mod scheduler;

pub use enumerator::ItemEnumerator;
pub use processor::{ItemOutcome, ItemProcessor};
pub use progress::{JobEvent, JobPubSub};
pub use recovery::recover_interrupted;
pub use scheduler::{SchedulerConfig, SchedulerHandle, SyncScheduler};

use async_trait::async_trait;
use chrono::Duration;
use uuid::Uuid;

use halftone_ratings_client::{RatingsClient, RatingsResult, SyncReport};

use crate::error::ServerResult;
use crate::models::{Checkpoint, IssueRecord, JobStatus, NewJob, RatingJob, WorkItem};

/// Persistence seam for the job queue.
///
/// Production code uses [`crate::repositories::JobRepository`]; tests
/// run the scheduler against an in-memory double.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new pending job with its frozen item snapshot.
    async fn create(&self, new_job: NewJob) -> ServerResult<RatingJob>;

    async fn get(&self, id: Uuid) -> ServerResult<Option<RatingJob>>;

    /// Atomically move the oldest pending job to `processing` and return it.
    async fn claim_oldest_pending(&self) -> ServerResult<Option<RatingJob>>;

    /// Overwrite counters and detail lists with the checkpoint's values.
    /// Only `processing` jobs are touched; a job cancelled in the
    /// meantime keeps its row as the service wrote it.
    async fn update_counters(&self, id: Uuid, checkpoint: &Checkpoint) -> ServerResult<()>;

    /// Write final counters, the terminal status and the completion time.
    ///
    /// Terminal statuses are final: the write only applies to a
    /// `processing` job (or flushes counters onto an already-cancelled
    /// row when `status` is itself `cancelled`). Returns `false` when
    /// the row was left untouched because a cancellation won the race.
    async fn finalize(&self, id: Uuid, status: JobStatus, checkpoint: &Checkpoint)
        -> ServerResult<bool>;

    /// Mark a job failed with a top-level error, keeping the counters
    /// at their last flushed values.
    async fn mark_failed(&self, id: Uuid, message: &str) -> ServerResult<()>;

    /// Persist cancellation for a non-terminal job.
    async fn mark_cancelled(&self, id: Uuid) -> ServerResult<()>;

    async fn list(&self, status: Option<JobStatus>, limit: i64) -> ServerResult<Vec<RatingJob>>;

    /// Requeue `processing` jobs after an unclean shutdown, zeroing counters.
    async fn reset_interrupted(&self) -> ServerResult<u64>;

    /// Delete terminal jobs whose completion is older than `age`.
    async fn delete_terminal_older_than(&self, age: Duration) -> ServerResult<u64>;
}

/// Read seam over the catalog for work item enumeration.
#[async_trait]
pub trait CatalogReader: Send + Sync {
    async fn series_item(&self, series_id: Uuid) -> ServerResult<Option<WorkItem>>;
    async fn series_in_library(&self, library_id: Uuid) -> ServerResult<Vec<WorkItem>>;
    async fn all_series(&self) -> ServerResult<Vec<WorkItem>>;
    async fn issues_of_series(&self, series_id: Uuid) -> ServerResult<Vec<IssueRecord>>;
}

/// Seam over the external ratings service.
#[async_trait]
pub trait RatingSync: Send + Sync {
    async fn sync_series(
        &self,
        series_id: Uuid,
        sources: &[String],
        force_refresh: bool,
    ) -> RatingsResult<SyncReport>;

    async fn sync_issue(
        &self,
        issue_id: Uuid,
        sources: &[String],
        force_refresh: bool,
    ) -> RatingsResult<SyncReport>;
}

#[async_trait]
impl RatingSync for RatingsClient {
    async fn sync_series(
        &self,
        series_id: Uuid,
        sources: &[String],
        force_refresh: bool,
    ) -> RatingsResult<SyncReport> {
        RatingsClient::sync_series(self, series_id, sources, force_refresh).await
    }

    async fn sync_issue(
        &self,
        issue_id: Uuid,
        sources: &[String],
        force_refresh: bool,
    ) -> RatingsResult<SyncReport> {
        RatingsClient::sync_issue(self, issue_id, sources, force_refresh).await
    }
}
