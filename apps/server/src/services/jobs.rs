//! Job service: the write-side API over the rating sync queue
//!
//! Creation enumerates the work item snapshot, persists the job and
//! wakes the scheduler. Cancellation persists the terminal status
//! eagerly, then tells the loop to stop at the next item boundary.

use std::sync::Arc;
use uuid::Uuid;

use chrono::Duration;

use crate::error::{ServerError, ServerResult};
use crate::models::{JobKind, JobStatus, NewJob, RatingJob};
use crate::sync::{ItemEnumerator, JobPubSub, JobStore, SchedulerHandle};

/// Coordinates job creation, cancellation and cleanup.
#[derive(Clone)]
pub struct JobService {
    store: Arc<dyn JobStore>,
    enumerator: ItemEnumerator,
    scheduler: SchedulerHandle,
    pubsub: JobPubSub,
}

impl JobService {
    pub fn new(
        store: Arc<dyn JobStore>,
        enumerator: ItemEnumerator,
        scheduler: SchedulerHandle,
        pubsub: JobPubSub,
    ) -> Self {
        Self {
            store,
            enumerator,
            scheduler,
            pubsub,
        }
    }

    /// Create a new rating sync job and wake the scheduler.
    ///
    /// The work item set is resolved here, exactly once; it is frozen
    /// with the job. A scope that resolves to nothing is rejected.
    pub async fn create(
        &self,
        kind: JobKind,
        target_id: Option<Uuid>,
        sources: Vec<String>,
        force_refresh: bool,
    ) -> ServerResult<RatingJob> {
        if sources.is_empty() {
            return Err(ServerError::ValidationError(
                "at least one rating source must be given".to_string(),
            ));
        }
        if sources.iter().any(|s| s.trim().is_empty()) {
            return Err(ServerError::ValidationError(
                "rating source slugs must not be blank".to_string(),
            ));
        }
        if kind.requires_target() && target_id.is_none() {
            return Err(ServerError::MissingField("target_id"));
        }

        let items = self.enumerator.enumerate(kind, target_id).await?;
        if items.is_empty() {
            return Err(ServerError::NothingToProcess);
        }

        let job = self
            .store
            .create(NewJob {
                kind,
                target_id,
                sources,
                force_refresh,
                items,
            })
            .await?;

        tracing::info!(
            job_id = %job.id,
            kind = %job.kind,
            total_items = job.total_items,
            "Created rating sync job"
        );

        self.scheduler.wake();

        Ok(job)
    }

    pub async fn get(&self, id: Uuid) -> ServerResult<RatingJob> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| ServerError::not_found("job", id.to_string()))
    }

    pub async fn list(&self, status: Option<JobStatus>, limit: i64) -> ServerResult<Vec<RatingJob>> {
        self.store.list(status, limit).await
    }

    /// Cancel a job. Terminal jobs cannot be cancelled.
    ///
    /// The cancelled status is persisted before the loop is notified,
    /// so a pending job is out of the queue the moment this returns
    /// even if the loop is busy elsewhere.
    pub async fn cancel(&self, id: Uuid) -> ServerResult<RatingJob> {
        let job = self.get(id).await?;
        if job.is_terminal() {
            return Err(ServerError::InvalidTransition { status: job.status });
        }

        self.store.mark_cancelled(id).await?;
        self.scheduler.cancel(id);
        self.pubsub.publish_status(id, JobStatus::Cancelled).await;

        tracing::info!(job_id = %id, "Cancelled rating sync job");

        self.get(id).await
    }

    /// Delete terminal jobs older than the retention window.
    pub async fn cleanup(&self, older_than_days: i64) -> ServerResult<u64> {
        if older_than_days < 1 {
            return Err(ServerError::ValidationError(
                "retention window must be at least one day".to_string(),
            ));
        }

        let deleted = self
            .store
            .delete_terminal_older_than(Duration::days(older_than_days))
            .await?;

        if deleted > 0 {
            tracing::info!(deleted, older_than_days, "Cleaned up old rating sync jobs");
        }

        Ok(deleted)
    }

    /// Subscribe to a job's event stream.
    pub async fn subscribe(&self, id: Uuid) -> tokio::sync::broadcast::Receiver<crate::sync::JobEvent> {
        self.pubsub.subscribe(id).await
    }
}
