//! Job repository: the persistent rating sync queue
//!
//! All job state lives in the `rating_sync_jobs` table. The repository
//! implements the `JobStore` trait so the scheduler and service layers
//! can run against an in-memory double in tests.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{ServerError, ServerResult};
use crate::models::{Checkpoint, JobStatus, NewJob, RatingJob};
use crate::sync::JobStore;

/// Column list shared by every query that returns a full job row.
const JOB_COLUMNS: &str = "id, kind, target_id, sources, force_refresh, status, items, \
     total_items, processed_items, success_items, failed_items, unmatched_items, \
     errors, unmatched_targets, created_at, started_at, completed_at";

/// Repository for rating sync job database operations
#[derive(Clone)]
pub struct JobRepository {
    pool: PgPool,
}

impl JobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for JobRepository {
    async fn create(&self, new_job: NewJob) -> ServerResult<RatingJob> {
        if new_job.items.is_empty() {
            return Err(ServerError::NothingToProcess);
        }

        let total = new_job.items.len() as i32;
        let sql = format!(
            "INSERT INTO rating_sync_jobs \
                 (kind, target_id, sources, force_refresh, items, total_items) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {}",
            JOB_COLUMNS
        );

        let job = sqlx::query_as::<_, RatingJob>(&sql)
            .bind(new_job.kind)
            .bind(new_job.target_id)
            .bind(&new_job.sources)
            .bind(new_job.force_refresh)
            .bind(Json(&new_job.items))
            .bind(total)
            .fetch_one(&self.pool)
            .await?;

        Ok(job)
    }

    async fn get(&self, id: Uuid) -> ServerResult<Option<RatingJob>> {
        let sql = format!("SELECT {} FROM rating_sync_jobs WHERE id = $1", JOB_COLUMNS);
        let job = sqlx::query_as::<_, RatingJob>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    /// Atomically claim the oldest pending job, moving it to `processing`.
    ///
    /// The claim is a single UPDATE over a locked subselect, so two loops
    /// racing on the same database can never claim the same job.
    async fn claim_oldest_pending(&self) -> ServerResult<Option<RatingJob>> {
        let sql = format!(
            "UPDATE rating_sync_jobs \
             SET status = 'processing', started_at = NOW() \
             WHERE id = ( \
                 SELECT id FROM rating_sync_jobs \
                 WHERE status = 'pending' \
                 ORDER BY created_at ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {}",
            JOB_COLUMNS
        );

        let job = sqlx::query_as::<_, RatingJob>(&sql)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    /// Flush counters to the job row. Values are absolute, so repeating
    /// the same checkpoint write is harmless. A job that stopped being
    /// `processing` (cancelled concurrently) is left alone.
    async fn update_counters(&self, id: Uuid, checkpoint: &Checkpoint) -> ServerResult<()> {
        sqlx::query(
            "UPDATE rating_sync_jobs \
             SET processed_items = $2, success_items = $3, failed_items = $4, \
                 unmatched_items = $5, errors = $6, unmatched_targets = $7 \
             WHERE id = $1 AND status = 'processing'",
        )
        .bind(id)
        .bind(checkpoint.processed)
        .bind(checkpoint.success)
        .bind(checkpoint.failed)
        .bind(checkpoint.unmatched)
        .bind(Json(&checkpoint.errors))
        .bind(Json(&checkpoint.unmatched_targets))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Terminal statuses are final. The guard only lets a `processing`
    /// row move, plus one exception: finalizing as `cancelled` may
    /// flush counters onto a row the service already cancelled.
    async fn finalize(
        &self,
        id: Uuid,
        status: JobStatus,
        checkpoint: &Checkpoint,
    ) -> ServerResult<bool> {
        let result = sqlx::query(
            "UPDATE rating_sync_jobs \
             SET status = $2, completed_at = NOW(), \
                 processed_items = $3, success_items = $4, failed_items = $5, \
                 unmatched_items = $6, errors = $7, unmatched_targets = $8 \
             WHERE id = $1 \
               AND (status = 'processing' \
                    OR (status = 'cancelled' AND $2 = 'cancelled'))",
        )
        .bind(id)
        .bind(status)
        .bind(checkpoint.processed)
        .bind(checkpoint.success)
        .bind(checkpoint.failed)
        .bind(checkpoint.unmatched)
        .bind(Json(&checkpoint.errors))
        .bind(Json(&checkpoint.unmatched_targets))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark a job failed with a top-level error message, leaving
    /// counters at their last flushed values. A row the service
    /// cancelled in the meantime stays cancelled.
    async fn mark_failed(&self, id: Uuid, message: &str) -> ServerResult<()> {
        sqlx::query(
            "UPDATE rating_sync_jobs \
             SET status = 'failed', completed_at = NOW(), \
                 errors = errors || jsonb_build_array($2::text) \
             WHERE id = $1 AND status = 'processing'",
        )
        .bind(id)
        .bind(message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Persist cancellation eagerly. Only non-terminal jobs can be
    /// cancelled; a cancelled pending job is never claimed.
    async fn mark_cancelled(&self, id: Uuid) -> ServerResult<()> {
        let result = sqlx::query(
            "UPDATE rating_sync_jobs \
             SET status = 'cancelled', completed_at = NOW() \
             WHERE id = $1 AND status IN ('pending', 'processing')",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Distinguish a missing job from one that reached a
            // terminal status between the service's check and here.
            return match self.get(id).await? {
                Some(job) => Err(ServerError::InvalidTransition { status: job.status }),
                None => Err(ServerError::not_found("job", id.to_string())),
            };
        }

        Ok(())
    }

    async fn list(&self, status: Option<JobStatus>, limit: i64) -> ServerResult<Vec<RatingJob>> {
        let sql = format!(
            "SELECT {} FROM rating_sync_jobs \
             WHERE ($1::rating_job_status IS NULL OR status = $1) \
             ORDER BY created_at DESC \
             LIMIT $2",
            JOB_COLUMNS
        );

        let jobs = sqlx::query_as::<_, RatingJob>(&sql)
            .bind(status)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(jobs)
    }

    /// Requeue jobs interrupted by an unclean shutdown. Counters are
    /// zeroed so the rerun starts from item zero.
    async fn reset_interrupted(&self) -> ServerResult<u64> {
        let result = sqlx::query(
            "UPDATE rating_sync_jobs \
             SET status = 'pending', started_at = NULL, \
                 processed_items = 0, success_items = 0, failed_items = 0, \
                 unmatched_items = 0, errors = '[]'::jsonb, \
                 unmatched_targets = '[]'::jsonb \
             WHERE status = 'processing'",
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Delete terminal jobs whose completion is older than `age`.
    async fn delete_terminal_older_than(&self, age: Duration) -> ServerResult<u64> {
        let cutoff = Utc::now() - age;
        let result = sqlx::query(
            "DELETE FROM rating_sync_jobs \
             WHERE status IN ('completed', 'failed', 'cancelled') \
               AND completed_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
