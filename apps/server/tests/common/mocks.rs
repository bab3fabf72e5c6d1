//! In-memory doubles for the scheduler's seams
//!
//! These run the full scheduler and service stack without Postgres or
//! the ratings service. The store mirrors the repository's semantics:
//! FIFO claims, absolute counter writes, terminal-only deletes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::types::Json;
use tokio::sync::Semaphore;
use uuid::Uuid;

use halftone_ratings_client::{RatingsError, RatingsResult, SyncReport};
use halftone_server::error::{ServerError, ServerResult};
use halftone_server::models::{
    Checkpoint, IssueRecord, JobStatus, NewJob, RatingJob, WorkItem,
};
use halftone_server::sync::{CatalogReader, JobStore, RatingSync};

// =============================================================================
// Job store
// =============================================================================

/// In-memory job store with the same observable behavior as the
/// Postgres repository.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<Vec<RatingJob>>,
    /// Processed counts flushed through `update_counters`, in order.
    counter_writes: Mutex<Vec<(Uuid, i32)>>,
    fail_counter_updates: AtomicBool,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `update_counters` call fail.
    pub fn fail_counter_updates(&self) {
        self.fail_counter_updates.store(true, Ordering::SeqCst);
    }

    /// Processed values flushed for a job, in flush order.
    pub fn flushed_counts(&self, id: Uuid) -> Vec<i32> {
        self.counter_writes
            .lock()
            .unwrap()
            .iter()
            .filter(|(job_id, _)| *job_id == id)
            .map(|(_, processed)| *processed)
            .collect()
    }

    /// Synchronous snapshot of a job row.
    pub fn snapshot(&self, id: Uuid) -> Option<RatingJob> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .find(|j| j.id == id)
            .cloned()
    }

    /// Synchronous cancel, for use inside ratings hooks where the
    /// async trait method is unavailable.
    pub fn cancel_now(&self, id: Uuid) {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.iter_mut().find(|j| j.id == id) {
            if !job.status.is_terminal() {
                job.status = JobStatus::Cancelled;
                job.completed_at = Some(Utc::now());
            }
        }
    }

    /// Seed a job directly in a given status, bypassing validation.
    pub fn seed_job(&self, new_job: NewJob, status: JobStatus) -> RatingJob {
        let mut job = build_job(new_job, status);
        if status.is_terminal() {
            job.completed_at = Some(Utc::now());
        }
        self.jobs.lock().unwrap().push(job.clone());
        job
    }

    /// Shift a job's completion time into the past.
    pub fn age_job(&self, id: Uuid, days: i64) {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.iter_mut().find(|j| j.id == id) {
            job.completed_at = job.completed_at.map(|t| t - Duration::days(days));
        }
    }

    pub fn processing_count(&self) -> usize {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.status == JobStatus::Processing)
            .count()
    }
}

fn build_job(new_job: NewJob, status: JobStatus) -> RatingJob {
    let total = new_job.items.len() as i32;
    RatingJob {
        id: Uuid::new_v4(),
        kind: new_job.kind,
        target_id: new_job.target_id,
        sources: new_job.sources,
        force_refresh: new_job.force_refresh,
        status,
        items: Json(new_job.items),
        total_items: total,
        processed_items: 0,
        success_items: 0,
        failed_items: 0,
        unmatched_items: 0,
        errors: Json(vec![]),
        unmatched_targets: Json(vec![]),
        created_at: Utc::now(),
        started_at: None,
        completed_at: None,
    }
}

fn apply_checkpoint(job: &mut RatingJob, checkpoint: &Checkpoint) {
    job.processed_items = checkpoint.processed;
    job.success_items = checkpoint.success;
    job.failed_items = checkpoint.failed;
    job.unmatched_items = checkpoint.unmatched;
    job.errors = Json(checkpoint.errors.clone());
    job.unmatched_targets = Json(checkpoint.unmatched_targets.clone());
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, new_job: NewJob) -> ServerResult<RatingJob> {
        if new_job.items.is_empty() {
            return Err(ServerError::NothingToProcess);
        }
        Ok(self.seed_job(new_job, JobStatus::Pending))
    }

    async fn get(&self, id: Uuid) -> ServerResult<Option<RatingJob>> {
        Ok(self.snapshot(id))
    }

    async fn claim_oldest_pending(&self) -> ServerResult<Option<RatingJob>> {
        let mut jobs = self.jobs.lock().unwrap();
        // Insertion order is creation order.
        if let Some(job) = jobs.iter_mut().find(|j| j.status == JobStatus::Pending) {
            job.status = JobStatus::Processing;
            job.started_at = Some(Utc::now());
            return Ok(Some(job.clone()));
        }
        Ok(None)
    }

    async fn update_counters(&self, id: Uuid, checkpoint: &Checkpoint) -> ServerResult<()> {
        if self.fail_counter_updates.load(Ordering::SeqCst) {
            return Err(ServerError::Internal(
                "simulated checkpoint write failure".to_string(),
            ));
        }

        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs
            .iter_mut()
            .find(|j| j.id == id && j.status == JobStatus::Processing)
        {
            apply_checkpoint(job, checkpoint);
            self.counter_writes
                .lock()
                .unwrap()
                .push((id, checkpoint.processed));
        }
        Ok(())
    }

    async fn finalize(
        &self,
        id: Uuid,
        status: JobStatus,
        checkpoint: &Checkpoint,
    ) -> ServerResult<bool> {
        let mut jobs = self.jobs.lock().unwrap();
        // Same guard as the repository: terminal statuses are final,
        // except that a cancelled row still takes a cancelled flush.
        if let Some(job) = jobs.iter_mut().find(|j| {
            j.id == id
                && (j.status == JobStatus::Processing
                    || (j.status == JobStatus::Cancelled && status == JobStatus::Cancelled))
        }) {
            apply_checkpoint(job, checkpoint);
            job.status = status;
            job.completed_at = Some(Utc::now());
            return Ok(true);
        }
        Ok(false)
    }

    async fn mark_failed(&self, id: Uuid, message: &str) -> ServerResult<()> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs
            .iter_mut()
            .find(|j| j.id == id && j.status == JobStatus::Processing)
        {
            job.status = JobStatus::Failed;
            job.completed_at = Some(Utc::now());
            job.errors.0.push(message.to_string());
        }
        Ok(())
    }

    async fn mark_cancelled(&self, id: Uuid) -> ServerResult<()> {
        let mut jobs = self.jobs.lock().unwrap();
        match jobs.iter_mut().find(|j| j.id == id) {
            Some(job) if !job.status.is_terminal() => {
                job.status = JobStatus::Cancelled;
                job.completed_at = Some(Utc::now());
                Ok(())
            }
            Some(job) => Err(ServerError::InvalidTransition { status: job.status }),
            None => Err(ServerError::not_found("job", id.to_string())),
        }
    }

    async fn list(&self, status: Option<JobStatus>, limit: i64) -> ServerResult<Vec<RatingJob>> {
        let jobs = self.jobs.lock().unwrap();
        let mut matching: Vec<_> = jobs
            .iter()
            .filter(|j| status.map_or(true, |s| j.status == s))
            .cloned()
            .collect();
        matching.reverse(); // newest first
        matching.truncate(limit as usize);
        Ok(matching)
    }

    async fn reset_interrupted(&self) -> ServerResult<u64> {
        let mut jobs = self.jobs.lock().unwrap();
        let mut requeued = 0;
        for job in jobs.iter_mut().filter(|j| j.status == JobStatus::Processing) {
            job.status = JobStatus::Pending;
            job.started_at = None;
            job.processed_items = 0;
            job.success_items = 0;
            job.failed_items = 0;
            job.unmatched_items = 0;
            job.errors = Json(vec![]);
            job.unmatched_targets = Json(vec![]);
            requeued += 1;
        }
        Ok(requeued)
    }

    async fn delete_terminal_older_than(&self, age: Duration) -> ServerResult<u64> {
        let cutoff = Utc::now() - age;
        let mut jobs = self.jobs.lock().unwrap();
        let before = jobs.len();
        jobs.retain(|j| {
            !(j.status.is_terminal() && j.completed_at.map_or(false, |t| t < cutoff))
        });
        Ok((before - jobs.len()) as u64)
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// In-memory catalog of series and issues.
#[derive(Default)]
pub struct InMemoryCatalog {
    series: Mutex<Vec<(Uuid, String)>>,
    /// (issue id, series id, library id, issue number)
    issues: Mutex<Vec<(Uuid, Uuid, Uuid, Option<String>)>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_series(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.series.lock().unwrap().push((id, name.to_string()));
        id
    }

    pub fn add_issue(&self, series_id: Uuid, library_id: Uuid, number: Option<&str>) -> Uuid {
        let id = Uuid::new_v4();
        self.issues.lock().unwrap().push((
            id,
            series_id,
            library_id,
            number.map(|n| n.to_string()),
        ));
        id
    }

    fn series_name(&self, series_id: Uuid) -> Option<String> {
        self.series
            .lock()
            .unwrap()
            .iter()
            .find(|(id, _)| *id == series_id)
            .map(|(_, name)| name.clone())
    }
}

#[async_trait]
impl CatalogReader for InMemoryCatalog {
    async fn series_item(&self, series_id: Uuid) -> ServerResult<Option<WorkItem>> {
        Ok(self
            .series_name(series_id)
            .map(|name| WorkItem::series(series_id, name)))
    }

    async fn series_in_library(&self, library_id: Uuid) -> ServerResult<Vec<WorkItem>> {
        let issues = self.issues.lock().unwrap();
        let mut series_ids: Vec<Uuid> = issues
            .iter()
            .filter(|(_, _, lib, _)| *lib == library_id)
            .map(|(_, series, _, _)| *series)
            .collect();
        series_ids.dedup();
        drop(issues);

        let mut items: Vec<WorkItem> = series_ids
            .into_iter()
            .filter_map(|id| self.series_name(id).map(|name| WorkItem::series(id, name)))
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        items.dedup_by_key(|item| item.id);
        Ok(items)
    }

    async fn all_series(&self) -> ServerResult<Vec<WorkItem>> {
        let mut items: Vec<WorkItem> = self
            .series
            .lock()
            .unwrap()
            .iter()
            .map(|(id, name)| WorkItem::series(*id, name.clone()))
            .collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(items)
    }

    async fn issues_of_series(&self, series_id: Uuid) -> ServerResult<Vec<IssueRecord>> {
        let series_name = self.series_name(series_id).unwrap_or_default();
        Ok(self
            .issues
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, series, _, _)| *series == series_id)
            .map(|(id, _, _, number)| IssueRecord {
                id: *id,
                series_name: series_name.clone(),
                number: number.clone(),
            })
            .collect())
    }
}

// =============================================================================
// Ratings service
// =============================================================================

/// Per-target outcome for the scripted ratings double.
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    Match,
    Unmatched(Vec<String>),
    Fail(String),
}

type CallHook = Box<dyn Fn(usize) + Send + Sync>;

/// Scripted stand-in for the ratings service client.
///
/// Targets without a scripted outcome match successfully. A gate
/// semaphore can hold calls back, and a hook runs after each call
/// starts (handy for injecting cancellation mid-job).
#[derive(Default)]
pub struct ScriptedRatings {
    outcomes: Mutex<HashMap<Uuid, ScriptedOutcome>>,
    calls: Mutex<Vec<Uuid>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
    on_call: Mutex<Option<CallHook>>,
}

impl ScriptedRatings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, target_id: Uuid, outcome: ScriptedOutcome) {
        self.outcomes.lock().unwrap().insert(target_id, outcome);
    }

    /// Install a gate: every call must acquire one permit first.
    pub fn gated(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Run a hook after each call begins; the argument is the
    /// zero-based call index.
    pub fn on_call(&self, hook: impl Fn(usize) + Send + Sync + 'static) {
        *self.on_call.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn calls(&self) -> Vec<Uuid> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    async fn handle(&self, target_id: Uuid) -> RatingsResult<SyncReport> {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            let permit = gate.acquire().await.expect("gate semaphore closed");
            permit.forget();
        }

        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(target_id);
            calls.len() - 1
        };

        if let Some(hook) = &*self.on_call.lock().unwrap() {
            hook(index);
        }

        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .get(&target_id)
            .cloned()
            .unwrap_or(ScriptedOutcome::Match);

        match outcome {
            ScriptedOutcome::Match => Ok(SyncReport {
                has_data: true,
                unmatched_sources: vec![],
            }),
            ScriptedOutcome::Unmatched(sources) => Ok(SyncReport {
                has_data: false,
                unmatched_sources: sources,
            }),
            ScriptedOutcome::Fail(message) => Err(RatingsError::Api {
                status: 500,
                message,
            }),
        }
    }
}

#[async_trait]
impl RatingSync for ScriptedRatings {
    async fn sync_series(
        &self,
        series_id: Uuid,
        _sources: &[String],
        _force_refresh: bool,
    ) -> RatingsResult<SyncReport> {
        self.handle(series_id).await
    }

    async fn sync_issue(
        &self,
        issue_id: Uuid,
        _sources: &[String],
        _force_refresh: bool,
    ) -> RatingsResult<SyncReport> {
        self.handle(issue_id).await
    }
}
