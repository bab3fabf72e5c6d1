//! The rating sync scheduler loop
//!
//! A single background task owns all job execution. It drains the
//! pending queue oldest-first, processes one job at a time, and idles
//! until a command wakes it. At most one job is ever `processing`.
//!
//! Cancellation is cooperative: the service persists the cancelled
//! status eagerly, then sends a command that the loop observes at the
//! next item boundary. The item in flight is allowed to finish.

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::models::{Checkpoint, JobKind, JobStatus, RatingJob};

use super::processor::{ItemOutcome, ItemProcessor};
use super::progress::JobPubSub;
use super::{JobStore, RatingSync};

/// Commands accepted by the scheduler loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerCommand {
    /// A job was created; re-check the queue.
    Wake,
    /// A job was cancelled; stop it if it is the one running.
    Cancel(Uuid),
}

/// Scheduler tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Flush counters every N items for series-level jobs.
    pub checkpoint_every: u32,
    /// Flush counters every N items for issue-level jobs.
    pub issue_checkpoint_every: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            checkpoint_every: 10,
            issue_checkpoint_every: 5,
        }
    }
}

impl SchedulerConfig {
    fn cadence_for(&self, kind: JobKind) -> u32 {
        let every = match kind {
            JobKind::Issues => self.issue_checkpoint_every,
            _ => self.checkpoint_every,
        };
        every.max(1)
    }
}

/// Handle for talking to the scheduler loop. Cheap to clone.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<SchedulerCommand>,
    active: watch::Receiver<Option<Uuid>>,
}

impl SchedulerHandle {
    /// Tell the loop to re-check the pending queue.
    pub fn wake(&self) {
        let _ = self.tx.send(SchedulerCommand::Wake);
    }

    /// Ask the loop to stop a job at the next item boundary.
    pub fn cancel(&self, job_id: Uuid) {
        let _ = self.tx.send(SchedulerCommand::Cancel(job_id));
    }

    /// Id of the job currently being processed, if any.
    pub fn active_job(&self) -> Option<Uuid> {
        *self.active.borrow()
    }
}

/// The scheduler itself. Constructed once at startup.
pub struct SyncScheduler {
    store: Arc<dyn JobStore>,
    processor: ItemProcessor,
    pubsub: JobPubSub,
    config: SchedulerConfig,
}

impl SyncScheduler {
    pub fn new(
        store: Arc<dyn JobStore>,
        ratings: Arc<dyn RatingSync>,
        pubsub: JobPubSub,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            processor: ItemProcessor::new(ratings),
            pubsub,
            config,
        }
    }

    /// Spawn the loop onto the runtime and return its handle.
    ///
    /// The loop drains the queue immediately, so jobs requeued by crash
    /// recovery start without an explicit wake.
    pub fn spawn(self) -> SchedulerHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let (active_tx, active_rx) = watch::channel(None);

        tokio::spawn(self.run(rx, active_tx));

        SchedulerHandle {
            tx,
            active: active_rx,
        }
    }

    async fn run(
        self,
        mut rx: mpsc::UnboundedReceiver<SchedulerCommand>,
        active_tx: watch::Sender<Option<Uuid>>,
    ) {
        tracing::info!("Rating sync scheduler started");

        loop {
            // Drain the pending queue oldest-first.
            loop {
                match self.store.claim_oldest_pending().await {
                    Ok(Some(job)) => {
                        self.process_job(job, &mut rx, &active_tx).await;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to claim next pending job");
                        break;
                    }
                }
            }

            // Idle until someone wakes us. Stale cancel commands for
            // jobs that already finished just trigger a harmless
            // re-check of the queue.
            match rx.recv().await {
                Some(_) => continue,
                None => {
                    tracing::info!("All scheduler handles dropped, stopping");
                    break;
                }
            }
        }
    }

    async fn process_job(
        &self,
        job: RatingJob,
        rx: &mut mpsc::UnboundedReceiver<SchedulerCommand>,
        active_tx: &watch::Sender<Option<Uuid>>,
    ) {
        let _ = active_tx.send(Some(job.id));

        tracing::info!(
            job_id = %job.id,
            kind = %job.kind,
            total_items = job.total_items,
            "Starting rating sync job"
        );
        self.pubsub
            .publish_status(job.id, JobStatus::Processing)
            .await;

        let cadence = self.config.cadence_for(job.kind);
        let mut checkpoint = Checkpoint::default();
        let mut cancelled = false;
        let mut store_failure: Option<String> = None;

        for item in job.items.iter() {
            if drain_commands(rx, job.id) {
                cancelled = true;
            }
            if cancelled {
                break;
            }

            match self.processor.process(item, &job).await {
                ItemOutcome::Success => checkpoint.record_success(),
                ItemOutcome::Unmatched(_) => checkpoint.record_unmatched(item),
                ItemOutcome::Failed(message) => checkpoint.record_failure(message),
            }

            self.pubsub
                .publish_progress(
                    job.id,
                    checkpoint.processed,
                    job.total_items,
                    format!("Synced {}", item.name),
                )
                .await;

            if checkpoint.processed % cadence as i32 == 0 {
                if let Err(e) = self.store.update_counters(job.id, &checkpoint).await {
                    store_failure = Some(format!("checkpoint write failed: {}", e));
                    break;
                }
            }
        }

        // A cancel sent while the last item was in flight still counts.
        if drain_commands(rx, job.id) {
            cancelled = true;
        }

        if let Some(message) = store_failure {
            self.fail_job(&job, message).await;
        } else {
            let status = if cancelled {
                JobStatus::Cancelled
            } else {
                JobStatus::Completed
            };
            self.finish_job(&job, status, &checkpoint).await;
        }

        let _ = active_tx.send(None);
    }

    async fn finish_job(&self, job: &RatingJob, status: JobStatus, checkpoint: &Checkpoint) {
        let mut status = status;
        match self.store.finalize(job.id, status, checkpoint).await {
            Ok(true) => {}
            Ok(false) => {
                // A cancellation was persisted after the last boundary
                // check. The row already says cancelled; flush the
                // final counters onto it and report it as such.
                tracing::info!(job_id = %job.id, "Job was cancelled while finishing");
                status = JobStatus::Cancelled;
                if let Err(e) = self.store.finalize(job.id, status, checkpoint).await {
                    self.fail_job(job, format!("finalize failed: {}", e)).await;
                    return;
                }
            }
            Err(e) => {
                self.fail_job(job, format!("finalize failed: {}", e)).await;
                return;
            }
        }

        tracing::info!(
            job_id = %job.id,
            status = %status,
            processed = checkpoint.processed,
            success = checkpoint.success,
            failed = checkpoint.failed,
            unmatched = checkpoint.unmatched,
            "Rating sync job finished"
        );
        self.pubsub.publish_status(job.id, status).await;
        self.pubsub
            .publish_completion(job.id, checkpoint.summary_for(job, status))
            .await;
    }

    async fn fail_job(&self, job: &RatingJob, message: String) {
        tracing::error!(job_id = %job.id, error = %message, "Rating sync job failed");

        if let Err(e) = self.store.mark_failed(job.id, &message).await {
            tracing::error!(
                job_id = %job.id,
                error = %e,
                "Could not persist job failure; the job will be requeued on restart"
            );
        }

        self.pubsub.publish_status(job.id, JobStatus::Failed).await;
        self.pubsub.publish_error(job.id, message).await;
    }
}

/// Drain all queued commands without blocking; true when a cancel for
/// this job was among them.
fn drain_commands(rx: &mut mpsc::UnboundedReceiver<SchedulerCommand>, job_id: Uuid) -> bool {
    let mut cancelled = false;
    while let Ok(command) = rx.try_recv() {
        match command {
            SchedulerCommand::Cancel(id) if id == job_id => cancelled = true,
            // A cancel for another job was already persisted by the
            // service; a pending job that got cancelled is simply
            // never claimed.
            SchedulerCommand::Cancel(_) => {}
            // The queue is re-checked after this job anyway.
            SchedulerCommand::Wake => {}
        }
    }
    cancelled
}
