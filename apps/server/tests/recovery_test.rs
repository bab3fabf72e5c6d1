//! Integration tests for crash recovery
//!
//! A job left in `processing` by an unclean shutdown is requeued as
//! `pending` with zeroed counters and reruns its whole frozen snapshot.

mod common;

use common::{wait_for_terminal, InMemoryJobStore, TestHarness};
use halftone_server::models::{Checkpoint, JobKind, JobStatus, NewJob, WorkItem};
use halftone_server::sync::{recover_interrupted, JobStore};
use uuid::Uuid;

fn three_series_job() -> NewJob {
    NewJob {
        kind: JobKind::Library,
        target_id: Some(Uuid::new_v4()),
        sources: vec!["anilist".to_string()],
        force_refresh: false,
        items: vec![
            WorkItem::series(Uuid::new_v4(), "Akira"),
            WorkItem::series(Uuid::new_v4(), "Blame!"),
            WorkItem::series(Uuid::new_v4(), "Dorohedoro"),
        ],
    }
}

#[tokio::test]
async fn recovery_requeues_processing_jobs_with_zeroed_counters() {
    let store = InMemoryJobStore::new();

    // A job mid-flight at crash time: claimed, two items flushed.
    let job = store.create(three_series_job()).await.unwrap();
    store.claim_oldest_pending().await.unwrap().unwrap();
    let mut checkpoint = Checkpoint::default();
    checkpoint.record_success();
    checkpoint.record_failure("transient".to_string());
    store.update_counters(job.id, &checkpoint).await.unwrap();

    // A finished job must not be touched.
    let done = store.seed_job(three_series_job(), JobStatus::Completed);

    let requeued = recover_interrupted(&store).await.unwrap();
    assert_eq!(requeued, 1);

    let recovered = store.snapshot(job.id).unwrap();
    assert_eq!(recovered.status, JobStatus::Pending);
    assert_eq!(recovered.processed_items, 0);
    assert_eq!(recovered.success_items, 0);
    assert_eq!(recovered.failed_items, 0);
    assert_eq!(recovered.unmatched_items, 0);
    assert!(recovered.errors.0.is_empty());
    assert!(recovered.started_at.is_none());
    // The snapshot itself is untouched.
    assert_eq!(recovered.total_items, 3);
    assert_eq!(recovered.items.0.len(), 3);

    assert_eq!(
        store.snapshot(done.id).unwrap().status,
        JobStatus::Completed
    );
}

#[tokio::test]
async fn recovery_is_a_noop_without_interrupted_jobs() {
    let store = InMemoryJobStore::new();
    store.seed_job(three_series_job(), JobStatus::Pending);
    store.seed_job(three_series_job(), JobStatus::Failed);

    let requeued = recover_interrupted(&store).await.unwrap();
    assert_eq!(requeued, 0);
}

#[tokio::test]
async fn requeued_job_reprocesses_the_entire_snapshot() {
    let harness = TestHarness::new();

    // Simulates the post-recovery state: a pending job whose snapshot
    // was frozen before the restart.
    let job = harness
        .store
        .seed_job(three_series_job(), JobStatus::Pending);
    harness.scheduler.wake();

    let finished = wait_for_terminal(&harness.store, job.id).await;

    assert_eq!(finished.status, JobStatus::Completed);
    assert_eq!(finished.processed_items, 3);
    assert_eq!(finished.success_items, 3);
    assert_eq!(harness.ratings.call_count(), 3);
}
