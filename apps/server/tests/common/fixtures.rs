//! Test harness wiring the scheduler stack to in-memory doubles

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use halftone_server::models::RatingJob;
use halftone_server::services::JobService;
use halftone_server::sync::{
    ItemEnumerator, JobPubSub, JobStore, SchedulerConfig, SchedulerHandle, SyncScheduler,
};

use super::mocks::{InMemoryCatalog, InMemoryJobStore, ScriptedRatings};

/// The whole scheduler stack on in-memory doubles.
pub struct TestHarness {
    pub store: Arc<InMemoryJobStore>,
    pub catalog: Arc<InMemoryCatalog>,
    pub ratings: Arc<ScriptedRatings>,
    pub pubsub: JobPubSub,
    pub scheduler: SchedulerHandle,
    pub service: JobService,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        let store = Arc::new(InMemoryJobStore::new());
        let catalog = Arc::new(InMemoryCatalog::new());
        let ratings = Arc::new(ScriptedRatings::new());
        let pubsub = JobPubSub::new_in_memory();

        let scheduler = SyncScheduler::new(
            store.clone() as Arc<dyn JobStore>,
            ratings.clone(),
            pubsub.clone(),
            config,
        )
        .spawn();

        let service = JobService::new(
            store.clone() as Arc<dyn JobStore>,
            ItemEnumerator::new(catalog.clone()),
            scheduler.clone(),
            pubsub.clone(),
        );

        Self {
            store,
            catalog,
            ratings,
            pubsub,
            scheduler,
            service,
        }
    }

    /// Seed a library with `count` series, one issue each. Returns
    /// (library id, series ids in name order).
    pub fn seed_library(&self, count: usize) -> (Uuid, Vec<Uuid>) {
        let library_id = Uuid::new_v4();
        let series_ids: Vec<Uuid> = (0..count)
            .map(|i| {
                let series_id = self.catalog.add_series(&format!("Series {:02}", i));
                self.catalog.add_issue(series_id, library_id, Some("1"));
                series_id
            })
            .collect();
        (library_id, series_ids)
    }
}

/// Poll the store until the job reaches a terminal status.
pub async fn wait_for_terminal(store: &InMemoryJobStore, id: Uuid) -> RatingJob {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(job) = store.snapshot(id) {
            if job.is_terminal() {
                return job;
            }
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("job {} did not reach a terminal status in time", id);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
