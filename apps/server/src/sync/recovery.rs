//! Crash recovery
//!
//! Runs once at startup, before the scheduler loop is spawned. Any job
//! still marked `processing` was interrupted by an unclean shutdown;
//! it is requeued as `pending` with zeroed counters and reruns from
//! the first item of its frozen snapshot.

use crate::error::ServerResult;

use super::JobStore;

/// Requeue jobs interrupted by a crash. Returns how many were requeued.
pub async fn recover_interrupted(store: &dyn JobStore) -> ServerResult<u64> {
    let requeued = store.reset_interrupted().await?;

    if requeued > 0 {
        tracing::warn!(
            requeued,
            "Requeued rating sync jobs interrupted by an unclean shutdown"
        );
    } else {
        tracing::debug!("No interrupted rating sync jobs found");
    }

    Ok(requeued)
}
