//! Rating service request/response models

use serde::{Deserialize, Serialize};

/// Outcome of a single sync call against the rating service
///
/// A successful call with `has_data == false` means no configured source had
/// usable data for the target. That is a legitimate business outcome, not an
/// error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    /// Whether at least one source returned usable rating data
    pub has_data: bool,
    /// Source slugs that had no data for this target
    pub unmatched_sources: Vec<String>,
}

/// Request body for a sync call
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SyncRequest<'a> {
    pub sources: &'a [String],
    pub force_refresh: bool,
}

/// Raw wire response from the rating service
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawSyncResponse {
    #[serde(default = "default_true")]
    pub success: bool,
    #[serde(default)]
    pub has_data: bool,
    #[serde(default)]
    pub unmatched_sources: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Error body the rating service sends with non-2xx responses
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorResponse {
    pub error: String,
}

impl From<RawSyncResponse> for SyncReport {
    fn from(raw: RawSyncResponse) -> Self {
        Self {
            has_data: raw.has_data,
            unmatched_sources: raw.unmatched_sources,
        }
    }
}
