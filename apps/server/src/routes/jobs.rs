//! Rating sync job HTTP route handlers
//!
//! - `POST /jobs` - Create a job
//! - `GET /jobs` - List jobs, optionally filtered by status
//! - `GET /jobs/:id` - Fetch one job
//! - `POST /jobs/:id/cancel` - Cancel a job
//! - `POST /jobs/cleanup` - Delete old terminal jobs
//! - `GET /jobs/:id/events` - WebSocket stream of job events

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ServerError, ServerResult};
use crate::models::{JobKind, JobStatus, RatingJob};
use crate::services::JobService;

use super::events::job_events_handler;

const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 500;

/// Shared state for job route handlers
#[derive(Clone)]
pub struct JobsState {
    pub service: JobService,
    /// Retention window applied when a cleanup request gives none.
    pub default_retention_days: i64,
}

impl JobsState {
    pub fn new(service: JobService, default_retention_days: i64) -> Self {
        Self {
            service,
            default_retention_days,
        }
    }
}

/// Create job router
pub fn jobs_router(state: JobsState) -> Router {
    Router::new()
        .route("/", post(create_job).get(list_jobs))
        .route("/cleanup", post(cleanup_jobs))
        .route("/:id", get(get_job))
        .route("/:id/cancel", post(cancel_job))
        .route("/:id/events", get(job_events_handler))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub kind: JobKind,
    pub target_id: Option<Uuid>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub force_refresh: bool,
}

async fn create_job(
    State(state): State<JobsState>,
    Json(request): Json<CreateJobRequest>,
) -> ServerResult<(StatusCode, Json<RatingJob>)> {
    let job = state
        .service
        .create(
            request.kind,
            request.target_id,
            request.sources,
            request.force_refresh,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(job)))
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

async fn list_jobs(
    State(state): State<JobsState>,
    Query(query): Query<ListJobsQuery>,
) -> ServerResult<Json<Vec<RatingJob>>> {
    let status = query
        .status
        .as_deref()
        .map(|s| {
            s.parse::<JobStatus>()
                .map_err(|reason| ServerError::InvalidQueryParam {
                    name: "status",
                    reason,
                })
        })
        .transpose()?;

    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);

    let jobs = state.service.list(status, limit).await?;
    Ok(Json(jobs))
}

async fn get_job(
    State(state): State<JobsState>,
    Path(id): Path<Uuid>,
) -> ServerResult<Json<RatingJob>> {
    let job = state.service.get(id).await?;
    Ok(Json(job))
}

async fn cancel_job(
    State(state): State<JobsState>,
    Path(id): Path<Uuid>,
) -> ServerResult<Json<RatingJob>> {
    let job = state.service.cancel(id).await?;
    Ok(Json(job))
}

#[derive(Debug, Default, Deserialize)]
pub struct CleanupRequest {
    pub older_than_days: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub deleted: u64,
}

async fn cleanup_jobs(
    State(state): State<JobsState>,
    request: Option<Json<CleanupRequest>>,
) -> ServerResult<Json<CleanupResponse>> {
    let older_than_days = request
        .and_then(|Json(r)| r.older_than_days)
        .unwrap_or(state.default_retention_days);

    let deleted = state.service.cleanup(older_than_days).await?;
    Ok(Json(CleanupResponse { deleted }))
}
