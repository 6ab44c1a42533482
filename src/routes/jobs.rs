use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::db::job_queries;
use crate::errors::AppError;
use crate::models::{CreateJob, Job, JobQueueStats, JobStatus};
use crate::state::AppState;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_jobs).post(enqueue_job))
        .route("/stats", get(queue_stats))
        .route("/:id", get(get_job))
}

#[derive(Debug, Deserialize)]
struct ListJobsQuery {
    status: Option<JobStatus>,
    limit: Option<i64>,
}

/// GET /api/admin/jobs - Most recent jobs, optionally filtered by status
async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<Vec<Job>>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(AppError::Validation(format!(
            "limit must be between 1 and {}",
            MAX_LIMIT
        )));
    }

    let jobs = job_queries::fetch_recent(&state.pool, query.status, limit).await?;
    Ok(Json(jobs))
}

/// GET /api/admin/jobs/stats - Queue depth by status
async fn queue_stats(State(state): State<AppState>) -> Result<Json<JobQueueStats>, AppError> {
    Ok(Json(job_queries::count_by_status(&state.pool).await?))
}

/// GET /api/admin/jobs/:id
async fn get_job(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Job>, AppError> {
    state
        .jobs
        .find(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("job {} not found", id)))
}

/// POST /api/admin/jobs - Manual (re-)enqueue for recovery
async fn enqueue_job(
    State(state): State<AppState>,
    Json(body): Json<CreateJob>,
) -> Result<(StatusCode, Json<Job>), AppError> {
    info!("POST /api/admin/jobs - {} job for snapshot {}", body.kind, body.snapshot_id);

    let outcome = state.jobs.enqueue(body.snapshot_id, body.kind).await?;
    let status = if outcome.was_created() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome.job().clone())))
}
