use axum::{extract::State, routing::get, Json, Router};

use crate::db::job_run_queries;
use crate::errors::AppError;
use crate::models::JobRun;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/recent", get(recent_sweeps))
}

/// GET /api/admin/sweeps/recent - Last 50 sweep runs
async fn recent_sweeps(State(state): State<AppState>) -> Result<Json<Vec<JobRun>>, AppError> {
    Ok(Json(job_run_queries::fetch_recent(&state.pool, 50).await?))
}
