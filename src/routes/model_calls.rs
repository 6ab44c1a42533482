use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::db::model_call_queries;
use crate::errors::AppError;
use crate::models::ModelCallStats;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/performance", get(performance))
}

#[derive(Debug, Deserialize)]
struct PerformanceQuery {
    hours: Option<i32>,
}

#[derive(Debug, Serialize)]
struct StagePerformance {
    #[serde(flatten)]
    stats: ModelCallStats,
    success_rate: f64,
}

#[derive(Debug, Serialize)]
struct PerformanceResponse {
    hours: i32,
    stages: Vec<StagePerformance>,
}

/// GET /api/admin/model-calls/performance?hours=24
async fn performance(
    State(state): State<AppState>,
    Query(query): Query<PerformanceQuery>,
) -> Result<Json<PerformanceResponse>, AppError> {
    let hours = query.hours.unwrap_or(24);
    if !(1..=24 * 30).contains(&hours) {
        return Err(AppError::Validation("hours must be between 1 and 720".to_string()));
    }

    let stages = model_call_queries::stats_by_stage(&state.pool, hours)
        .await?
        .into_iter()
        .map(|stats| StagePerformance {
            success_rate: stats.success_rate(),
            stats,
        })
        .collect();

    Ok(Json(PerformanceResponse { hours, stages }))
}
