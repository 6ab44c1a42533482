use axum::{extract::State, http::StatusCode, routing::get, Router};
use tracing::{info, warn};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(health))
}

/// Liveness plus a database round trip.
async fn health(State(state): State<AppState>) -> (StatusCode, &'static str) {
    info!("GET /health - Health check");
    match sqlx::query("SELECT 1").execute(&state.pool).await {
        Ok(_) => (StatusCode::OK, "OK"),
        Err(e) => {
            warn!("Health check database ping failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "DATABASE UNAVAILABLE")
        }
    }
}
