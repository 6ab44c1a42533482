use axum::Router;
use tower_http::trace::TraceLayer;

use crate::routes::{health, jobs, model_calls, sweeps};
use crate::state::AppState;

pub fn create_app(state: AppState) -> Router {
    Router::<AppState>::new()
        .nest("/health", health::router())
        .nest("/api/admin/jobs", jobs::router())
        .nest("/api/admin/sweeps", sweeps::router())
        .nest("/api/admin/model-calls", model_calls::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
