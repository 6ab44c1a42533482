use std::sync::Arc;

use sqlx::PgPool;

use crate::store::JobStore;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub jobs: Arc<dyn JobStore>,
}
