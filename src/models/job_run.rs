use chrono::{DateTime, Utc};
use serde::Serialize;

/// One execution of a scheduled sweep, as tracked in `job_runs`.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct JobRun {
    pub id: i32,
    pub job_name: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: String,
    pub error_message: Option<String>,
    pub items_processed: Option<i32>,
    pub items_failed: Option<i32>,
    pub duration_ms: Option<i64>,
}
