use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum StrategyStatus {
    Pending,
    Ok,
    Failed,
}

impl std::fmt::Display for StrategyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyStatus::Pending => write!(f, "pending"),
            StrategyStatus::Ok => write!(f, "ok"),
            StrategyStatus::Failed => write!(f, "failed"),
        }
    }
}

// One row per snapshot; accumulates stage outputs as the pipeline advances.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StrategyRecord {
    pub id: Uuid,
    pub snapshot_id: Uuid,
    pub stage_a_output: Option<String>,
    pub final_output: Option<String>,
    pub status: StrategyStatus,
    pub model_route: Option<String>,
    pub error_message: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StrategyRecord {
    pub fn new(snapshot_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            snapshot_id,
            stage_a_output: None,
            final_output: None,
            status: StrategyStatus::Pending,
            model_route: None,
            error_message: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == StrategyStatus::Ok && self.final_output.is_some()
    }

    pub fn has_stage_a(&self) -> bool {
        self.stage_a_output
            .as_deref()
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false)
    }
}
