use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Where the driver should wait between trips.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StagingArea {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedVenue {
    pub name: String,
    pub address: String,
    pub category: String,
    pub distance_miles: f64,
    pub drive_time_minutes: f64,
    pub reasoning: String,
}

/// Shape the planner is asked to return.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingPlan {
    pub staging_area: Option<StagingArea>,
    #[serde(default)]
    pub venues: Vec<RankedVenue>,
}

/// Persisted ranking, one per snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ranking {
    pub id: Uuid,
    pub snapshot_id: Uuid,
    pub strategy_version: i64,
    pub staging_area: serde_json::Value,
    pub venues: serde_json::Value,
    pub model_route: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateRanking {
    pub snapshot_id: Uuid,
    pub strategy_version: i64,
    pub staging_area: serde_json::Value,
    pub venues: serde_json::Value,
    pub model_route: String,
}

impl Ranking {
    pub fn from_create(input: CreateRanking) -> Self {
        Self {
            id: Uuid::new_v4(),
            snapshot_id: input.snapshot_id,
            strategy_version: input.strategy_version,
            staging_area: input.staging_area,
            venues: input.venues,
            model_route: input.model_route,
            created_at: Utc::now(),
        }
    }
}
