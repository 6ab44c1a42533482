use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::db::{
    context_queries, job_queries, model_call_queries, ranking_queries, strategy_queries,
};
use crate::errors::StoreError;
use crate::models::{
    BriefingRecord, CreateModelCall, CreateRanking, EnqueueOutcome, Job, JobKind, ModelCall,
    Ranking, SnapshotContext, StrategyRecord, VenueCandidate,
};
use crate::store::{ContextSource, JobStore, ModelCallLog, Publisher, RankingStore, StrategyStore};

/// Postgres-backed implementation of every store seam.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl JobStore for PgStore {
    async fn enqueue(&self, snapshot_id: Uuid, kind: JobKind) -> Result<EnqueueOutcome, StoreError> {
        if let Some(job) = job_queries::insert_queued(&self.pool, snapshot_id, kind).await? {
            return Ok(EnqueueOutcome::Created(job));
        }

        // The active job may have finished between the insert and this read.
        match job_queries::find_active(&self.pool, snapshot_id, kind).await? {
            Some(job) => Ok(EnqueueOutcome::Existing(job)),
            None => job_queries::insert_queued(&self.pool, snapshot_id, kind)
                .await?
                .map(EnqueueOutcome::Created)
                .ok_or_else(|| {
                    StoreError::Conflict(format!(
                        "could not enqueue {} job for snapshot {}",
                        kind, snapshot_id
                    ))
                }),
        }
    }

    async fn claim_next(&self, worker_id: &str) -> Result<Option<Job>, StoreError> {
        match job_queries::claim_next(&self.pool, worker_id).await {
            Ok(job) => Ok(job),
            Err(e) => match StoreError::from(e) {
                // Another worker started a job for the same snapshot in the
                // same instant; the running-per-snapshot index rejected ours.
                StoreError::Conflict(msg) => {
                    debug!("Claim lost race on running-per-snapshot index: {}", msg);
                    Ok(None)
                }
                other => Err(other),
            },
        }
    }

    async fn complete(&self, job_id: Uuid) -> Result<bool, StoreError> {
        Ok(job_queries::mark_ok(&self.pool, job_id).await?)
    }

    async fn fail(&self, job_id: Uuid, message: &str) -> Result<bool, StoreError> {
        Ok(job_queries::mark_error(&self.pool, job_id, message).await?)
    }

    async fn find(&self, job_id: Uuid) -> Result<Option<Job>, StoreError> {
        Ok(job_queries::fetch_one(&self.pool, job_id).await?)
    }

    async fn running_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<Job>, StoreError> {
        Ok(job_queries::fetch_running_since(&self.pool, cutoff).await?)
    }
}

#[async_trait]
impl StrategyStore for PgStore {
    async fn find_strategy(&self, snapshot_id: Uuid) -> Result<Option<StrategyRecord>, StoreError> {
        Ok(strategy_queries::fetch_by_snapshot(&self.pool, snapshot_id).await?)
    }

    async fn save_stage_a(
        &self,
        snapshot_id: Uuid,
        output: &str,
        model_route: &str,
    ) -> Result<Option<StrategyRecord>, StoreError> {
        Ok(strategy_queries::upsert_stage_a(&self.pool, snapshot_id, output, model_route).await?)
    }

    async fn save_final(
        &self,
        snapshot_id: Uuid,
        output: &str,
        model_route: &str,
    ) -> Result<Option<StrategyRecord>, StoreError> {
        Ok(strategy_queries::save_final(&self.pool, snapshot_id, output, model_route).await?)
    }

    async fn mark_failed(&self, snapshot_id: Uuid, message: &str) -> Result<(), StoreError> {
        Ok(strategy_queries::mark_failed(&self.pool, snapshot_id, message).await?)
    }
}

#[async_trait]
impl ContextSource for PgStore {
    async fn snapshot(&self, snapshot_id: Uuid) -> Result<Option<SnapshotContext>, StoreError> {
        Ok(context_queries::fetch_snapshot(&self.pool, snapshot_id).await?)
    }

    async fn briefing(&self, snapshot_id: Uuid) -> Result<Option<BriefingRecord>, StoreError> {
        Ok(context_queries::fetch_briefing(&self.pool, snapshot_id).await?)
    }

    async fn venue_candidates(
        &self,
        snapshot_id: Uuid,
        limit: i64,
    ) -> Result<Vec<VenueCandidate>, StoreError> {
        Ok(context_queries::fetch_venue_candidates(&self.pool, snapshot_id, limit).await?)
    }
}

#[async_trait]
impl RankingStore for PgStore {
    async fn find_ranking(&self, snapshot_id: Uuid) -> Result<Option<Ranking>, StoreError> {
        Ok(ranking_queries::fetch_by_snapshot(&self.pool, snapshot_id).await?)
    }

    async fn insert_ranking(&self, input: CreateRanking) -> Result<Ranking, StoreError> {
        Ok(ranking_queries::insert(&self.pool, input).await?)
    }
}

#[async_trait]
impl ModelCallLog for PgStore {
    async fn record_call(&self, call: &CreateModelCall) -> Result<ModelCall, StoreError> {
        Ok(model_call_queries::insert(&self.pool, call).await?)
    }
}

#[async_trait]
impl Publisher for PgStore {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), StoreError> {
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(channel)
            .bind(payload)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
