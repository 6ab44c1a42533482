//! Persistence seams used by the worker, the listener and the sweep.
//!
//! `PgStore` is the production implementation over `sqlx`; `MemoryStore`
//! keeps everything in process and is used for embedding without a database
//! and in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::StoreError;
use crate::models::{
    BriefingRecord, CreateModelCall, CreateRanking, EnqueueOutcome, Job, JobKind, ModelCall,
    Ranking, SnapshotContext, StrategyRecord, VenueCandidate,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// The claim queue.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a queued job, or return the equivalent queued/running one.
    async fn enqueue(&self, snapshot_id: Uuid, kind: JobKind) -> Result<EnqueueOutcome, StoreError>;

    /// Take exclusive custody of one queued job. Concurrent callers never
    /// receive the same job.
    async fn claim_next(&self, worker_id: &str) -> Result<Option<Job>, StoreError>;

    /// running -> ok. `false` when the job was not running (already terminal).
    async fn complete(&self, job_id: Uuid) -> Result<bool, StoreError>;

    /// running -> error. `false` when the job was not running (already terminal).
    async fn fail(&self, job_id: Uuid, message: &str) -> Result<bool, StoreError>;

    async fn find(&self, job_id: Uuid) -> Result<Option<Job>, StoreError>;

    async fn running_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<Job>, StoreError>;
}

#[async_trait]
pub trait StrategyStore: Send + Sync {
    async fn find_strategy(&self, snapshot_id: Uuid) -> Result<Option<StrategyRecord>, StoreError>;

    /// Persist strategist output. `None` when the record is already `ok`.
    async fn save_stage_a(
        &self,
        snapshot_id: Uuid,
        output: &str,
        model_route: &str,
    ) -> Result<Option<StrategyRecord>, StoreError>;

    /// Persist the consolidated output. `None` when the record is already
    /// `ok` or missing, in which case nothing is written.
    async fn save_final(
        &self,
        snapshot_id: Uuid,
        output: &str,
        model_route: &str,
    ) -> Result<Option<StrategyRecord>, StoreError>;

    /// Mark the record failed, creating it if necessary. An `ok` record is kept.
    async fn mark_failed(&self, snapshot_id: Uuid, message: &str) -> Result<(), StoreError>;
}

/// Read-only upstream data.
#[async_trait]
pub trait ContextSource: Send + Sync {
    async fn snapshot(&self, snapshot_id: Uuid) -> Result<Option<SnapshotContext>, StoreError>;

    async fn briefing(&self, snapshot_id: Uuid) -> Result<Option<BriefingRecord>, StoreError>;

    async fn venue_candidates(
        &self,
        snapshot_id: Uuid,
        limit: i64,
    ) -> Result<Vec<VenueCandidate>, StoreError>;
}

#[async_trait]
pub trait RankingStore: Send + Sync {
    async fn find_ranking(&self, snapshot_id: Uuid) -> Result<Option<Ranking>, StoreError>;

    /// Insert-if-absent; returns whichever row ends up stored.
    async fn insert_ranking(&self, input: CreateRanking) -> Result<Ranking, StoreError>;
}

#[async_trait]
pub trait ModelCallLog: Send + Sync {
    async fn record_call(&self, call: &CreateModelCall) -> Result<ModelCall, StoreError>;
}

/// Fire-and-forget publish on a named channel.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), StoreError>;
}
