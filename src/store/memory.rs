use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::errors::StoreError;
use crate::models::{
    BriefingRecord, CreateModelCall, CreateRanking, EnqueueOutcome, Job, JobKind, JobStatus,
    ModelCall, Ranking, SnapshotContext, StrategyRecord, StrategyStatus, VenueCandidate,
};
use crate::store::{ContextSource, JobStore, ModelCallLog, Publisher, RankingStore, StrategyStore};

/// In-process store. Every operation runs under one lock, which gives the
/// same atomicity the Postgres row locks provide.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    /// Number of upcoming model-call inserts that fail as if the referenced
    /// strategy row were not visible yet.
    lagging_reference_inserts: AtomicU32,
}

#[derive(Default)]
struct Inner {
    jobs: Vec<Job>,
    strategies: HashMap<Uuid, StrategyRecord>,
    snapshots: HashMap<Uuid, SnapshotContext>,
    briefings: HashMap<Uuid, BriefingRecord>,
    venues: HashMap<Uuid, Vec<VenueCandidate>>,
    rankings: HashMap<Uuid, Ranking>,
    model_calls: Vec<ModelCall>,
    published: Vec<(String, String)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_snapshot(&self, snapshot: SnapshotContext) {
        self.inner.lock().snapshots.insert(snapshot.snapshot_id, snapshot);
    }

    pub fn insert_briefing(&self, briefing: BriefingRecord) {
        self.inner.lock().briefings.insert(briefing.snapshot_id, briefing);
    }

    pub fn insert_venue(&self, venue: VenueCandidate) {
        self.inner
            .lock()
            .venues
            .entry(venue.snapshot_id)
            .or_default()
            .push(venue);
    }

    /// Seed or overwrite a strategy record directly.
    pub fn put_strategy(&self, record: StrategyRecord) {
        self.inner.lock().strategies.insert(record.snapshot_id, record);
    }

    pub fn lag_reference_inserts(&self, count: u32) {
        self.lagging_reference_inserts.store(count, Ordering::SeqCst);
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.inner.lock().jobs.clone()
    }

    pub fn strategy(&self, snapshot_id: Uuid) -> Option<StrategyRecord> {
        self.inner.lock().strategies.get(&snapshot_id).cloned()
    }

    pub fn ranking(&self, snapshot_id: Uuid) -> Option<Ranking> {
        self.inner.lock().rankings.get(&snapshot_id).cloned()
    }

    pub fn model_calls(&self) -> Vec<ModelCall> {
        self.inner.lock().model_calls.clone()
    }

    pub fn published(&self) -> Vec<(String, String)> {
        self.inner.lock().published.clone()
    }

    fn take_lagging_insert(&self) -> bool {
        self.lagging_reference_inserts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn enqueue(&self, snapshot_id: Uuid, kind: JobKind) -> Result<EnqueueOutcome, StoreError> {
        let mut inner = self.inner.lock();

        let existing = inner.jobs.iter().find(|j| {
            j.snapshot_id == snapshot_id
                && j.kind == kind
                && matches!(j.status, JobStatus::Queued | JobStatus::Running)
        });
        if let Some(job) = existing {
            return Ok(EnqueueOutcome::Existing(job.clone()));
        }

        let job = Job::new(snapshot_id, kind);
        inner.jobs.push(job.clone());
        Ok(EnqueueOutcome::Created(job))
    }

    async fn claim_next(&self, worker_id: &str) -> Result<Option<Job>, StoreError> {
        let mut inner = self.inner.lock();

        let busy: Vec<Uuid> = inner
            .jobs
            .iter()
            .filter(|j| j.status == JobStatus::Running)
            .map(|j| j.snapshot_id)
            .collect();

        let candidate = inner
            .jobs
            .iter_mut()
            .filter(|j| j.status == JobStatus::Queued && !busy.contains(&j.snapshot_id))
            .min_by_key(|j| j.created_at);

        Ok(candidate.map(|job| {
            let now = Utc::now();
            job.status = JobStatus::Running;
            job.worker_id = Some(worker_id.to_string());
            job.started_at = Some(now);
            job.updated_at = now;
            job.clone()
        }))
    }

    async fn complete(&self, job_id: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        match inner
            .jobs
            .iter_mut()
            .find(|j| j.id == job_id && j.status == JobStatus::Running)
        {
            Some(job) => {
                let now = Utc::now();
                job.status = JobStatus::Ok;
                job.error_message = None;
                job.completed_at = Some(now);
                job.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn fail(&self, job_id: Uuid, message: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        match inner
            .jobs
            .iter_mut()
            .find(|j| j.id == job_id && j.status == JobStatus::Running)
        {
            Some(job) => {
                let now = Utc::now();
                job.status = JobStatus::Error;
                job.error_message = Some(message.to_string());
                job.completed_at = Some(now);
                job.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find(&self, job_id: Uuid) -> Result<Option<Job>, StoreError> {
        Ok(self.inner.lock().jobs.iter().find(|j| j.id == job_id).cloned())
    }

    async fn running_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<Job>, StoreError> {
        Ok(self
            .inner
            .lock()
            .jobs
            .iter()
            .filter(|j| {
                j.status == JobStatus::Running && j.started_at.map(|s| s < cutoff).unwrap_or(false)
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl StrategyStore for MemoryStore {
    async fn find_strategy(&self, snapshot_id: Uuid) -> Result<Option<StrategyRecord>, StoreError> {
        Ok(self.strategy(snapshot_id))
    }

    async fn save_stage_a(
        &self,
        snapshot_id: Uuid,
        output: &str,
        model_route: &str,
    ) -> Result<Option<StrategyRecord>, StoreError> {
        let mut inner = self.inner.lock();
        let record = inner
            .strategies
            .entry(snapshot_id)
            .or_insert_with(|| StrategyRecord::new(snapshot_id));

        if record.status == StrategyStatus::Ok {
            return Ok(None);
        }

        record.stage_a_output = Some(output.to_string());
        record.status = StrategyStatus::Pending;
        record.model_route = Some(model_route.to_string());
        record.error_message = None;
        record.version += 1;
        record.updated_at = Utc::now();
        Ok(Some(record.clone()))
    }

    async fn save_final(
        &self,
        snapshot_id: Uuid,
        output: &str,
        model_route: &str,
    ) -> Result<Option<StrategyRecord>, StoreError> {
        let mut inner = self.inner.lock();
        match inner.strategies.get_mut(&snapshot_id) {
            Some(record) if record.status != StrategyStatus::Ok => {
                record.final_output = Some(output.to_string());
                record.status = StrategyStatus::Ok;
                record.model_route = Some(model_route.to_string());
                record.error_message = None;
                record.version += 1;
                record.updated_at = Utc::now();
                Ok(Some(record.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn mark_failed(&self, snapshot_id: Uuid, message: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let record = inner
            .strategies
            .entry(snapshot_id)
            .or_insert_with(|| StrategyRecord::new(snapshot_id));

        if record.status != StrategyStatus::Ok {
            record.status = StrategyStatus::Failed;
            record.error_message = Some(message.to_string());
            record.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[async_trait]
impl ContextSource for MemoryStore {
    async fn snapshot(&self, snapshot_id: Uuid) -> Result<Option<SnapshotContext>, StoreError> {
        Ok(self.inner.lock().snapshots.get(&snapshot_id).cloned())
    }

    async fn briefing(&self, snapshot_id: Uuid) -> Result<Option<BriefingRecord>, StoreError> {
        Ok(self.inner.lock().briefings.get(&snapshot_id).cloned())
    }

    async fn venue_candidates(
        &self,
        snapshot_id: Uuid,
        limit: i64,
    ) -> Result<Vec<VenueCandidate>, StoreError> {
        let mut venues = self
            .inner
            .lock()
            .venues
            .get(&snapshot_id)
            .cloned()
            .unwrap_or_default();
        venues.sort_by(|a, b| {
            b.score
                .unwrap_or(f64::MIN)
                .partial_cmp(&a.score.unwrap_or(f64::MIN))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        venues.truncate(limit.max(0) as usize);
        Ok(venues)
    }
}

#[async_trait]
impl RankingStore for MemoryStore {
    async fn find_ranking(&self, snapshot_id: Uuid) -> Result<Option<Ranking>, StoreError> {
        Ok(self.ranking(snapshot_id))
    }

    async fn insert_ranking(&self, input: CreateRanking) -> Result<Ranking, StoreError> {
        let mut inner = self.inner.lock();
        let ranking = inner
            .rankings
            .entry(input.snapshot_id)
            .or_insert_with(|| Ranking::from_create(input));
        Ok(ranking.clone())
    }
}

#[async_trait]
impl ModelCallLog for MemoryStore {
    async fn record_call(&self, call: &CreateModelCall) -> Result<ModelCall, StoreError> {
        if let Some(snapshot_id) = call.snapshot_id {
            if self.take_lagging_insert() {
                return Err(StoreError::MissingReference(format!(
                    "strategies row for snapshot {} not visible",
                    snapshot_id
                )));
            }
            if !self.inner.lock().strategies.contains_key(&snapshot_id) {
                return Err(StoreError::MissingReference(format!(
                    "no strategies row for snapshot {}",
                    snapshot_id
                )));
            }
        }

        let row = ModelCall::from_create(call.clone());
        self.inner.lock().model_calls.push(row.clone());
        Ok(row)
    }
}

#[async_trait]
impl Publisher for MemoryStore {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), StoreError> {
        self.inner
            .lock()
            .published
            .push((channel.to_string(), payload.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_enqueue_deduplicates_active_job() {
        let store = MemoryStore::new();
        let snapshot_id = Uuid::new_v4();

        let first = store.enqueue(snapshot_id, JobKind::Full).await.unwrap();
        let second = store.enqueue(snapshot_id, JobKind::Full).await.unwrap();

        assert!(first.was_created());
        assert!(!second.was_created());
        assert_eq!(first.job().id, second.job().id);
        assert_eq!(store.jobs().len(), 1);
    }

    #[tokio::test]
    async fn test_enqueue_allows_new_job_after_terminal() {
        let store = MemoryStore::new();
        let snapshot_id = Uuid::new_v4();

        store.enqueue(snapshot_id, JobKind::Full).await.unwrap();
        let job = store.claim_next("w1").await.unwrap().unwrap();
        store.fail(job.id, "boom").await.unwrap();

        let again = store.enqueue(snapshot_id, JobKind::Full).await.unwrap();
        assert!(again.was_created());
    }

    #[tokio::test]
    async fn test_claim_on_empty_queue_returns_none() {
        let store = MemoryStore::new();
        assert!(store.claim_next("w1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_skips_snapshot_with_running_job() {
        let store = MemoryStore::new();
        let snapshot_id = Uuid::new_v4();

        store.enqueue(snapshot_id, JobKind::Full).await.unwrap();
        store.enqueue(snapshot_id, JobKind::Consolidate).await.unwrap();

        let first = store.claim_next("w1").await.unwrap();
        assert!(first.is_some());
        assert!(store.claim_next("w2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_terminal_transitions_are_idempotent() {
        let store = MemoryStore::new();
        store.enqueue(Uuid::new_v4(), JobKind::Full).await.unwrap();
        let job = store.claim_next("w1").await.unwrap().unwrap();

        assert!(store.complete(job.id).await.unwrap());
        assert!(!store.complete(job.id).await.unwrap());
        assert!(!store.fail(job.id, "late").await.unwrap());

        let stored = store.find(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Ok);
        assert!(stored.error_message.is_none());
    }

    #[tokio::test]
    async fn test_queued_job_cannot_be_failed_directly() {
        let store = MemoryStore::new();
        let outcome = store.enqueue(Uuid::new_v4(), JobKind::Full).await.unwrap();
        assert!(!store.fail(outcome.job().id, "skip running").await.unwrap());
        assert_eq!(store.jobs()[0].status, JobStatus::Queued);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_hand_out_single_job_once() {
        let store = Arc::new(MemoryStore::new());
        store.enqueue(Uuid::new_v4(), JobKind::Full).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.claim_next(&format!("worker-{}", i)).await.unwrap()
            }));
        }

        let mut claimed = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                claimed += 1;
            }
        }
        assert_eq!(claimed, 1);
    }

    #[tokio::test]
    async fn test_save_final_writes_once() {
        let store = MemoryStore::new();
        let snapshot_id = Uuid::new_v4();
        store.save_stage_a(snapshot_id, "analysis", "a").await.unwrap();

        let first = store.save_final(snapshot_id, "final", "a -> c").await.unwrap();
        let second = store.save_final(snapshot_id, "other", "a -> c").await.unwrap();

        assert_eq!(first.unwrap().version, 2);
        assert!(second.is_none());
        assert_eq!(
            store.strategy(snapshot_id).unwrap().final_output.as_deref(),
            Some("final")
        );
    }

    #[tokio::test]
    async fn test_mark_failed_keeps_ok_record() {
        let store = MemoryStore::new();
        let snapshot_id = Uuid::new_v4();
        store.save_stage_a(snapshot_id, "analysis", "a").await.unwrap();
        store.save_final(snapshot_id, "final", "a -> c").await.unwrap();

        store.mark_failed(snapshot_id, "late failure").await.unwrap();

        let record = store.strategy(snapshot_id).unwrap();
        assert_eq!(record.status, StrategyStatus::Ok);
        assert!(record.error_message.is_none());
    }

    #[tokio::test]
    async fn test_model_call_requires_visible_strategy() {
        let store = MemoryStore::new();
        let call = CreateModelCall {
            snapshot_id: Some(Uuid::new_v4()),
            stage: crate::models::Stage::Strategist,
            provider: "anthropic".into(),
            model: "claude".into(),
            prompt_hash: "p".into(),
            response_hash: None,
            latency_ms: 1,
            tokens_in: None,
            tokens_out: None,
            success: true,
            error_message: None,
            reference_degraded: false,
        };

        let err = store.record_call(&call).await.unwrap_err();
        assert!(err.is_missing_reference());
        assert!(store.record_call(&call.without_reference()).await.is_ok());
    }
}
