mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use common::{Harness, ScriptedProvider, FINAL_TEXT, STRATEGY_TEXT};
use strategy_worker::errors::StoreError;
use strategy_worker::models::{EnqueueOutcome, Job, JobKind, JobStatus, StrategyRecord, StrategyStatus};
use strategy_worker::services::job_worker_service::PollResult;
use strategy_worker::services::ranking_service::RankingStatus;
use strategy_worker::store::{JobStore, MemoryStore};
use strategy_worker::{JobWorker, PipelineOrchestrator, PipelineOutcome};

#[tokio::test]
async fn test_full_job_with_briefing_finalizes_strategy() {
    let h = Harness::new();
    let snapshot_id = h.seed(true);
    h.store.insert_venue(common::venue(snapshot_id, "Happiest Hour", 0.9));

    h.store.enqueue(snapshot_id, JobKind::Full).await.unwrap();
    let result = h.worker("w1").poll_once().await.unwrap();

    assert_eq!(
        result,
        PollResult::Processed(PipelineOutcome::Completed {
            version: 2,
            consolidated: true,
            ranking: RankingStatus::Created,
        })
    );

    let job = &h.store.jobs()[0];
    assert_eq!(job.status, JobStatus::Ok);
    assert_eq!(job.worker_id.as_deref(), Some("w1"));
    assert!(job.completed_at.is_some());

    let record = h.store.strategy(snapshot_id).unwrap();
    assert_eq!(record.status, StrategyStatus::Ok);
    assert_eq!(record.final_output.as_deref(), Some(FINAL_TEXT));
    assert_eq!(record.stage_a_output.as_deref(), Some(STRATEGY_TEXT));
    assert_eq!(
        record.model_route.as_deref(),
        Some("anthropic:claude-sonnet-4-20250514 -> google:gemini-2.0-flash-001")
    );

    let ranking = h.store.ranking(snapshot_id).unwrap();
    assert_eq!(ranking.strategy_version, 2);
    assert_eq!(ranking.venues.as_array().unwrap().len(), 4);

    assert_eq!((h.strategist.calls(), h.consolidator.calls(), h.planner.calls()), (1, 1, 1));
    assert_eq!(h.published_on("result_ready").len(), 1);

    let calls = h.store.model_calls();
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|c| c.success && c.snapshot_id == Some(snapshot_id)));
}

#[tokio::test]
async fn test_missing_briefing_fails_job_and_record() {
    let h = Harness::new();
    let snapshot_id = h.seed(false);

    h.store.enqueue(snapshot_id, JobKind::Full).await.unwrap();
    let result = h.worker("w1").poll_once().await.unwrap();

    match result {
        PollResult::Failed(message) => assert!(message.contains("briefing")),
        other => panic!("expected failure, got {:?}", other),
    }

    let job = &h.store.jobs()[0];
    assert_eq!(job.status, JobStatus::Error);
    assert!(job.error_message.as_deref().unwrap().contains("briefing"));

    let record = h.store.strategy(snapshot_id).unwrap();
    assert_eq!(record.status, StrategyStatus::Failed);
    assert!(record.error_message.as_deref().unwrap().contains("briefing"));
    // Stage A is kept so a later consolidation does not pay for it again
    assert!(record.has_stage_a());
    assert_eq!(h.consolidator.calls(), 0);
    assert!(h.published_on("result_ready").is_empty());
}

#[tokio::test]
async fn test_rerun_on_completed_record_makes_no_calls() {
    let h = Harness::new();
    let snapshot_id = h.seed(true);

    h.store.enqueue(snapshot_id, JobKind::Full).await.unwrap();
    h.worker("w1").poll_once().await.unwrap();
    let before = h.store.strategy(snapshot_id).unwrap();
    let calls_before = h.total_calls();

    h.store.enqueue(snapshot_id, JobKind::Full).await.unwrap();
    let result = h.worker("w2").poll_once().await.unwrap();

    assert_eq!(result, PollResult::Processed(PipelineOutcome::AlreadyComplete));
    assert_eq!(h.total_calls(), calls_before);

    let after = h.store.strategy(snapshot_id).unwrap();
    assert_eq!(after.version, before.version);
    assert_eq!(after.final_output, before.final_output);
    assert!(h.store.jobs().iter().all(|j| j.status == JobStatus::Ok));
}

#[tokio::test]
async fn test_consolidate_job_reuses_stage_a_output() {
    let h = Harness::new();
    let snapshot_id = h.seed(true);

    let mut record = StrategyRecord::new(snapshot_id);
    record.stage_a_output = Some(STRATEGY_TEXT.to_string());
    record.model_route = Some("anthropic:claude-sonnet-4-20250514".into());
    record.status = StrategyStatus::Failed;
    record.version = 1;
    h.store.put_strategy(record);

    h.store.enqueue(snapshot_id, JobKind::Consolidate).await.unwrap();
    let result = h.worker("w1").poll_once().await.unwrap();

    assert!(matches!(
        result,
        PollResult::Processed(PipelineOutcome::Completed { consolidated: true, .. })
    ));
    assert_eq!(h.strategist.calls(), 0);
    assert_eq!(h.consolidator.calls(), 1);

    let record = h.store.strategy(snapshot_id).unwrap();
    assert_eq!(record.status, StrategyStatus::Ok);
    assert!(record.error_message.is_none());
}

#[tokio::test]
async fn test_consolidate_job_without_stage_a_is_validation_error() {
    let h = Harness::new();
    let snapshot_id = h.seed(true);

    h.store.enqueue(snapshot_id, JobKind::Consolidate).await.unwrap();
    let result = h.worker("w1").poll_once().await.unwrap();

    match result {
        PollResult::Failed(message) => assert!(message.contains("strategist output not available")),
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(h.total_calls(), 0);
    assert_eq!(h.store.jobs()[0].status, JobStatus::Error);
}

#[tokio::test]
async fn test_missing_snapshot_fails_before_any_call() {
    let h = Harness::new();
    let snapshot_id = uuid::Uuid::new_v4();

    h.store.enqueue(snapshot_id, JobKind::Full).await.unwrap();
    let result = h.worker("w1").poll_once().await.unwrap();

    assert!(matches!(result, PollResult::Failed(ref m) if m.contains("not found")));
    assert_eq!(h.total_calls(), 0);
    assert_eq!(h.store.strategy(snapshot_id).unwrap().status, StrategyStatus::Failed);
}

#[tokio::test]
async fn test_short_strategist_output_is_rejected() {
    let h = Harness::with_providers(
        ScriptedProvider::replying("anthropic", "claude-sonnet-4-20250514", "Too short."),
        ScriptedProvider::replying("google", "gemini-2.0-flash-001", FINAL_TEXT),
        ScriptedProvider::replying("openai", "gpt-5", &common::plan_json(4)),
    );
    let snapshot_id = h.seed(true);

    h.store.enqueue(snapshot_id, JobKind::Full).await.unwrap();
    let result = h.worker("w1").poll_once().await.unwrap();

    assert!(matches!(result, PollResult::Failed(ref m) if m.contains("degenerate")));
    assert_eq!(h.consolidator.calls(), 0);

    let record = h.store.strategy(snapshot_id).unwrap();
    assert_eq!(record.status, StrategyStatus::Failed);
    assert!(!record.has_stage_a());

    // The failed call is still logged, without a snapshot link
    let calls = h.store.model_calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].snapshot_id.is_none());
    assert!(!calls[0].success);
    assert!(calls[0].error_message.as_deref().unwrap().contains("chars, expected at least 100"));
}

#[tokio::test]
async fn test_blank_consolidator_output_fails_job_and_record() {
    let h = Harness::with_providers(
        ScriptedProvider::replying("anthropic", "claude-sonnet-4-20250514", STRATEGY_TEXT),
        ScriptedProvider::replying("google", "gemini-2.0-flash-001", "  \n "),
        ScriptedProvider::replying("openai", "gpt-5", &common::plan_json(4)),
    );
    let snapshot_id = h.seed(true);

    h.store.enqueue(snapshot_id, JobKind::Full).await.unwrap();
    let result = h.worker("w1").poll_once().await.unwrap();

    assert!(matches!(result, PollResult::Failed(ref m) if m.contains("empty output")));
    assert_eq!(h.store.jobs()[0].status, JobStatus::Error);

    let record = h.store.strategy(snapshot_id).unwrap();
    assert_eq!(record.status, StrategyStatus::Failed);
    assert!(record.final_output.is_none());
    assert!(record.has_stage_a());

    assert_eq!(h.planner.calls(), 0);
    assert!(h.published_on("result_ready").is_empty());

    // The blank reply counts as a failed consolidator call
    let calls = h.store.model_calls();
    let consolidator_calls: Vec<_> = calls.iter().filter(|c| c.provider == "google").collect();
    assert_eq!(consolidator_calls.len(), 1);
    assert!(!consolidator_calls[0].success);
    assert!(consolidator_calls[0].error_message.as_deref().unwrap().contains("empty output"));
}

#[tokio::test]
async fn test_unusable_ranking_plan_is_logged_as_failed_call() {
    let h = Harness::with_providers(
        ScriptedProvider::replying("anthropic", "claude-sonnet-4-20250514", STRATEGY_TEXT),
        ScriptedProvider::replying("google", "gemini-2.0-flash-001", FINAL_TEXT),
        ScriptedProvider::replying("openai", "gpt-5", "I could not find any venues."),
    );
    let snapshot_id = h.seed(true);

    h.store.enqueue(snapshot_id, JobKind::Full).await.unwrap();
    h.worker("w1").poll_once().await.unwrap();

    let calls = h.store.model_calls();
    assert_eq!(calls.iter().filter(|c| c.success).count(), 2);
    let planner_call = calls.iter().find(|c| c.provider == "openai").unwrap();
    assert!(!planner_call.success);
    assert!(planner_call.error_message.as_deref().unwrap().contains("unparseable ranking JSON"));
}

#[tokio::test]
async fn test_consolidator_error_marks_both_records() {
    let h = Harness::with_providers(
        ScriptedProvider::replying("anthropic", "claude-sonnet-4-20250514", STRATEGY_TEXT),
        ScriptedProvider::failing("google", "gemini-2.0-flash-001", "HTTP 400: bad request"),
        ScriptedProvider::replying("openai", "gpt-5", &common::plan_json(4)),
    );
    let snapshot_id = h.seed(true);

    h.store.enqueue(snapshot_id, JobKind::Full).await.unwrap();
    h.worker("w1").poll_once().await.unwrap();

    let job = &h.store.jobs()[0];
    assert_eq!(job.status, JobStatus::Error);
    assert!(job.error_message.as_deref().unwrap().contains("consolidator provider call failed"));
    assert_eq!(h.store.strategy(snapshot_id).unwrap().status, StrategyStatus::Failed);

    let failed_calls: Vec<_> = h.store.model_calls().into_iter().filter(|c| !c.success).collect();
    assert_eq!(failed_calls.len(), 1);
    assert_eq!(failed_calls[0].snapshot_id, Some(snapshot_id));
}

#[tokio::test]
async fn test_ranking_failure_keeps_job_successful() {
    let h = Harness::with_providers(
        ScriptedProvider::replying("anthropic", "claude-sonnet-4-20250514", STRATEGY_TEXT),
        ScriptedProvider::replying("google", "gemini-2.0-flash-001", FINAL_TEXT),
        ScriptedProvider::replying("openai", "gpt-5", &common::plan_json(2)),
    );
    let snapshot_id = h.seed(true);

    h.store.enqueue(snapshot_id, JobKind::Full).await.unwrap();
    let result = h.worker("w1").poll_once().await.unwrap();

    assert!(matches!(
        result,
        PollResult::Processed(PipelineOutcome::Completed { ranking: RankingStatus::Failed, .. })
    ));
    assert_eq!(h.store.jobs()[0].status, JobStatus::Ok);
    assert_eq!(h.store.strategy(snapshot_id).unwrap().status, StrategyStatus::Ok);
    assert!(h.store.ranking(snapshot_id).is_none());
    assert!(h.published_on("result_ready").is_empty());
}

#[tokio::test]
async fn test_lagging_reference_degrades_model_call_log_only() {
    let h = Harness::new();
    let snapshot_id = h.seed(true);
    h.store.lag_reference_inserts(5);

    h.store.enqueue(snapshot_id, JobKind::Full).await.unwrap();
    h.worker("w1").poll_once().await.unwrap();

    assert_eq!(h.store.jobs()[0].status, JobStatus::Ok);

    let calls = h.store.model_calls();
    assert_eq!(calls.len(), 3);
    let degraded: Vec<_> = calls.iter().filter(|c| c.reference_degraded).collect();
    assert_eq!(degraded.len(), 1);
    assert!(degraded[0].snapshot_id.is_none());
}

/// Delegates to the memory store but cannot mark jobs ok.
struct CompleteFails(Arc<MemoryStore>);

#[async_trait]
impl JobStore for CompleteFails {
    async fn enqueue(&self, snapshot_id: Uuid, kind: JobKind) -> Result<EnqueueOutcome, StoreError> {
        self.0.enqueue(snapshot_id, kind).await
    }

    async fn claim_next(&self, worker_id: &str) -> Result<Option<Job>, StoreError> {
        self.0.claim_next(worker_id).await
    }

    async fn complete(&self, _job_id: Uuid) -> Result<bool, StoreError> {
        Err(StoreError::Conflict("connection reset".into()))
    }

    async fn fail(&self, job_id: Uuid, message: &str) -> Result<bool, StoreError> {
        self.0.fail(job_id, message).await
    }

    async fn find(&self, job_id: Uuid) -> Result<Option<Job>, StoreError> {
        self.0.find(job_id).await
    }

    async fn running_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<Job>, StoreError> {
        self.0.running_since(cutoff).await
    }
}

#[tokio::test]
async fn test_completion_write_failure_leaves_job_for_stale_sweep() {
    let h = Harness::new();
    let snapshot_id = h.seed(true);
    h.store.enqueue(snapshot_id, JobKind::Full).await.unwrap();

    let mut ctx = h.orchestrator.context().clone();
    ctx.jobs = Arc::new(CompleteFails(h.store.clone()));
    let worker = JobWorker::new(
        Arc::new(PipelineOrchestrator::new(ctx)),
        "w1",
        Duration::from_millis(10),
    );

    let result = worker.poll_once().await.unwrap();
    assert!(matches!(result, PollResult::Failed(ref m) if m.contains("connection reset")));

    // The strategy is final; only the job row is stuck
    assert_eq!(h.store.strategy(snapshot_id).unwrap().status, StrategyStatus::Ok);
    let job = &h.store.jobs()[0];
    assert_eq!(job.status, JobStatus::Running);
    let stale = h.store.running_since(Utc::now() + chrono::Duration::seconds(1)).await.unwrap();
    assert_eq!(stale.len(), 1);
}
