use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::{PipelineError, StoreError};
use crate::models::{BriefingRecord, SnapshotContext, Stage, StrategyRecord};
use crate::services::pipeline_context::PipelineContext;
use crate::services::prompts;

/// Which consolidation inputs are present for a snapshot.
#[derive(Debug, Clone)]
pub struct Readiness {
    pub record: Option<StrategyRecord>,
    pub briefing: Option<BriefingRecord>,
}

impl Readiness {
    /// Stage-A output exists, whatever the record's status.
    pub fn has_strategy(&self) -> bool {
        self.record.as_ref().map(|r| r.has_stage_a()).unwrap_or(false)
    }

    pub fn has_briefing(&self) -> bool {
        self.briefing.is_some()
    }

    pub fn already_consolidated(&self) -> bool {
        self.record.as_ref().map(|r| r.is_complete()).unwrap_or(false)
    }

    pub fn needs_consolidation(&self) -> bool {
        self.has_strategy() && self.has_briefing() && !self.already_consolidated()
    }
}

#[derive(Debug, Clone)]
pub enum Consolidation {
    /// This call wrote the final output.
    Written(StrategyRecord),
    /// Another path got there first; the stored result is kept.
    AlreadyDone(StrategyRecord),
}

impl Consolidation {
    pub fn record(&self) -> &StrategyRecord {
        match self {
            Consolidation::Written(r) | Consolidation::AlreadyDone(r) => r,
        }
    }
}

/// Stage C: merge strategist output with the briefing. Shared by the claim
/// queue and the notification listener.
#[derive(Clone)]
pub struct ConsolidationService {
    ctx: PipelineContext,
}

impl ConsolidationService {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }

    pub async fn readiness(&self, snapshot_id: Uuid) -> Result<Readiness, StoreError> {
        let record = self.ctx.strategies.find_strategy(snapshot_id).await?;
        let briefing = self.ctx.sources.briefing(snapshot_id).await?;
        Ok(Readiness { record, briefing })
    }

    pub async fn consolidate(
        &self,
        record: &StrategyRecord,
        snapshot: &SnapshotContext,
        briefing: &BriefingRecord,
    ) -> Result<Consolidation, PipelineError> {
        let snapshot_id = record.snapshot_id;

        if record.is_complete() {
            return Ok(Consolidation::AlreadyDone(record.clone()));
        }

        let stage_a = record
            .stage_a_output
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| PipelineError::MissingStrategy(snapshot_id.to_string()))?;

        let model = &self.ctx.providers.consolidator;
        let prompt = prompts::consolidator(stage_a, briefing, snapshot);
        let call = self.ctx.invoke(Stage::Consolidator, model, snapshot_id, &prompt).await;

        let response = match call.result {
            Ok(response) => response,
            Err(e) => {
                self.ctx.recorder.record(call.log, true).await;
                return Err(PipelineError::provider(Stage::Consolidator, e));
            }
        };

        let final_output = response.content.trim();
        if final_output.is_empty() {
            let err = PipelineError::degenerate(Stage::Consolidator, "empty output");
            self.ctx.recorder.record(call.log.rejected(&err), true).await;
            return Err(err);
        }
        self.ctx.recorder.record(call.log, true).await;

        let strategist_route = record
            .model_route
            .as_deref()
            .unwrap_or("unknown")
            .split(" -> ")
            .next()
            .unwrap_or("unknown")
            .to_string();
        let route = format!("{} -> {}", strategist_route, model.provider.route());

        match self
            .ctx
            .strategies
            .save_final(snapshot_id, final_output, &route)
            .await?
        {
            Some(saved) => {
                info!(
                    "✅ Consolidated strategy for snapshot {} (version {}, {} chars)",
                    snapshot_id,
                    saved.version,
                    final_output.len()
                );
                Ok(Consolidation::Written(saved))
            }
            None => {
                warn!(
                    "Snapshot {} was consolidated concurrently; keeping the stored result",
                    snapshot_id
                );
                let current = self
                    .ctx
                    .strategies
                    .find_strategy(snapshot_id)
                    .await?
                    .ok_or_else(|| PipelineError::MissingStrategy(snapshot_id.to_string()))?;
                Ok(Consolidation::AlreadyDone(current))
            }
        }
    }
}
