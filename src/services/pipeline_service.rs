use tracing::{error, info, warn};

use crate::errors::PipelineError;
use crate::models::{Job, SnapshotContext, Stage, StrategyRecord};
use crate::services::consolidation_service::{Consolidation, ConsolidationService};
use crate::services::pipeline_context::PipelineContext;
use crate::services::prompts;
use crate::services::ranking_service::{RankingService, RankingStatus};

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// The record was already `ok`; nothing was called.
    AlreadyComplete,
    Completed {
        version: i64,
        /// `false` when a concurrent path wrote the final output first.
        consolidated: bool,
        ranking: RankingStatus,
    },
}

/// Drives a claimed job through its stages, leaving resumable state behind
/// every step.
pub struct PipelineOrchestrator {
    ctx: PipelineContext,
    consolidation: ConsolidationService,
    ranking: RankingService,
}

impl PipelineOrchestrator {
    pub fn new(ctx: PipelineContext) -> Self {
        Self {
            consolidation: ConsolidationService::new(ctx.clone()),
            ranking: RankingService::new(ctx.clone()),
            ctx,
        }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    pub fn consolidation(&self) -> &ConsolidationService {
        &self.consolidation
    }

    pub fn ranking(&self) -> &RankingService {
        &self.ranking
    }

    /// Run a claimed job and move it to its terminal state. On failure both
    /// the job and the strategy record carry the error message.
    pub async fn process(&self, job: &Job) -> Result<PipelineOutcome, PipelineError> {
        info!(
            "🏃 Processing {} job {} for snapshot {}",
            job.kind, job.id, job.snapshot_id
        );

        match self.run(job).await {
            Ok(outcome) => {
                let completed = self.ctx.jobs.complete(job.id).await.map_err(|e| {
                    error!(
                        "Failed to mark job {} (snapshot {}) ok; it stays running until the stale-job sweep: {}",
                        job.id, job.snapshot_id, e
                    );
                    e
                })?;
                if !completed {
                    warn!("Job {} was no longer running when completed", job.id);
                }
                Ok(outcome)
            }
            Err(e) => {
                let message = e.to_string();
                if e.is_validation() {
                    warn!("⚠️ Job {} cannot run yet: {}", job.id, message);
                } else {
                    error!("❌ Job {} failed: {}", job.id, message);
                }

                if let Err(store_err) = self.ctx.strategies.mark_failed(job.snapshot_id, &message).await {
                    error!("Failed to mark strategy {} failed: {}", job.snapshot_id, store_err);
                }
                if let Err(store_err) = self.ctx.jobs.fail(job.id, &message).await {
                    error!("Failed to mark job {} as error: {}", job.id, store_err);
                }
                Err(e)
            }
        }
    }

    async fn run(&self, job: &Job) -> Result<PipelineOutcome, PipelineError> {
        let snapshot_id = job.snapshot_id;
        let existing = self.ctx.strategies.find_strategy(snapshot_id).await?;

        if existing.as_ref().map(|r| r.is_complete()).unwrap_or(false) {
            info!("Snapshot {} already has a final strategy, skipping", snapshot_id);
            return Ok(PipelineOutcome::AlreadyComplete);
        }

        let snapshot = self
            .ctx
            .sources
            .snapshot(snapshot_id)
            .await?
            .ok_or_else(|| PipelineError::MissingSnapshot(snapshot_id.to_string()))?;

        let record = match existing {
            Some(record) if record.has_stage_a() => {
                info!("Reusing strategist output for snapshot {}", snapshot_id);
                record
            }
            existing if job.kind.runs(Stage::Strategist) => {
                self.run_strategist(&snapshot, existing.is_some()).await?
            }
            _ => return Err(PipelineError::MissingStrategy(snapshot_id.to_string())),
        };

        let briefing = self
            .ctx
            .sources
            .briefing(snapshot_id)
            .await?
            .ok_or_else(|| PipelineError::MissingBriefing(snapshot_id.to_string()))?;

        let consolidation = self
            .consolidation
            .consolidate(&record, &snapshot, &briefing)
            .await?;
        let consolidated = matches!(consolidation, Consolidation::Written(_));
        let record = consolidation.record();

        let ranking = if job.kind.runs(Stage::Ranking) {
            self.ranking.ensure_and_announce(record, &snapshot).await
        } else {
            RankingStatus::Existing
        };
        if !ranking.is_available() {
            warn!(
                "Snapshot {} finalized without a ranking; no {} announcement",
                snapshot_id, self.ctx.settings.result_channel
            );
        }

        Ok(PipelineOutcome::Completed {
            version: record.version,
            consolidated,
            ranking,
        })
    }

    async fn run_strategist(
        &self,
        snapshot: &SnapshotContext,
        record_exists: bool,
    ) -> Result<StrategyRecord, PipelineError> {
        let snapshot_id = snapshot.snapshot_id;
        let model = &self.ctx.providers.strategist;
        let prompt = prompts::strategist(snapshot);
        let call = self.ctx.invoke(Stage::Strategist, model, snapshot_id, &prompt).await;

        let response = match call.result {
            Ok(response) => response,
            Err(e) => {
                self.ctx.recorder.record(call.log, record_exists).await;
                return Err(PipelineError::provider(Stage::Strategist, e));
            }
        };

        let output = response.content.trim();
        let min_chars = self.ctx.settings.strategist_min_chars;
        if output.chars().count() < min_chars {
            let err = PipelineError::degenerate(
                Stage::Strategist,
                format!("{} chars, expected at least {}", output.chars().count(), min_chars),
            );
            self.ctx.recorder.record(call.log.rejected(&err), record_exists).await;
            return Err(err);
        }

        let saved = self
            .ctx
            .strategies
            .save_stage_a(snapshot_id, output, &model.provider.route())
            .await?;
        self.ctx.recorder.record(call.log, true).await;

        match saved {
            Some(record) => {
                info!(
                    "✅ Strategist output saved for snapshot {} ({} chars)",
                    snapshot_id,
                    output.len()
                );
                Ok(record)
            }
            None => self
                .ctx
                .strategies
                .find_strategy(snapshot_id)
                .await?
                .ok_or_else(|| PipelineError::MissingStrategy(snapshot_id.to_string())),
        }
    }
}
