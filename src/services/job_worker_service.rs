use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::errors::StoreError;
use crate::services::pipeline_service::{PipelineOrchestrator, PipelineOutcome};

/// Result of one poll of the claim queue.
#[derive(Debug, PartialEq)]
pub enum PollResult {
    Empty,
    Processed(PipelineOutcome),
    Failed(String),
}

/// Claim loop: take one queued job at a time and run it to a terminal state.
pub struct JobWorker {
    orchestrator: Arc<PipelineOrchestrator>,
    worker_id: String,
    poll_interval: Duration,
}

impl JobWorker {
    pub fn new(orchestrator: Arc<PipelineOrchestrator>, worker_id: &str, poll_interval: Duration) -> Self {
        Self {
            orchestrator,
            worker_id: worker_id.to_string(),
            poll_interval,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Claim and process at most one job.
    pub async fn poll_once(&self) -> Result<PollResult, StoreError> {
        let Some(job) = self
            .orchestrator
            .context()
            .jobs
            .claim_next(&self.worker_id)
            .await?
        else {
            return Ok(PollResult::Empty);
        };

        Ok(match self.orchestrator.process(&job).await {
            Ok(outcome) => {
                info!("✅ Job {} finished: {:?}", job.id, outcome);
                PollResult::Processed(outcome)
            }
            Err(e) => PollResult::Failed(e.to_string()),
        })
    }

    /// Poll until the token is cancelled. A job already claimed always runs
    /// to completion; cancellation is only observed between jobs.
    pub async fn run(self, token: CancellationToken) {
        info!(
            "🚀 Job worker {} polling every {:?}",
            self.worker_id, self.poll_interval
        );

        while !token.is_cancelled() {
            let idle = match self.poll_once().await {
                Ok(PollResult::Empty) => true,
                Ok(_) => false,
                Err(e) => {
                    error!("Claim failed on worker {}: {}", self.worker_id, e);
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
            }
        }

        info!("👋 Job worker {} stopped claiming", self.worker_id);
    }
}
