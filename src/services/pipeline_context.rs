use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use crate::config::{PipelineSettings, WorkerConfig};
use crate::errors::LlmError;
use crate::external::build_provider;
use crate::external::llm_provider::{LlmProvider, ProviderResponse, ProviderSettings};
use crate::models::{CreateModelCall, Stage};
use crate::services::call_recorder::CallRecorder;
use crate::services::prompts::Prompt;
use crate::services::retry_policy::RetryPolicy;
use crate::store::{ContextSource, JobStore, ModelCallLog, Publisher, RankingStore, StrategyStore};

/// A provider bound to the token budget of the stage it serves.
#[derive(Clone)]
pub struct StageModel {
    pub provider: Arc<dyn LlmProvider>,
    pub max_tokens: u32,
}

impl StageModel {
    pub fn new(provider: Arc<dyn LlmProvider>, max_tokens: u32) -> Self {
        Self { provider, max_tokens }
    }

    fn from_settings(settings: &ProviderSettings) -> Result<Self, LlmError> {
        Ok(Self::new(build_provider(settings)?, settings.max_tokens))
    }
}

#[derive(Clone)]
pub struct ProviderSet {
    pub strategist: StageModel,
    pub consolidator: StageModel,
    pub planner: StageModel,
}

impl ProviderSet {
    pub fn from_config(config: &WorkerConfig) -> Result<Self, LlmError> {
        Ok(Self {
            strategist: StageModel::from_settings(&config.strategist)?,
            consolidator: StageModel::from_settings(&config.consolidator)?,
            planner: StageModel::from_settings(&config.planner)?,
        })
    }
}

/// Result of one provider call plus the provenance row describing it.
pub struct StageCall {
    pub result: Result<ProviderResponse, LlmError>,
    pub log: CreateModelCall,
}

/// Everything the pipeline entry points share.
#[derive(Clone)]
pub struct PipelineContext {
    pub jobs: Arc<dyn JobStore>,
    pub strategies: Arc<dyn StrategyStore>,
    pub sources: Arc<dyn ContextSource>,
    pub rankings: Arc<dyn RankingStore>,
    pub publisher: Arc<dyn Publisher>,
    pub recorder: CallRecorder,
    pub providers: ProviderSet,
    pub settings: PipelineSettings,
}

impl PipelineContext {
    /// Wire every seam to the same backing store.
    pub fn new<S>(store: Arc<S>, providers: ProviderSet, settings: PipelineSettings) -> Self
    where
        S: JobStore + StrategyStore + ContextSource + RankingStore + ModelCallLog + Publisher + 'static,
    {
        let retry = RetryPolicy::new(settings.retry_max_attempts, settings.retry_base_delay);
        Self {
            jobs: store.clone(),
            strategies: store.clone(),
            sources: store.clone(),
            rankings: store.clone(),
            publisher: store.clone(),
            recorder: CallRecorder::new(store, retry),
            providers,
            settings,
        }
    }

    pub(crate) async fn invoke(
        &self,
        stage: Stage,
        model: &StageModel,
        snapshot_id: Uuid,
        prompt: &Prompt,
    ) -> StageCall {
        let started = Instant::now();
        let result = model
            .provider
            .call(&prompt.system, &prompt.user, model.max_tokens)
            .await;
        let elapsed_ms = started.elapsed().as_millis() as i64;

        let log = CallRecorder::draft(
            stage,
            model.provider.as_ref(),
            snapshot_id,
            &format!("{}\n\n{}", prompt.system, prompt.user),
            &result,
            elapsed_ms,
        );
        StageCall { result, log }
    }
}
