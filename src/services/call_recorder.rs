use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::LlmError;
use crate::external::llm_provider::{LlmProvider, ProviderResponse};
use crate::models::{content_hash, CreateModelCall, ModelCall, Stage};
use crate::services::retry_policy::{RetryOutcome, RetryPolicy};
use crate::store::ModelCallLog;

/// Writes provenance rows for provider calls. Logging never fails a stage:
/// errors are reported and swallowed.
#[derive(Clone)]
pub struct CallRecorder {
    log: Arc<dyn ModelCallLog>,
    retry: RetryPolicy,
}

impl CallRecorder {
    pub fn new(log: Arc<dyn ModelCallLog>, retry: RetryPolicy) -> Self {
        Self { log, retry }
    }

    /// Build the row for one call. `latency_ms` is used when the provider
    /// returned nothing to read it from.
    pub fn draft(
        stage: Stage,
        provider: &dyn LlmProvider,
        snapshot_id: Uuid,
        prompt: &str,
        result: &Result<ProviderResponse, LlmError>,
        latency_ms: i64,
    ) -> CreateModelCall {
        let (response_hash, latency_ms, tokens_in, tokens_out, error_message) = match result {
            Ok(response) => (
                Some(content_hash(&response.content)),
                response.latency_ms,
                response.tokens_in,
                response.tokens_out,
                None,
            ),
            Err(e) => (None, latency_ms, None, None, Some(e.to_string())),
        };

        CreateModelCall {
            snapshot_id: Some(snapshot_id),
            stage,
            provider: provider.provider_name().to_string(),
            model: provider.model_name().to_string(),
            prompt_hash: content_hash(prompt),
            response_hash,
            latency_ms,
            tokens_in,
            tokens_out,
            success: result.is_ok(),
            error_message,
            reference_degraded: false,
        }
    }

    /// Persist a call row. Pass `referenced = false` when no strategy row
    /// exists for the snapshot yet; the row is then written unlinked.
    pub async fn record(&self, mut call: CreateModelCall, referenced: bool) -> Option<ModelCall> {
        if !referenced {
            call.snapshot_id = None;
        }

        if call.snapshot_id.is_none() {
            return match self.log.record_call(&call).await {
                Ok(row) => Some(row),
                Err(e) => {
                    warn!("Failed to log {} call: {}", call.stage, e);
                    None
                }
            };
        }

        let log = &self.log;
        let unlinked = call.without_reference();
        let outcome = self
            .retry
            .execute(
                "model call log",
                || log.record_call(&call),
                || log.record_call(&unlinked),
            )
            .await;

        match outcome {
            Ok(RetryOutcome::Completed { value, attempts }) => {
                debug!("Logged {} call {} after {} attempt(s)", call.stage, value.id, attempts);
                Some(value)
            }
            Ok(RetryOutcome::Degraded { value, warning }) => {
                warn!("Logged {} call {} without reference: {}", call.stage, value.id, warning);
                Some(value)
            }
            Err(e) => {
                warn!("Failed to log {} call: {}", call.stage, e);
                None
            }
        }
    }
}
