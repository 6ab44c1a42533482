use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Stage;

/// Provenance record for one provider call.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ModelCall {
    pub id: Uuid,
    pub snapshot_id: Option<Uuid>,
    pub stage: Stage,
    pub provider: String,
    pub model: String,
    pub prompt_hash: String,
    pub response_hash: Option<String>,
    pub latency_ms: i64,
    pub tokens_in: Option<i32>,
    pub tokens_out: Option<i32>,
    pub success: bool,
    pub error_message: Option<String>,
    /// Set when the row was written without its snapshot reference.
    pub reference_degraded: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for logging a provider call
#[derive(Debug, Clone)]
pub struct CreateModelCall {
    pub snapshot_id: Option<Uuid>,
    pub stage: Stage,
    pub provider: String,
    pub model: String,
    pub prompt_hash: String,
    pub response_hash: Option<String>,
    pub latency_ms: i64,
    pub tokens_in: Option<i32>,
    pub tokens_out: Option<i32>,
    pub success: bool,
    pub error_message: Option<String>,
    pub reference_degraded: bool,
}

impl CreateModelCall {
    /// The same record with the snapshot reference dropped.
    pub fn without_reference(&self) -> Self {
        Self {
            snapshot_id: None,
            reference_degraded: true,
            ..self.clone()
        }
    }

    /// Mark a call whose reply arrived but could not be used.
    pub fn rejected(mut self, reason: impl ToString) -> Self {
        self.success = false;
        self.error_message = Some(reason.to_string());
        self
    }
}

impl ModelCall {
    pub fn from_create(input: CreateModelCall) -> Self {
        Self {
            id: Uuid::new_v4(),
            snapshot_id: input.snapshot_id,
            stage: input.stage,
            provider: input.provider,
            model: input.model,
            prompt_hash: input.prompt_hash,
            response_hash: input.response_hash,
            latency_ms: input.latency_ms,
            tokens_in: input.tokens_in,
            tokens_out: input.tokens_out,
            success: input.success,
            error_message: input.error_message,
            reference_degraded: input.reference_degraded,
            created_at: Utc::now(),
        }
    }
}

/// Aggregate call metrics for one stage over a time window.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ModelCallStats {
    pub stage: String,
    pub total_calls: i64,
    pub successful_calls: i64,
    pub avg_latency_ms: Option<f64>,
    pub max_latency_ms: Option<i64>,
    pub total_tokens_in: Option<i64>,
    pub total_tokens_out: Option<i64>,
}

impl ModelCallStats {
    pub fn success_rate(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            self.successful_calls as f64 / self.total_calls as f64
        }
    }
}

/// SHA-256 hex digest used to fingerprint prompts and responses.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
