use axum::http::StatusCode;
use axum::response::IntoResponse;
use thiserror::Error;

use crate::models::Stage;

/// Postgres SQLSTATE for `foreign_key_violation`.
const FOREIGN_KEY_VIOLATION: &str = "23503";
/// Postgres SQLSTATE for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Db(StoreError),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("External error: {0}")]
    External(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg).into_response(),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            AppError::External(msg) => (StatusCode::BAD_GATEWAY, msg).into_response(),
            AppError::Db(e) => {
                tracing::error!("Database error in admin route: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(value: sqlx::Error) -> Self {
        AppError::Db(StoreError::from(value))
    }
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        AppError::Db(value)
    }
}

/// Errors returned by a text-generation provider adapter.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("provider is not configured: {0}")]
    NotConfigured(String),
    #[error("request timed out")]
    Timeout,
    #[error("rate limited by provider")]
    RateLimited,
    #[error("network error: {0}")]
    NetworkError(String),
    #[error("provider API error: {0}")]
    ApiError(String),
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// Whether a fresh HTTP attempt may succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::Timeout | LlmError::RateLimited | LlmError::NetworkError(_)
        )
    }
}

/// Persistence errors shared by every store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A referenced row is not visible yet (replication lag between tables).
    #[error("referenced row not visible yet: {0}")]
    MissingReference(String),
    /// A uniqueness constraint rejected the write.
    #[error("conflicting row: {0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Db(sqlx::Error),
}

impl StoreError {
    pub fn is_missing_reference(&self) -> bool {
        matches!(self, StoreError::MissingReference(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(value: sqlx::Error) -> Self {
        let code = value
            .as_database_error()
            .and_then(|db| db.code().map(|c| c.into_owned()));

        match code.as_deref() {
            Some(FOREIGN_KEY_VIOLATION) => StoreError::MissingReference(value.to_string()),
            Some(UNIQUE_VIOLATION) => StoreError::Conflict(value.to_string()),
            _ => StoreError::Db(value),
        }
    }
}

/// Failure of one pipeline attempt. Every variant is terminal for the attempt.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("snapshot {0} not found")]
    MissingSnapshot(String),
    #[error("briefing not available for snapshot {0}")]
    MissingBriefing(String),
    #[error("strategist output not available for snapshot {0}")]
    MissingStrategy(String),
    #[error("{stage} provider call failed: {source}")]
    Provider {
        stage: Stage,
        #[source]
        source: LlmError,
    },
    #[error("{stage} returned degenerate output: {reason}")]
    DegenerateOutput { stage: Stage, reason: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PipelineError {
    pub fn provider(stage: Stage, source: LlmError) -> Self {
        PipelineError::Provider { stage, source }
    }

    pub fn degenerate(stage: Stage, reason: impl Into<String>) -> Self {
        PipelineError::DegenerateOutput {
            stage,
            reason: reason.into(),
        }
    }

    /// Missing inputs rather than a failed call.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            PipelineError::MissingSnapshot(_)
                | PipelineError::MissingBriefing(_)
                | PipelineError::MissingStrategy(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_llm_errors() {
        assert!(LlmError::Timeout.is_retryable());
        assert!(LlmError::RateLimited.is_retryable());
        assert!(LlmError::NetworkError("reset".into()).is_retryable());
        assert!(!LlmError::ApiError("HTTP 400".into()).is_retryable());
        assert!(!LlmError::InvalidResponse("no choices".into()).is_retryable());
    }

    #[test]
    fn test_missing_briefing_message_names_briefing() {
        let err = PipelineError::MissingBriefing("abc".into());
        assert!(err.to_string().contains("briefing"));
        assert!(err.is_validation());
    }

    #[test]
    fn test_provider_error_is_not_validation() {
        let err = PipelineError::provider(Stage::Consolidator, LlmError::Timeout);
        assert!(!err.is_validation());
        assert_eq!(err.to_string(), "consolidator provider call failed: request timed out");
    }

    #[test]
    fn test_row_not_found_maps_to_db() {
        let err = StoreError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, StoreError::Db(_)));
        assert!(!err.is_missing_reference());
    }
}
