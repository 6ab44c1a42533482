use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{error, warn};

use crate::errors::LlmError;

const MAX_TRANSPORT_ATTEMPTS: u32 = 3;
const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Text returned by a provider plus call metadata.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub content: String,
    pub tokens_in: Option<i32>,
    pub tokens_out: Option<i32>,
    pub latency_ms: i64,
}

/// Settings for one pipeline stage's provider
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub provider: String,
    pub model: String,
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
    /// Override for the provider's API root (proxies, local gateways).
    pub base_url: Option<String>,
}

impl ProviderSettings {
    pub fn new(provider: &str, model: &str) -> Self {
        Self {
            provider: provider.to_string(),
            model: model.to_string(),
            api_key: None,
            max_tokens: 4096,
            temperature: 0.7,
            timeout: Duration::from_secs(180),
            base_url: None,
        }
    }

    pub fn require_api_key(&self) -> Result<String, LlmError> {
        match self.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => Ok(key.to_string()),
            _ => Err(LlmError::NotConfigured(format!(
                "API key for provider '{}' is not set",
                self.provider
            ))),
        }
    }

    pub fn http_client(&self) -> Result<reqwest::Client, LlmError> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| LlmError::NotConfigured(format!("failed to build HTTP client: {}", e)))
    }
}

/// Opaque text-in/text-out provider. Implementations are interchangeable.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn provider_name(&self) -> &str;

    fn model_name(&self) -> &str;

    async fn call(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u32,
    ) -> Result<ProviderResponse, LlmError>;

    /// Provenance label, e.g. `anthropic:claude-sonnet-4-20250514`.
    fn route(&self) -> String {
        format!("{}:{}", self.provider_name(), self.model_name())
    }
}

/// Retry transport-level failures with exponential backoff: 1s, 2s.
pub(crate) async fn with_transport_retry<T, F, Fut>(
    provider: &str,
    mut attempt: F,
) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut retry_count = 0;
    let mut delay = INITIAL_RETRY_DELAY;

    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && retry_count + 1 < MAX_TRANSPORT_ATTEMPTS => {
                retry_count += 1;
                warn!(
                    "{} call failed (attempt {}/{}): {}. Retrying in {:?}...",
                    provider, retry_count, MAX_TRANSPORT_ATTEMPTS, e, delay
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(e) => {
                error!("{} call failed after {} attempt(s): {}", provider, retry_count + 1, e);
                return Err(e);
            }
        }
    }
}

pub(crate) fn map_send_error(e: reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout
    } else {
        LlmError::NetworkError(e.to_string())
    }
}

/// Classify a non-success HTTP status. Server errors are treated as transient.
pub(crate) fn status_error(status: StatusCode, body: String) -> LlmError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        LlmError::RateLimited
    } else if status.is_server_error() {
        LlmError::NetworkError(format!("HTTP {}: {}", status, body))
    } else {
        LlmError::ApiError(format!("HTTP {}: {}", status, body))
    }
}

pub(crate) async fn error_body(response: reqwest::Response) -> String {
    response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string())
}
