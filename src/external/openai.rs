use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::LlmError;
use crate::external::llm_provider::{
    error_body, map_send_error, status_error, with_transport_retry, LlmProvider,
    ProviderResponse, ProviderSettings,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    max_completion_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Clone)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: i32,
    completion_tokens: i32,
}

/// OpenAI chat completions provider
pub struct OpenAiProvider {
    api_key: String,
    model: String,
    temperature: f32,
    base_url: String,
    client: Client,
}

impl OpenAiProvider {
    pub fn new(settings: &ProviderSettings) -> Result<Self, LlmError> {
        Ok(Self {
            api_key: settings.require_api_key()?,
            model: settings.model.clone(),
            temperature: settings.temperature,
            base_url: settings
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client: settings.http_client()?,
        })
    }

    /// Reasoning models reject a custom temperature.
    fn is_reasoning_model(model: &str) -> bool {
        model.starts_with("o3") || model.starts_with("o4") || model.starts_with("gpt-5")
    }

    fn build_request(&self, system_prompt: &str, user_prompt: &str, max_tokens: u32) -> OpenAiRequest {
        OpenAiRequest {
            model: self.model.clone(),
            messages: vec![
                OpenAiMessage {
                    role: "system".to_string(),
                    content: system_prompt.to_string(),
                },
                OpenAiMessage {
                    role: "user".to_string(),
                    content: user_prompt.to_string(),
                },
            ],
            max_completion_tokens: max_tokens,
            temperature: if Self::is_reasoning_model(&self.model) {
                None
            } else {
                Some(self.temperature)
            },
        }
    }

    async fn call_openai(&self, request: &OpenAiRequest) -> Result<OpenAiResponse, LlmError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, error_body(response).await));
        }

        response
            .json::<OpenAiResponse>()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn call(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u32,
    ) -> Result<ProviderResponse, LlmError> {
        info!("Generating completion (model: {}, max_tokens: {})", self.model, max_tokens);

        let request = self.build_request(system_prompt, user_prompt, max_tokens);
        let started = Instant::now();
        let response = with_transport_retry("OpenAI", || self.call_openai(&request)).await?;
        let latency_ms = started.elapsed().as_millis() as i64;

        let content = response
            .choices
            .first()
            .ok_or_else(|| LlmError::InvalidResponse("No choices in response".to_string()))?
            .message
            .content
            .clone()
            .unwrap_or_default();

        let (tokens_in, tokens_out) = match response.usage {
            Some(usage) => {
                info!(
                    "OpenAI completion generated. Tokens: {} prompt + {} completion ({}ms)",
                    usage.prompt_tokens, usage.completion_tokens, latency_ms
                );
                (Some(usage.prompt_tokens), Some(usage.completion_tokens))
            }
            None => (None, None),
        };

        Ok(ProviderResponse {
            content,
            tokens_in,
            tokens_out,
            latency_ms,
        })
    }
}
