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

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<Message>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: i32,
    output_tokens: i32,
}

/// Anthropic messages API provider (Claude)
pub struct AnthropicProvider {
    api_key: String,
    model: String,
    temperature: f32,
    base_url: String,
    client: Client,
}

impl AnthropicProvider {
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

    async fn send(&self, request: &MessagesRequest) -> Result<MessagesResponse, LlmError> {
        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
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
            .json::<MessagesResponse>()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }
}

/// Concatenate every text block; tool or thinking blocks are ignored.
fn collect_text(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .filter(|b| b.kind == "text")
        .filter_map(|b| b.text.as_deref())
        .collect::<Vec<_>>()
        .join("")
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn provider_name(&self) -> &str {
        "anthropic"
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

        let request = MessagesRequest {
            model: self.model.clone(),
            max_tokens,
            system: system_prompt.to_string(),
            messages: vec![Message {
                role: "user",
                content: user_prompt.to_string(),
            }],
            temperature: self.temperature,
        };

        let started = Instant::now();
        let response = with_transport_retry("Anthropic", || self.send(&request)).await?;
        let latency_ms = started.elapsed().as_millis() as i64;

        if response.content.is_empty() {
            return Err(LlmError::InvalidResponse("No content blocks in response".to_string()));
        }

        Ok(ProviderResponse {
            content: collect_text(&response.content),
            tokens_in: response.usage.as_ref().map(|u| u.input_tokens),
            tokens_out: response.usage.as_ref().map(|u| u.output_tokens),
            latency_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_text_skips_non_text_blocks() {
        let body = r#"{
            "content": [
                {"type": "thinking", "thinking": "..."},
                {"type": "text", "text": "Airport demand "},
                {"type": "text", "text": "is rising."}
            ],
            "usage": {"input_tokens": 10, "output_tokens": 4}
        }"#;
        let parsed: MessagesResponse = serde_json::from_str(body).unwrap();
        assert_eq!(collect_text(&parsed.content), "Airport demand is rising.");
        assert_eq!(parsed.usage.unwrap().output_tokens, 4);
    }
}
