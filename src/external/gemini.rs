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

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<i32>,
    candidates_token_count: Option<i32>,
}

/// Google Gemini `generateContent` provider
pub struct GeminiProvider {
    api_key: String,
    model: String,
    temperature: f32,
    base_url: String,
    client: Client,
}

impl GeminiProvider {
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

    async fn send(&self, request: &GenerateRequest) -> Result<GenerateResponse, LlmError> {
        let response = self
            .client
            .post(format!("{}/models/{}:generateContent", self.base_url, self.model))
            .query(&[("key", self.api_key.as_str())])
            .json(request)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, error_body(response).await));
        }

        response
            .json::<GenerateResponse>()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }
}

fn first_candidate_text(response: &GenerateResponse) -> Option<String> {
    let content = response.candidates.first()?.content.as_ref()?;
    let text: String = content
        .parts
        .iter()
        .filter_map(|p| p.text.as_deref())
        .collect();
    Some(text)
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn provider_name(&self) -> &str {
        "google"
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

        let request = GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: Some(system_prompt.to_string()),
                }],
            },
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(user_prompt.to_string()),
                }],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: max_tokens,
                temperature: self.temperature,
            },
        };

        let started = Instant::now();
        let response = with_transport_retry("Gemini", || self.send(&request)).await?;
        let latency_ms = started.elapsed().as_millis() as i64;

        let content = first_candidate_text(&response)
            .ok_or_else(|| LlmError::InvalidResponse("No candidates in response".to_string()))?;

        let usage = response.usage_metadata.as_ref();
        Ok(ProviderResponse {
            content,
            tokens_in: usage.and_then(|u| u.prompt_token_count),
            tokens_out: usage.and_then(|u| u.candidates_token_count),
            latency_ms,
        })
    }
}
