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

const DEFAULT_ENDPOINT: &str = "http://localhost:8000";

#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    prompt: String,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    usage: Option<CompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct CompletionUsage {
    prompt_tokens: Option<i32>,
    completion_tokens: Option<i32>,
}

/// Self-hosted model served behind an OpenAI-style `/v1/completions` endpoint.
/// The API key is optional.
pub struct LocalProvider {
    api_key: Option<String>,
    model: String,
    temperature: f32,
    endpoint: String,
    client: Client,
}

impl LocalProvider {
    pub fn new(settings: &ProviderSettings) -> Result<Self, LlmError> {
        let endpoint = settings
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_ENDPOINT)
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            api_key: settings
                .api_key
                .clone()
                .filter(|key| !key.trim().is_empty()),
            model: settings.model.clone(),
            temperature: settings.temperature,
            endpoint,
            client: settings.http_client()?,
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/completions", self.endpoint)
    }

    /// Completion models take one prompt, so the system prompt goes first.
    fn build_request(&self, system_prompt: &str, user_prompt: &str, max_tokens: u32) -> CompletionRequest {
        CompletionRequest {
            model: self.model.clone(),
            prompt: format!("{}\n\n{}", system_prompt, user_prompt),
            temperature: self.temperature,
            max_tokens,
        }
    }

    async fn call_local(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let mut builder = self.client.post(self.completions_url()).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder.send().await.map_err(map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, error_body(response).await));
        }

        response
            .json::<CompletionResponse>()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl LlmProvider for LocalProvider {
    fn provider_name(&self) -> &str {
        "local"
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
        info!("Generating local completion (model: {}, endpoint: {})", self.model, self.endpoint);

        let request = self.build_request(system_prompt, user_prompt, max_tokens);
        let started = Instant::now();
        let response = with_transport_retry("Local model", || self.call_local(&request)).await?;
        let latency_ms = started.elapsed().as_millis() as i64;

        let content = response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.text)
            .unwrap_or_default();
        let (tokens_in, tokens_out) = response
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((None, None));

        Ok(ProviderResponse {
            content,
            tokens_in,
            tokens_out,
            latency_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builds_without_api_key() {
        let settings = ProviderSettings::new("local", "driver-ft-v2");
        let provider = LocalProvider::new(&settings).unwrap();
        assert!(provider.api_key.is_none());
        assert_eq!(provider.completions_url(), "http://localhost:8000/v1/completions");
    }

    #[test]
    fn test_endpoint_override() {
        let mut settings = ProviderSettings::new("local", "driver-ft-v2");
        settings.base_url = Some("http://gpu-box:9000/".into());
        settings.api_key = Some("  ".into());
        let provider = LocalProvider::new(&settings).unwrap();
        assert!(provider.api_key.is_none());
        assert_eq!(provider.completions_url(), "http://gpu-box:9000/v1/completions");
    }

    #[test]
    fn test_request_joins_prompts() {
        let provider = LocalProvider::new(&ProviderSettings::new("local", "m")).unwrap();
        let json = serde_json::to_value(provider.build_request("sys", "user", 256)).unwrap();
        assert_eq!(json["prompt"], "sys\n\nuser");
        assert_eq!(json["max_tokens"], 256);
        assert_eq!(json["model"], "m");
    }

    #[test]
    fn test_response_text_comes_from_first_choice() {
        let parsed: CompletionResponse = serde_json::from_str(
            r#"{"choices":[{"text":"stage near the arena"}],"usage":{"prompt_tokens":12}}"#,
        )
        .unwrap();
        assert_eq!(parsed.choices[0].text, "stage near the arena");
        assert_eq!(parsed.usage.unwrap().completion_tokens, None);
    }
}
