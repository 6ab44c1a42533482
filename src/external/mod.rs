pub mod anthropic;
pub mod gemini;
pub mod llm_provider;
pub mod local;
pub mod openai;

use std::sync::Arc;

use tracing::info;

use crate::errors::LlmError;
use crate::external::anthropic::AnthropicProvider;
use crate::external::gemini::GeminiProvider;
use crate::external::llm_provider::{LlmProvider, ProviderSettings};
use crate::external::local::LocalProvider;
use crate::external::openai::OpenAiProvider;

/// Build the adapter named by `settings.provider`.
pub fn build_provider(settings: &ProviderSettings) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let provider: Arc<dyn LlmProvider> = match settings.provider.to_lowercase().as_str() {
        "openai" => Arc::new(OpenAiProvider::new(settings)?),
        "anthropic" => Arc::new(AnthropicProvider::new(settings)?),
        "google" | "gemini" => Arc::new(GeminiProvider::new(settings)?),
        "local" => Arc::new(LocalProvider::new(settings)?),
        other => {
            return Err(LlmError::NotConfigured(format!(
                "unknown provider '{}'. Supported: openai, anthropic, google, local",
                other
            )))
        }
    };

    info!("🤖 Provider ready: {}", provider.route());
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_provider_is_rejected() {
        let settings = ProviderSettings::new("bedrock", "llama");
        let err = build_provider(&settings).err().unwrap();
        assert!(err.to_string().contains("unknown provider"));
    }

    #[test]
    fn test_local_provider_builds_without_key() {
        let settings = ProviderSettings::new("local", "driver-ft-v2");
        let provider = build_provider(&settings).unwrap();
        assert_eq!(provider.route(), "local:driver-ft-v2");
    }

    #[test]
    fn test_gemini_alias_builds_google_provider() {
        let mut settings = ProviderSettings::new("Gemini", "gemini-2.0-flash-001");
        settings.api_key = Some("key".into());
        let provider = build_provider(&settings).unwrap();
        assert_eq!(provider.route(), "google:gemini-2.0-flash-001");
    }
}
