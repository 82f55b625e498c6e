use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::anthropic::AnthropicProvider;
use crate::anythingllm::AnythingLlmProvider;
use crate::error::AiError;
use crate::gemini::GeminiProvider;
use crate::ollama::OllamaProvider;
use crate::openai::OpenAiProvider;

/// A text-in, text-out language model backend
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short provider name, e.g. `ollama`
    fn name(&self) -> &'static str;

    /// Model the provider sends prompts to
    fn model(&self) -> &str;

    fn requires_api_key(&self) -> bool;

    /// Send a single prompt and return the model's full answer
    async fn query(&self, prompt: &str) -> Result<String, AiError>;
}

/// Supported backends
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Ollama,
    OpenAi,
    #[serde(alias = "claude")]
    Anthropic,
    Gemini,
    /// Self-hosted, the API key is optional
    AnythingLlm,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
            Self::AnythingLlm => "anythingllm",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = AiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAi),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "gemini" => Ok(Self::Gemini),
            "anythingllm" => Ok(Self::AnythingLlm),
            _ => Err(AiError::UnsupportedProvider(s.to_string())),
        }
    }
}

/// Settings for building a [`Provider`]
#[derive(Clone, Debug)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// Overrides the provider's default model
    pub model: Option<String>,
    /// Overrides the provider's default endpoint
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            model: None,
            base_url: None,
            api_key: None,
            temperature: 0.2,
            timeout_secs: 120,
        }
    }
}

impl ProviderConfig {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    pub(crate) fn model_or(&self, default: &str) -> String {
        non_empty(self.model.as_deref()).unwrap_or(default).to_string()
    }

    pub(crate) fn base_url_or(&self, default: &str) -> String {
        non_empty(self.base_url.as_deref())
            .unwrap_or(default)
            .trim_end_matches('/')
            .to_string()
    }

    pub(crate) fn require_api_key(&self, provider: &'static str) -> Result<String, AiError> {
        non_empty(self.api_key.as_deref())
            .map(str::to_string)
            .ok_or(AiError::MissingApiKey(provider))
    }

    pub(crate) fn optional_api_key(&self) -> Option<String> {
        non_empty(self.api_key.as_deref()).map(str::to_string)
    }

    pub(crate) fn http_client(&self) -> Result<reqwest::Client, AiError> {
        Ok(reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()?)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Build the provider selected by `config`
pub fn create_provider(config: &ProviderConfig) -> Result<Box<dyn Provider>, AiError> {
    let provider: Box<dyn Provider> = match config.kind {
        ProviderKind::Ollama => Box::new(OllamaProvider::new(config)?),
        ProviderKind::OpenAi => Box::new(OpenAiProvider::new(config)?),
        ProviderKind::Anthropic => Box::new(AnthropicProvider::new(config)?),
        ProviderKind::Gemini => Box::new(GeminiProvider::new(config)?),
        ProviderKind::AnythingLlm => Box::new(AnythingLlmProvider::new(config)?),
    };
    tracing::debug!(provider = provider.name(), model = provider.model(), "AI provider ready");
    Ok(provider)
}

/// Send a request and decode a successful JSON body
pub(crate) async fn send_json<T: DeserializeOwned>(request: reqwest::RequestBuilder) -> Result<T, AiError> {
    let response = request.send().await?;
    let status = response.status();

    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(AiError::Api {
            status: status.as_u16(),
            body,
        });
    }

    response
        .json()
        .await
        .map_err(|e| AiError::InvalidResponse(format!("Failed to parse response: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_parsing() {
        assert_eq!("ollama".parse::<ProviderKind>().unwrap(), ProviderKind::Ollama);
        assert_eq!("OpenAI".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert_eq!("claude".parse::<ProviderKind>().unwrap(), ProviderKind::Anthropic);
        assert_eq!("Gemini".parse::<ProviderKind>().unwrap(), ProviderKind::Gemini);
        assert_eq!("anythingllm".parse::<ProviderKind>().unwrap(), ProviderKind::AnythingLlm);
        assert!(matches!(
            "mistral".parse::<ProviderKind>(),
            Err(AiError::UnsupportedProvider(name)) if name == "mistral"
        ));
    }

    #[test]
    fn test_create_provider_defaults() {
        let provider = create_provider(&ProviderConfig::default()).unwrap();
        assert_eq!(provider.name(), "ollama");
        assert_eq!(provider.model(), "llama3.3");
        assert!(!provider.requires_api_key());

        let mut config = ProviderConfig::new(ProviderKind::OpenAi);
        config.api_key = Some("sk-test".to_string());
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.model(), "gpt-4o-mini");
        assert!(provider.requires_api_key());

        let mut config = ProviderConfig::new(ProviderKind::Anthropic);
        config.api_key = Some("sk-ant-test".to_string());
        config.model = Some("claude-3-5-sonnet-latest".to_string());
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.name(), "anthropic");
        assert_eq!(provider.model(), "claude-3-5-sonnet-latest");

        let mut config = ProviderConfig::new(ProviderKind::Gemini);
        config.api_key = Some("g-key".to_string());
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.name(), "gemini");
        assert_eq!(provider.model(), "gemini-2.5-flash");
        assert!(provider.requires_api_key());

        let provider = create_provider(&ProviderConfig::new(ProviderKind::AnythingLlm)).unwrap();
        assert_eq!(provider.name(), "anythingllm");
        assert!(!provider.requires_api_key());
    }

    #[test]
    fn test_remote_providers_need_a_key() {
        for kind in [ProviderKind::OpenAi, ProviderKind::Anthropic, ProviderKind::Gemini] {
            let mut config = ProviderConfig::new(kind);
            config.api_key = Some("   ".to_string());
            assert!(matches!(create_provider(&config), Err(AiError::MissingApiKey(_))));
        }
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let config = ProviderConfig {
            base_url: Some("http://gpu-box:11434/".to_string()),
            ..Default::default()
        };
        assert_eq!(config.base_url_or("http://localhost:11434"), "http://gpu-box:11434");
        assert_eq!(ProviderConfig::default().base_url_or("http://localhost:11434"), "http://localhost:11434");
    }
}
