use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AiError;
use crate::provider::{Provider, ProviderConfig, send_json};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

/// Anthropic messages API
pub struct AnthropicProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl AnthropicProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, AiError> {
        Ok(Self {
            client: config.http_client()?,
            base_url: config.base_url_or(DEFAULT_BASE_URL),
            api_key: config.require_api_key("anthropic")?,
            model: config.model_or(DEFAULT_MODEL),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn requires_api_key(&self) -> bool {
        true
    }

    async fn query(&self, prompt: &str) -> Result<String, AiError> {
        let url = format!("{}/v1/messages", self.base_url);
        debug!(%url, model = %self.model, prompt_len = prompt.len(), "querying Anthropic");

        let request = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&MessagesRequest {
                model: &self.model,
                max_tokens: MAX_TOKENS,
                temperature: self.temperature,
                messages: vec![Message {
                    role: "user",
                    content: prompt,
                }],
            });

        let response: MessagesResponse = send_json(request).await?;
        let text: String = response
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text)
            .collect();

        if text.is_empty() {
            return Err(AiError::InvalidResponse("No content in response".to_string()));
        }
        Ok(text)
    }
}
