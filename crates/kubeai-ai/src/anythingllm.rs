use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AiError;
use crate::provider::{Provider, ProviderConfig, send_json};

const DEFAULT_BASE_URL: &str = "http://localhost:3001";
/// AnythingLLM answers with the model configured on the server
const DEFAULT_MODEL: &str = "default";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    result: String,
    #[serde(default)]
    error: Option<String>,
}

/// Self-hosted AnythingLLM server. The API key is optional.
pub struct AnythingLlmProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
}

impl AnythingLlmProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, AiError> {
        Ok(Self {
            client: config.http_client()?,
            base_url: config.base_url_or(DEFAULT_BASE_URL),
            api_key: config.optional_api_key(),
            model: config.model_or(DEFAULT_MODEL),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl Provider for AnythingLlmProvider {
    fn name(&self) -> &'static str {
        "anythingllm"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn requires_api_key(&self) -> bool {
        false
    }

    async fn query(&self, prompt: &str) -> Result<String, AiError> {
        let url = format!("{}/api/chat", self.base_url);
        debug!(%url, prompt_len = prompt.len(), "querying AnythingLLM");

        let mut request = self.client.post(&url).json(&ChatRequest {
            message: prompt,
            temperature: self.temperature,
            stream: false,
        });
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response: ChatResponse = send_json(request).await?;
        if !response.success {
            let reason = response.error.unwrap_or_else(|| "unknown error".to_string());
            return Err(AiError::InvalidResponse(format!("AnythingLLM reported failure: {}", reason)));
        }
        Ok(response.result)
    }
}
