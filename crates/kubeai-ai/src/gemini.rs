use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AiError;
use crate::provider::{Provider, ProviderConfig, send_json};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const MAX_OUTPUT_TOKENS: u32 = 4096;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

/// Google Gemini `generateContent`
pub struct GeminiProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl GeminiProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, AiError> {
        Ok(Self {
            client: config.http_client()?,
            base_url: config.base_url_or(DEFAULT_BASE_URL),
            api_key: config.require_api_key("gemini")?,
            model: config.model_or(DEFAULT_MODEL),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn requires_api_key(&self) -> bool {
        true
    }

    async fn query(&self, prompt: &str) -> Result<String, AiError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        debug!(%url, model = %self.model, prompt_len = prompt.len(), "querying Gemini");

        let request = self
            .client
            .post(&url)
            .query(&[("key", &self.api_key)])
            .json(&GenerateContentRequest {
                contents: vec![Content {
                    role: "user",
                    parts: vec![Part { text: prompt }],
                }],
                generation_config: GenerationConfig {
                    temperature: self.temperature,
                    max_output_tokens: MAX_OUTPUT_TOKENS,
                },
            });

        let response: GenerateContentResponse = send_json(request).await?;
        let candidate = response
            .candidates
            .into_iter()
            .next()
            .filter(|candidate| !candidate.content.parts.is_empty())
            .ok_or_else(|| AiError::InvalidResponse("No candidates in response".to_string()))?;

        Ok(candidate
            .content
            .parts
            .into_iter()
            .map(|part| part.text)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderKind;
    use crate::test_server::serve_once;

    fn config(base_url: String) -> ProviderConfig {
        ProviderConfig {
            kind: ProviderKind::Gemini,
            base_url: Some(base_url),
            api_key: Some("g-key".to_string()),
            temperature: 0.5,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_query_generate_content() {
        let (base_url, server) = serve_once(
            200,
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Pods are "},{"text":"OOM killed"}]},"finishReason":"STOP"}]}"#,
        )
        .await;
        let provider = GeminiProvider::new(&config(base_url)).unwrap();

        let answer = provider.query("analyze").await.unwrap();
        assert_eq!(answer, "Pods are OOM killed");

        let request = server.await.unwrap();
        assert_eq!(request.uri.path(), "/models/gemini-2.5-flash:generateContent");
        assert_eq!(request.uri.query(), Some("key=g-key"));
        assert_eq!(request.body["contents"][0]["role"], "user");
        assert_eq!(request.body["contents"][0]["parts"][0]["text"], "analyze");
        assert_eq!(request.body["generationConfig"]["temperature"], 0.5);
        assert_eq!(request.body["generationConfig"]["maxOutputTokens"], 4096);
    }

    #[tokio::test]
    async fn test_query_blocked_prompt() {
        let (base_url, server) = serve_once(200, r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).await;
        let provider = GeminiProvider::new(&config(base_url)).unwrap();

        let err = provider.query("analyze").await.unwrap_err();
        assert!(matches!(err, AiError::InvalidResponse(_)));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_query_bad_key() {
        let (base_url, server) = serve_once(400, r#"{"error":{"code":400,"message":"API key not valid"}}"#).await;
        let provider = GeminiProvider::new(&config(base_url)).unwrap();

        let err = provider.query("analyze").await.unwrap_err();
        assert!(matches!(err, AiError::Api { status: 400, ref body } if body.contains("API key not valid")));
        server.await.unwrap();
    }
}
