use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AiError;
use crate::provider::{Provider, ProviderConfig};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama3.3";

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
}

/// Local inference through an Ollama server
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
}

impl OllamaProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, AiError> {
        Ok(Self {
            client: config.http_client()?,
            base_url: config.base_url_or(DEFAULT_BASE_URL),
            model: config.model_or(DEFAULT_MODEL),
            temperature: config.temperature,
        })
    }
}

/// Ollama may answer with one JSON object per line even when not streaming
fn join_chunks(body: &str) -> Result<String, AiError> {
    let mut text = String::new();
    for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let chunk: GenerateChunk = serde_json::from_str(line)
            .map_err(|e| AiError::InvalidResponse(format!("Failed to parse Ollama chunk: {}", e)))?;
        text.push_str(&chunk.response);
        if chunk.done {
            break;
        }
    }
    Ok(text)
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &'static str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn requires_api_key(&self) -> bool {
        false
    }

    async fn query(&self, prompt: &str) -> Result<String, AiError> {
        let url = format!("{}/api/generate", self.base_url);
        debug!(%url, model = %self.model, prompt_len = prompt.len(), "querying Ollama");

        let response = self
            .client
            .post(&url)
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
                options: GenerateOptions {
                    temperature: self.temperature,
                },
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(AiError::Api {
                status: status.as_u16(),
                body,
            });
        }

        join_chunks(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server::serve_once;

    #[test]
    fn test_join_chunks() {
        let body = "{\"response\":\"Hel\",\"done\":false}\n{\"response\":\"lo\",\"done\":false}\n\n{\"response\":\"\",\"done\":true}\n{\"response\":\"ignored\"}";
        assert_eq!(join_chunks(body).unwrap(), "Hello");
        assert!(matches!(join_chunks("not json"), Err(AiError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_query_posts_generate_request() {
        let (base_url, server) = serve_once(200, r#"{"model":"llama3.3","response":"all good","done":true}"#).await;
        let provider = OllamaProvider::new(&ProviderConfig {
            base_url: Some(base_url),
            temperature: 0.5,
            ..Default::default()
        })
        .unwrap();

        let answer = provider.query("why is my pod crashing?").await.unwrap();
        assert_eq!(answer, "all good");

        let request = server.await.unwrap();
        assert!(request.request_line().starts_with("POST /api/generate"));
        assert_eq!(request.body["model"], "llama3.3");
        assert_eq!(request.body["prompt"], "why is my pod crashing?");
        assert_eq!(request.body["stream"], false);
        assert_eq!(request.body["options"]["temperature"], 0.5);
    }

    #[tokio::test]
    async fn test_query_surfaces_api_errors() {
        let (base_url, server) = serve_once(404, r#"{"error":"model 'llama9' not found"}"#).await;
        let provider = OllamaProvider::new(&ProviderConfig {
            base_url: Some(base_url),
            model: Some("llama9".to_string()),
            ..Default::default()
        })
        .unwrap();

        let err = provider.query("hi").await.unwrap_err();
        assert!(matches!(err, AiError::Api { status: 404, ref body } if body.contains("llama9")));
        server.await.unwrap();
    }
}
