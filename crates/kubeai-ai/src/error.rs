use thiserror::Error;

/// Failures while talking to an AI provider or reading its answer
#[derive(Debug, Error)]
pub enum AiError {
    #[error("request to AI provider failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("AI provider returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid response from AI provider: {0}")]
    InvalidResponse(String),

    #[error("provider '{0}' requires an API key")]
    MissingApiKey(&'static str),

    #[error("unsupported AI provider: {0} (expected ollama, openai, anthropic, gemini or anythingllm)")]
    UnsupportedProvider(String),

    #[error("AI analysis could not be decoded: {0}")]
    MalformedAnalysis(#[source] serde_json::Error),
}
