//! AI backends for kubeai
//!
//! A [`Provider`] turns a prompt into text. [`LogAdvisor`] builds
//! troubleshooting prompts from collected logs and parses the answer into a
//! [`LogAnalysis`].

mod advisor;
mod analysis;
mod anthropic;
mod anythingllm;
mod error;
mod gemini;
mod ollama;
mod openai;
mod provider;

#[cfg(test)]
mod test_server;

pub use advisor::LogAdvisor;
pub use analysis::{LogAnalysis, Severity, parse_response};
pub use anthropic::AnthropicProvider;
pub use anythingllm::AnythingLlmProvider;
pub use error::AiError;
pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use provider::{Provider, ProviderConfig, ProviderKind, create_provider};
