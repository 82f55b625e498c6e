//! Configuration file and environment handling
//!
//! Settings are read from `<config_dir>/kubeai/config.toml` (or `--config`),
//! then overridden by environment variables, then by command-line flags.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use kubeai_ai::{ProviderConfig, ProviderKind};
use kubeai_logs::CollectorConfig;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Kubeconfig context to use instead of the current one
    pub kube_context: Option<String>,
    pub provider: ProviderSection,
    pub logs: LogsSection,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderSection {
    pub kind: ProviderKind,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for ProviderSection {
    fn default() -> Self {
        let defaults = ProviderConfig::default();
        Self {
            kind: defaults.kind,
            model: defaults.model,
            base_url: defaults.base_url,
            api_key: defaults.api_key,
            temperature: defaults.temperature,
            timeout_secs: defaults.timeout_secs,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogsSection {
    /// Lines per pod; 0 reads the whole log
    pub tail: i64,
    /// Oldest log age, e.g. `1h`; `0` disables the bound
    pub since: String,
    pub max_batch_records: usize,
    /// Records kept for the summary printed when live mode stops
    pub live_buffer_size: usize,
}

impl Default for LogsSection {
    fn default() -> Self {
        Self {
            tail: 1000,
            since: "1h".to_string(),
            max_batch_records: CollectorConfig::default().max_batch_records,
            live_buffer_size: 10_000,
        }
    }
}

impl AppConfig {
    /// Default location of the config file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("kubeai").join("config.toml"))
    }

    /// Load from `path`, or from the default location when `None`.
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;

        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Apply environment overrides from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply environment overrides using `lookup` to read variables
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(kind) = lookup("KUBEAI_PROVIDER") {
            self.provider.kind = kind
                .parse()
                .context("Invalid KUBEAI_PROVIDER")?;
        }
        if let Some(model) = lookup("KUBEAI_MODEL") {
            self.provider.model = Some(model);
        }

        let (key_var, url_var) = match self.provider.kind {
            ProviderKind::Ollama => (None, Some("OLLAMA_URL")),
            ProviderKind::OpenAi => (Some("OPENAI_API_KEY"), None),
            ProviderKind::Anthropic => (Some("ANTHROPIC_API_KEY"), None),
            ProviderKind::Gemini => (Some("GEMINI_API_KEY"), None),
            ProviderKind::AnythingLlm => (Some("ANYTHINGLLM_API_KEY"), Some("ANYTHINGLLM_URL")),
        };
        if let Some(api_key) = key_var.and_then(lookup) {
            self.provider.api_key = Some(api_key);
        }
        if let Some(base_url) = url_var.and_then(lookup) {
            self.provider.base_url = Some(base_url);
        }

        Ok(())
    }

    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            kind: self.provider.kind,
            model: self.provider.model.clone(),
            base_url: self.provider.base_url.clone(),
            api_key: self.provider.api_key.clone(),
            temperature: self.provider.temperature,
            timeout_secs: self.provider.timeout_secs,
        }
    }

    pub fn collector_config(&self) -> CollectorConfig {
        CollectorConfig {
            max_batch_records: self.logs.max_batch_records,
            ..Default::default()
        }
    }
}
