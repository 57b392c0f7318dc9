use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::extract::MIME_PDF;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Environment variable holding the bearer token. An empty name sends no
    /// `Authorization` header (local endpoints).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Maximum characters of extracted text sent to the backend.
    #[serde(default = "default_context_chars")]
    pub context_chars: usize,
    #[serde(default)]
    pub app_title: Option<String>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            context_chars: default_context_chars(),
            app_title: None,
        }
    }
}

fn default_endpoint() -> String {
    "https://openrouter.ai/api/v1/chat/completions".to_string()
}
fn default_model() -> String {
    "deepseek/deepseek-chat:free".to_string()
}
fn default_api_key_env() -> Option<String> {
    Some("OPENROUTER_API_KEY".to_string())
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_context_chars() -> usize {
    8000
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    #[serde(default = "default_max_size_bytes")]
    pub max_size_bytes: u64,
    #[serde(default = "default_accepted_types")]
    pub accepted_types: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: default_max_size_bytes(),
            accepted_types: default_accepted_types(),
        }
    }
}

fn default_max_size_bytes() -> u64 {
    10 * 1024 * 1024
}
fn default_accepted_types() -> Vec<String> {
    vec![MIME_PDF.to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct PromptsConfig {
    /// Target language for summaries and translations.
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
        }
    }
}

fn default_language() -> String {
    "Roman Urdu".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

/// Loads `path` when it exists, otherwise falls back to built-in defaults.
pub fn load_config_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Ok(Config::default())
    }
}

fn validate(config: &Config) -> Result<()> {
    // Validate completion
    let completion = &config.completion;
    if completion.context_chars == 0 {
        anyhow::bail!("completion.context_chars must be > 0");
    }
    if completion.timeout_secs == 0 {
        anyhow::bail!("completion.timeout_secs must be > 0");
    }
    if completion.model.trim().is_empty() {
        anyhow::bail!("completion.model must not be empty");
    }
    if !(completion.endpoint.starts_with("http://") || completion.endpoint.starts_with("https://"))
    {
        anyhow::bail!(
            "completion.endpoint must be an http(s) URL, got '{}'",
            completion.endpoint
        );
    }

    // Validate upload
    if config.upload.max_size_bytes == 0 {
        anyhow::bail!("upload.max_size_bytes must be > 0");
    }
    if config.upload.accepted_types.is_empty() {
        anyhow::bail!("upload.accepted_types must list at least one MIME type");
    }

    Ok(())
}
