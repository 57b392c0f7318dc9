//! Chat-completion backend abstraction.
//!
//! Defines the [`CompletionClient`] trait and the HTTP implementation,
//! [`HttpCompletionClient`], which speaks the OpenAI-style
//! `POST /chat/completions` protocol (OpenRouter, OpenAI, Ollama, LM Studio).
//!
//! # Request shape
//!
//! Every request is the ordered concatenation of one system message, the
//! prior turns in chronological order, and the new user message last:
//!
//! ```json
//! { "model": "...", "messages": [
//!     { "role": "system", "content": "..." },
//!     { "role": "user", "content": "..." },
//!     { "role": "assistant", "content": "..." },
//!     { "role": "user", "content": "<new message>" }
//! ] }
//! ```
//!
//! The reply is read from `choices[0].message.content`.
//!
//! # Failure handling
//!
//! A connection failure or timeout is [`CompletionError::Transport`], a
//! non-2xx status is [`CompletionError::HttpStatus`], and any response
//! without a string at `choices[0].message.content` is
//! [`CompletionError::MalformedResponse`]. The client never retries, caches,
//! or rate limits; retrying is the caller's decision.

use anyhow::bail;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::CompletionConfig;
use crate::models::ConversationTurn;

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion request failed: {0}")]
    Transport(String),
    #[error("completion backend returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("malformed completion response: {0}")]
    MalformedResponse(String),
}

/// A text-completion service reached over a single request/response call.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Sends `system_prompt`, then `turns`, then `user_message`, and returns
    /// the assistant reply text.
    async fn complete(
        &self,
        system_prompt: &str,
        turns: &[ConversationTurn],
        user_message: &str,
    ) -> Result<String, CompletionError>;
}

/// One entry of the `messages` array on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage<'a> {
    pub role: &'a str,
    pub content: &'a str,
}

/// Builds the ordered `messages` array for one request.
pub fn build_messages<'a>(
    system_prompt: &'a str,
    turns: &'a [ConversationTurn],
    user_message: &'a str,
) -> Vec<ChatMessage<'a>> {
    let mut messages = Vec::with_capacity(turns.len() + 2);
    messages.push(ChatMessage {
        role: "system",
        content: system_prompt,
    });
    messages.extend(turns.iter().map(|turn| ChatMessage {
        role: turn.role.as_str(),
        content: &turn.content,
    }));
    messages.push(ChatMessage {
        role: "user",
        content: user_message,
    });
    messages
}

/// Returns the first `max_chars` characters of `text`.
///
/// This is a hard cut: it may end mid-word or mid-sentence.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_offset, _)) => &text[..byte_offset],
        None => text,
    }
}

/// Extracts `choices[0].message.content` from a chat-completion response.
pub fn parse_reply(json: &serde_json::Value) -> Result<String, CompletionError> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(|content| content.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            CompletionError::MalformedResponse("missing choices[0].message.content".to_string())
        })
}

/// [`CompletionClient`] that POSTs to an OpenAI-compatible endpoint.
pub struct HttpCompletionClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    app_title: Option<String>,
    timeout_secs: u64,
}

impl HttpCompletionClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `api_key_env` names an environment variable that
    /// is not set, or if the HTTP client cannot be built.
    pub fn new(config: &CompletionConfig) -> anyhow::Result<Self> {
        let api_key = match config.api_key_env.as_deref().filter(|name| !name.is_empty()) {
            Some(name) => match std::env::var(name) {
                Ok(key) => Some(key),
                Err(_) => bail!("{} environment variable not set", name),
            },
            None => None,
        };
        Self::with_api_key(config, api_key)
    }

    /// Create a client with an explicit key, bypassing the environment.
    pub fn with_api_key(config: &CompletionConfig, api_key: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
            app_title: config.app_title.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(
        &self,
        system_prompt: &str,
        turns: &[ConversationTurn],
        user_message: &str,
    ) -> Result<String, CompletionError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": build_messages(system_prompt, turns, user_message),
        });

        let mut request = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }
        if let Some(title) = &self.app_title {
            request = request.header("X-Title", title);
        }

        tracing::debug!(
            endpoint = %self.endpoint,
            model = %self.model,
            turns = turns.len(),
            "sending completion request"
        );

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                CompletionError::Transport(format!(
                    "request timed out after {}s",
                    self.timeout_secs
                ))
            } else {
                CompletionError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(CompletionError::HttpStatus {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CompletionError::MalformedResponse(e.to_string()))?;
        parse_reply(&json)
    }
}
