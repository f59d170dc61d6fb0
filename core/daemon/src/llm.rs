//! Language-model client: one chat-completion call, no retries.
//!
//! Failures are normalized to a single user-facing message so upstream
//! API details never reach the requesting client; the specific cause is
//! logged daemon-side only.

use serde::Serialize;
use serde_json::{json, Value};

use fieldnote_core::ModelConfig;

/// The only failure text clients ever see for model calls.
pub const USER_FACING_FAILURE: &str = "Failed to generate content. Please try again later.";

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("model request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("model endpoint returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("unexpected API response structure")]
    Shape,
}

pub struct LlmClient {
    http: reqwest::blocking::Client,
    config: ModelConfig,
}

impl LlmClient {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            http: reqwest::blocking::Client::new(),
            config,
        }
    }

    /// Sends one chat completion and returns the trimmed message text.
    pub fn chat(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let body = json!({
            "model": self.config.model,
            "messages": messages,
            "max_tokens": self.config.max_tokens,
        });

        let mut request = self.http.post(&self.config.endpoint).json(&body);
        if let Some(key) = self.config.resolved_api_key() {
            request = request.bearer_auth(key);
        }

        let response = request.send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::Status(status));
        }

        let value: Value = response.json()?;
        extract_content(&value).ok_or(LlmError::Shape)
    }
}

/// Pulls `choices[0].message.content` out of a completion response.
pub fn extract_content(value: &Value) -> Option<String> {
    value
        .get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .map(|content| content.trim().to_string())
}
