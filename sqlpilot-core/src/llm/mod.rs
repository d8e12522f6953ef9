//! Text-generation capability.
//!
//! The core treats prompt content as opaque: each pipeline stage sends one
//! system + user prompt pair through a [`TextGenerator`] and post-processes
//! the reply with [`strip_code_fences`] before using it.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

mod openai;
mod structured;

pub use openai::{DEFAULT_BASE_URL, OpenAiChatClient, OpenAiClient};
pub use structured::decode_json_reply;
pub(crate) use structured::{ask_structured, complete};

/// A failed text-generation call.
///
/// Carries the HTTP status and provider-declared cooldown when available so
/// the analyzer can classify the failure without parsing transport errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}{message}", .status.map(|s| format!("HTTP {}: ", s)).unwrap_or_default())]
pub struct LlmError {
    /// HTTP status of the failed response, if one was received
    pub status: Option<u16>,
    /// Provider error message
    pub message: String,
    /// Cooldown from the `retry-after` header
    pub retry_after: Option<Duration>,
    /// Whether the request timed out client-side
    pub timed_out: bool,
}

impl LlmError {
    /// Creates an error from a message with no status.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
            retry_after: None,
            timed_out: false,
        }
    }

    /// Creates a client-side timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            timed_out: true,
            ..Self::new(message)
        }
    }

    /// Builder method to set the HTTP status.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Builder method to set the provider-declared cooldown.
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }
}

/// Chat-style completion capability.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Sends one system + user prompt pair and returns the raw reply text.
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError>;
}

/// Removes markdown code fences and a leading language tag from a model reply.
///
/// # Example
/// ```rust
/// use sqlpilot_core::llm::strip_code_fences;
///
/// assert_eq!(strip_code_fences("```sql\nSELECT 1\n```"), "SELECT 1");
/// assert_eq!(strip_code_fences("json {\"a\": 1}"), "{\"a\": 1}");
/// ```
pub fn strip_code_fences(reply: &str) -> String {
    let mut text = reply.trim();

    if let Some(start) = text.find("```") {
        let after = &text[start + 3..];
        let body = match after.find("```") {
            Some(end) => &after[..end],
            None => after,
        };
        text = body.trim();
    }

    for tag in ["json", "sql", "JSON", "SQL"] {
        if let Some(rest) = text.strip_prefix(tag)
            && rest.starts_with(|c: char| c.is_whitespace())
        {
            text = rest.trim_start();
            break;
        }
    }

    text.trim().trim_end_matches(';').trim().to_string()
}
