//! OpenAI-compatible HTTP client and chat-completion provider.

use super::{LlmError, TextGenerator};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use zeroize::Zeroizing;

/// Default OpenAI API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
}

#[derive(Debug, Clone, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiError {
    error: ErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
struct ErrorDetail {
    message: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

// ============================================================================
// CLIENT
// ============================================================================

/// Shared HTTP client for OpenAI-compatible endpoints.
///
/// Failures are returned as [`LlmError`] carrying the HTTP status and the
/// `retry-after` cooldown so callers can classify them.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    api_key: Zeroizing<String>,
    base_url: String,
}

impl OpenAiClient {
    /// Creates a client for the given base URL.
    pub fn new(api_key: Zeroizing<String>, base_url: impl Into<String>) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LlmError::new(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// POSTs a JSON body to `endpoint` and decodes the JSON reply.
    pub async fn request<Req, Res>(&self, endpoint: &str, body: &Req) -> Result<Res, LlmError>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.as_str())
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::timeout(format!("Request to {} timed out", endpoint))
                } else {
                    LlmError::new(format!("HTTP request failed: {}", e))
                }
            })?;

        let status = response.status();
        let retry_after = parse_retry_after(response.headers());

        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| LlmError::new(format!("Failed to parse response: {}", e)));
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        let message = match serde_json::from_str::<ApiError>(&error_text) {
            Ok(api_error) => match api_error.error.kind {
                Some(kind) => format!("{} ({})", api_error.error.message, kind),
                None => api_error.error.message,
            },
            Err(_) => error_text,
        };

        let mut error = LlmError::new(message).with_status(status.as_u16());
        if status == StatusCode::TOO_MANY_REQUESTS
            && let Some(cooldown) = retry_after
        {
            error = error.with_retry_after(cooldown);
        }
        Err(error)
    }
}

fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
        .map(Duration::from_secs_f64)
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

// ============================================================================
// CHAT PROVIDER
// ============================================================================

/// [`TextGenerator`] backed by the `/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiChatClient {
    client: OpenAiClient,
    model: String,
    temperature: f32,
}

impl OpenAiChatClient {
    /// Creates a chat provider for `model`.
    pub fn new(client: OpenAiClient, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            client,
            model: model.into(),
            temperature,
        }
    }

    /// Returns the configured model name.
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl TextGenerator for OpenAiChatClient {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError> {
        let request = CompletionRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system",
                    content: system_prompt,
                },
                Message {
                    role: "user",
                    content: user_prompt,
                },
            ],
            temperature: self.temperature,
        };

        tracing::debug!(model = %self.model, prompt_len = user_prompt.len(), "Sending chat completion");
        let response: CompletionResponse = self.client.request("chat/completions", &request).await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::new("No completion in response"))
    }
}
