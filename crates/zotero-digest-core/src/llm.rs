//! Chat-completion backend trait and the OpenAI-compatible HTTP client.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Rate limited (429)")]
    RateLimited,
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("empty response from model")]
    EmptyResponse,
    #[error("malformed response body: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// A chat-completion service.
pub trait CompletionBackend: Send + Sync {
    /// Short name for logs, e.g. the endpoint host.
    fn name(&self) -> &str;

    /// Send the request and return the content of the first choice.
    fn complete<'a>(
        &'a self,
        request: &'a ChatRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, LlmError>> + Send + 'a>>;
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Client for any endpoint speaking the OpenAI `/chat/completions` protocol.
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl OpenAiClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            timeout,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

impl CompletionBackend for OpenAiClient {
    fn name(&self) -> &str {
        &self.base_url
    }

    fn complete<'a>(
        &'a self,
        request: &'a ChatRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, LlmError>> + Send + 'a>> {
        Box::pin(async move {
            let resp = self
                .client
                .post(self.endpoint())
                .bearer_auth(&self.api_key)
                .timeout(self.timeout)
                .json(request)
                .send()
                .await?;

            let status = resp.status().as_u16();
            let body = resp.text().await?;
            completion_content(status, &body)
        })
    }
}

/// Map an HTTP status and body to the content of the first choice.
fn completion_content(status: u16, body: &str) -> Result<String, LlmError> {
    if status == 429 {
        return Err(LlmError::RateLimited);
    }
    if !(200..300).contains(&status) {
        return Err(LlmError::Api {
            status,
            message: api_error_message(body),
        });
    }

    let data: ChatResponse = serde_json::from_str(body)?;
    data.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or(LlmError::EmptyResponse)
}

/// Pull `error.message` out of an OpenAI-style error body, falling back to
/// the raw body.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| body.trim().to_string())
}
