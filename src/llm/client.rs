//! HTTP client for the reasoning service.
//!
//! Supports OpenAI-compatible chat completion endpoints and Ollama's
//! `/api/chat`. HTTP and transport failures are mapped onto the
//! `ReasoningError` categories so callers can decide what to retry.

use crate::error::ReasoningError;
use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Anything that can answer a free-text prompt.
pub trait ReasoningService: Send + Sync {
    /// Sends one prompt and returns the raw text answer.
    fn ask(&self, prompt: &str) -> impl Future<Output = Result<String, ReasoningError>> + Send;
}

/// Which wire format the service speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// OpenAI-compatible `/v1/chat/completions`
    #[default]
    Openai,
    /// Ollama `/api/chat`
    Ollama,
}

/// Configuration for the chat client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub provider: Provider,
    pub base_url: String,
    pub model_name: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_seconds: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            provider: Provider::Openai,
            base_url: "https://api.openai.com".to_string(),
            model_name: "gpt-3.5-turbo".to_string(),
            api_key: None,
            temperature: 0.0,
            max_tokens: 500,
            timeout_seconds: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// OpenAI chat completion request.
#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: ChatMessage,
}

/// Ollama chat API request.
#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
}

/// HTTP-backed `ReasoningService`.
pub struct ChatClient {
    config: ClientConfig,
    http_client: reqwest::Client,
}

impl ChatClient {
    /// Create a new client.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.config.model_name
    }

    fn endpoint(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        match self.config.provider {
            Provider::Openai => format!("{}/v1/chat/completions", base),
            Provider::Ollama => format!("{}/api/chat", base),
        }
    }

    fn user_message(prompt: &str) -> Vec<ChatMessage> {
        vec![ChatMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        }]
    }

    async fn send(&self, prompt: &str) -> Result<String, ReasoningError> {
        let url = self.endpoint();
        let mut request = self.http_client.post(&url);

        request = match self.config.provider {
            Provider::Openai => request.json(&CompletionRequest {
                model: &self.config.model_name,
                messages: Self::user_message(prompt),
                max_tokens: self.config.max_tokens,
                temperature: self.config.temperature,
            }),
            Provider::Ollama => request.json(&OllamaChatRequest {
                model: &self.config.model_name,
                messages: Self::user_message(prompt),
                stream: false,
                options: OllamaOptions {
                    temperature: self.config.temperature,
                    num_predict: self.config.max_tokens,
                },
            }),
        };

        if let Some(ref key) = self.config.api_key {
            request = request.bearer_auth(key);
        }

        debug!("Sending prompt of {} bytes to {}", prompt.len(), url);

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ReasoningError::Transient(format!(
                    "Request timed out after {}s",
                    self.config.timeout_seconds
                ))
            } else if e.is_connect() {
                ReasoningError::Transient(format!(
                    "Cannot connect to reasoning service at {}",
                    self.config.base_url
                ))
            } else if e.is_builder() {
                ReasoningError::InvalidRequest(format!("Failed to build request: {}", e))
            } else {
                ReasoningError::Transient(format!("Failed to send request: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let content = match self.config.provider {
            Provider::Openai => {
                let parsed: CompletionResponse = response.json().await.map_err(|e| {
                    ReasoningError::Transient(format!("Failed to parse response: {}", e))
                })?;
                parsed
                    .choices
                    .into_iter()
                    .next()
                    .map(|c| c.message.content)
                    .ok_or_else(|| {
                        ReasoningError::Transient("Response contained no choices".to_string())
                    })?
            }
            Provider::Ollama => {
                let parsed: OllamaChatResponse = response.json().await.map_err(|e| {
                    ReasoningError::Transient(format!("Failed to parse response: {}", e))
                })?;
                parsed.message.content
            }
        };

        Ok(content)
    }
}

impl ReasoningService for ChatClient {
    async fn ask(&self, prompt: &str) -> Result<String, ReasoningError> {
        self.send(prompt).await
    }
}

/// Map a non-success HTTP status onto a failure category.
fn classify_status(status: StatusCode, body: &str) -> ReasoningError {
    let detail = format!("{}: {}", status, body.trim());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ReasoningError::Authentication(detail),
        StatusCode::TOO_MANY_REQUESTS => ReasoningError::RateLimited(detail),
        StatusCode::BAD_REQUEST
        | StatusCode::NOT_FOUND
        | StatusCode::PAYLOAD_TOO_LARGE
        | StatusCode::UNPROCESSABLE_ENTITY => ReasoningError::InvalidRequest(detail),
        _ => ReasoningError::Transient(detail),
    }
}
