//! OpenAI-compatible chat completions provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::contract::{single_chunk_stream, ChunkReceiver, GenerationClient, ProviderError};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Rough characters-per-token ratio used for estimates.
const CHARS_PER_TOKEN: usize = 4;

#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub timeout: Duration,
    pub max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiClient {
    http: reqwest::Client,
    settings: OpenAiSettings,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.settings.base_url)
            .field("model", &self.settings.model)
            .finish_non_exhaustive()
    }
}

impl OpenAiClient {
    pub fn new(settings: OpenAiSettings) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()?;
        Ok(Self { http, settings })
    }

    pub fn settings(&self) -> &OpenAiSettings {
        &self.settings
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.settings.base_url.trim_end_matches('/'))
    }
}

/// Maps a non-success status to a classified error.
pub fn status_error(status: u16, body: &str) -> ProviderError {
    let message = if body.trim().is_empty() {
        format!("HTTP {status}")
    } else {
        body.trim().to_string()
    };
    match status {
        401 | 403 => ProviderError::Auth { message },
        429 => ProviderError::RateLimited { message },
        408 | 500..=599 => ProviderError::Api {
            status,
            message,
            retryable: true,
        },
        _ => ProviderError::Api {
            status,
            message,
            retryable: false,
        },
    }
}

/// Best-effort token estimate, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

#[async_trait]
impl GenerationClient for OpenAiClient {
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let request = ChatRequest {
            model: &self.settings.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.settings.max_tokens,
        };

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.settings.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        if !(200..300).contains(&status) {
            return Err(status_error(status, &body));
        }

        let parsed: ChatResponse =
            serde_json::from_str(&body).map_err(|e| ProviderError::InvalidResponse {
                message: format!("failed to parse completion: {e}"),
            })?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::InvalidResponse {
                message: "completion contained no message content".to_string(),
            })?;

        debug!(model = %self.settings.model, chars = text.len(), "Completion received");
        Ok(text)
    }

    async fn count_tokens(&self, text: &str) -> Result<usize, ProviderError> {
        Ok(estimate_tokens(text))
    }

    async fn stream(&self, prompt: &str) -> Result<ChunkReceiver, ProviderError> {
        let text = self.generate(prompt).await?;
        Ok(single_chunk_stream(text))
    }

    async fn close(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}
