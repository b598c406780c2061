//! # contract: the interface every text-generation provider implements
//!
//! This module defines a single trait ([`GenerationClient`]) plus the error and
//! streaming types that travel through it. Concrete providers (see
//! [`crate::client::openai`]) and test mocks implement the trait; the failover
//! logic in [`crate::client::fallback`] only ever talks to it.
//!
//! ## Errors
//! Providers report failures as [`ProviderError`]. Each variant is classified
//! as transient or permanent ([`ProviderError::is_permanent`]) so the failover
//! loop can skip a tier that will never succeed instead of burning its retries.
//!
//! ## Streaming
//! A stream is a bounded channel of [`StreamChunk`]s. The producer closes the
//! channel when it is finished; consumers stop after the first
//! [`StreamChunk::Done`]. Providers without native streaming use
//! [`single_chunk_stream`].
//!
//! ## Mocking & Testing
//! The trait is annotated for `mockall`, exported under the default
//! `test-export-mocks` feature so integration tests can script provider behaviour.

use async_trait::async_trait;
use tokio::sync::mpsc;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

/// Capacity of the channel behind a [`ChunkReceiver`].
pub const STREAM_BUFFER: usize = 32;

/// Errors a provider can report.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Transport-level failure (connect, timeout, TLS, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Credentials were rejected.
    #[error("authentication failed: {message}")]
    Auth { message: String },

    #[error("rate limited: {message}")]
    RateLimited { message: String },

    /// The provider answered with an error status.
    #[error("API error ({status}): {message}")]
    Api {
        status: u16,
        message: String,
        retryable: bool,
    },

    /// The provider answered, but not with anything usable.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    /// Operation the provider cannot perform at all.
    #[error("not supported: {0}")]
    Unsupported(String),

    #[error("{message}")]
    Other { message: String },
}

impl ProviderError {
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Whether retrying the same provider is pointless.
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::Auth { .. } | Self::Unsupported(_) => true,
            Self::Api { retryable, .. } => !retryable,
            Self::Http(_)
            | Self::RateLimited { .. }
            | Self::InvalidResponse { .. }
            | Self::Other { .. } => false,
        }
    }

    /// Stable category for logs and error reporting.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Http(_) => "network",
            Self::Auth { .. } => "auth",
            Self::RateLimited { .. } => "rate_limit",
            Self::Api { .. } => "api",
            Self::InvalidResponse { .. } => "invalid_response",
            Self::Unsupported(_) => "unsupported",
            Self::Other { .. } => "unknown",
        }
    }
}

/// One unit of a streamed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    Text(String),
    /// Terminal failure; nothing follows it.
    Error(String),
    /// End of a successful stream.
    Done,
}

pub type ChunkReceiver = mpsc::Receiver<StreamChunk>;

/// Wraps a complete response as a stream: one text chunk, then done.
pub fn single_chunk_stream(text: String) -> ChunkReceiver {
    let (tx, rx) = mpsc::channel(2);
    // Capacity 2 holds both chunks, so neither send can fail.
    let _ = tx.try_send(StreamChunk::Text(text));
    let _ = tx.try_send(StreamChunk::Done);
    rx
}

/// Drains a stream into a single string.
///
/// Stops at the first [`StreamChunk::Done`]; a channel closed without one is
/// treated as complete.
pub async fn collect_stream(mut rx: ChunkReceiver) -> Result<String, ProviderError> {
    let mut text = String::new();
    while let Some(chunk) = rx.recv().await {
        match chunk {
            StreamChunk::Text(part) => text.push_str(&part),
            StreamChunk::Error(message) => return Err(ProviderError::Other { message }),
            StreamChunk::Done => break,
        }
    }
    Ok(text)
}

/// A text-generation backend.
///
/// Implementations must be `Send + Sync`; one instance serves every request of
/// a run, one call at a time.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Generates a complete response for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError>;

    /// Best-effort token count for `text`.
    async fn count_tokens(&self, text: &str) -> Result<usize, ProviderError>;

    /// Streams a response for `prompt`.
    async fn stream(&self, prompt: &str) -> Result<ChunkReceiver, ProviderError>;

    /// Releases any resources held by the client.
    async fn close(&self) -> Result<(), ProviderError>;
}
