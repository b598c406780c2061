//! Multi-tier failover around [`GenerationClient`]s.
//!
//! ```text
//! generate(prompt)
//!   ├─ tier 1: attempt 1 … attempt R+1   (backoff between attempts)
//!   ├─ tier 2: attempt 1 … attempt R+1
//!   └─ all tiers spent → GenerateError::Exhausted (last error, tier, attempts)
//! ```
//!
//! Tiers are tried strictly in configuration order, never concurrently.
//! Cancellation is checked before every attempt and races both the provider
//! call and the backoff sleep, so it always wins over retry and failover.
//! A [permanent](ProviderError::is_permanent) error ends the current tier
//! immediately.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::backoff::{backoff_delay, sleep_unless_cancelled};
use crate::contract::{ChunkReceiver, GenerationClient, ProviderError};

pub const DEFAULT_RETRIES_PER_TIER: u32 = 2;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("operation cancelled")]
    Cancelled,

    #[error("no generation tiers configured")]
    NoTiers,

    #[error("all generation tiers exhausted; last tier `{tier}` failed after {attempts} attempt(s): {source}")]
    Exhausted {
        tier: String,
        attempts: u32,
        #[source]
        source: ProviderError,
    },
}

impl GenerateError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, GenerateError::Cancelled)
    }

    pub fn code(&self) -> &'static str {
        match self {
            GenerateError::Cancelled => "cancelled",
            GenerateError::NoTiers => "no_tiers",
            GenerateError::Exhausted { .. } => "generation_exhausted",
        }
    }
}

/// Failures reported while closing tiers. Every tier is closed regardless.
#[derive(Debug, thiserror::Error)]
#[error("failed to close {} tier(s); first: `{}`", .failures.len(), .failures.first().map(|(name, _)| name.as_str()).unwrap_or_default())]
pub struct CloseError {
    pub failures: Vec<(String, ProviderError)>,
}

/// How hard to push each tier before failing over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; each tier gets `retries_per_tier + 1` calls.
    pub retries_per_tier: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries_per_tier: DEFAULT_RETRIES_PER_TIER,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn attempts_per_tier(&self) -> u32 {
        self.retries_per_tier.saturating_add(1)
    }
}

/// One provider configuration in the failover chain.
#[derive(Clone)]
pub struct FallbackTier {
    name: String,
    client: Arc<dyn GenerationClient>,
}

impl FallbackTier {
    pub fn new(name: impl Into<String>, client: Arc<dyn GenerationClient>) -> Self {
        Self {
            name: name.into(),
            client,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn client(&self) -> &Arc<dyn GenerationClient> {
        &self.client
    }
}

impl fmt::Debug for FallbackTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackTier")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Generated text and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub text: String,
    pub tier: String,
    /// Calls made across all tiers, the successful one included.
    pub attempts: u32,
}

/// Ordered tiers plus the retry policy applied to each.
#[derive(Debug)]
pub struct FallbackClient {
    tiers: Vec<FallbackTier>,
    policy: RetryPolicy,
}

impl FallbackClient {
    pub fn new(tiers: Vec<FallbackTier>, policy: RetryPolicy) -> Self {
        Self { tiers, policy }
    }

    pub fn tiers(&self) -> &[FallbackTier] {
        &self.tiers
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Generates text, retrying within each tier and failing over between tiers.
    pub async fn generate(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<Generation, GenerateError> {
        let max_attempts = self.policy.attempts_per_tier();
        let mut total_attempts = 0u32;
        let mut last_failure: Option<(String, u32, ProviderError)> = None;

        for tier in &self.tiers {
            for attempt in 1..=max_attempts {
                if cancel.is_cancelled() {
                    return Err(GenerateError::Cancelled);
                }
                total_attempts += 1;

                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(GenerateError::Cancelled),
                    outcome = tier.client.generate(prompt) => outcome,
                };

                let err = match outcome {
                    Ok(text) => {
                        info!(
                            tier = %tier.name,
                            attempt,
                            total_attempts,
                            "[GEN] Generation succeeded"
                        );
                        return Ok(Generation {
                            text,
                            tier: tier.name.clone(),
                            attempts: total_attempts,
                        });
                    }
                    Err(err) => err,
                };

                let permanent = err.is_permanent();
                warn!(
                    tier = %tier.name,
                    attempt,
                    max_attempts,
                    category = err.category(),
                    permanent,
                    error = %err,
                    "[GEN] Generation attempt failed"
                );
                last_failure = Some((tier.name.clone(), attempt, err));

                if permanent || attempt >= max_attempts {
                    break;
                }

                let delay = backoff_delay(attempt, self.policy.base_delay, self.policy.max_delay);
                debug!(tier = %tier.name, attempt, delay_ms = delay.as_millis() as u64, "[GEN] Backing off");
                if !sleep_unless_cancelled(delay, cancel).await {
                    return Err(GenerateError::Cancelled);
                }
            }
            warn!(tier = %tier.name, "[GEN] Tier exhausted, failing over");
        }

        match last_failure {
            Some((tier, attempts, source)) => Err(GenerateError::Exhausted {
                tier,
                attempts,
                source,
            }),
            None => Err(GenerateError::NoTiers),
        }
    }

    /// Best-effort token count: each tier once, first answer wins.
    pub async fn count_tokens(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<usize, GenerateError> {
        self.first_success("count_tokens", cancel, |client| async move {
            client.count_tokens(text).await
        })
        .await
    }

    /// Opens a stream on the first tier that accepts the request.
    pub async fn stream(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<ChunkReceiver, GenerateError> {
        self.first_success("stream", cancel, |client| async move {
            client.stream(prompt).await
        })
        .await
    }

    /// Closes every tier in order, even after a failure.
    pub async fn close(&self) -> Result<(), CloseError> {
        let mut failures = Vec::new();
        for tier in &self.tiers {
            match tier.client.close().await {
                Ok(()) => debug!(tier = %tier.name, "Closed generation tier"),
                Err(e) => {
                    warn!(tier = %tier.name, error = %e, "Failed to close generation tier");
                    failures.push((tier.name.clone(), e));
                }
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(CloseError { failures })
        }
    }

    async fn first_success<T, F, Fut>(
        &self,
        operation: &'static str,
        cancel: &CancellationToken,
        mut call: F,
    ) -> Result<T, GenerateError>
    where
        F: FnMut(Arc<dyn GenerationClient>) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut last_failure: Option<(String, ProviderError)> = None;

        for tier in &self.tiers {
            if cancel.is_cancelled() {
                return Err(GenerateError::Cancelled);
            }
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(GenerateError::Cancelled),
                outcome = call(Arc::clone(&tier.client)) => outcome,
            };
            match outcome {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(tier = %tier.name, operation, error = %e, "Tier failed, trying next");
                    last_failure = Some((tier.name.clone(), e));
                }
            }
        }

        match last_failure {
            Some((tier, source)) => Err(GenerateError::Exhausted {
                tier,
                attempts: 1,
                source,
            }),
            None => Err(GenerateError::NoTiers),
        }
    }
}
