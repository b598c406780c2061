//! Text generation: providers, backoff and tier failover.

pub mod backoff;
pub mod fallback;
pub mod openai;

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::{Config, ProviderKind};
use crate::contract::ProviderError;

pub use fallback::{CloseError, FallbackClient, FallbackTier, GenerateError, Generation, RetryPolicy};
pub use openai::{OpenAiClient, OpenAiSettings};

#[derive(Debug, thiserror::Error)]
pub enum ClientBuildError {
    #[error("tier `{tier}` has no API key; set the `{env}` environment variable")]
    MissingApiKey { tier: String, env: String },
    #[error("cannot build client for tier `{tier}`: {source}")]
    Provider {
        tier: String,
        #[source]
        source: ProviderError,
    },
}

/// Builds the tier chain in configuration order.
pub fn build_fallback_client(config: &Config) -> Result<FallbackClient, ClientBuildError> {
    let mut tiers = Vec::with_capacity(config.tiers.len());
    for tier in &config.tiers {
        let api_key = tier
            .api_key
            .clone()
            .ok_or_else(|| ClientBuildError::MissingApiKey {
                tier: tier.name.clone(),
                env: tier.api_key_env.clone(),
            })?;

        let client = match tier.provider {
            ProviderKind::OpenAi => {
                let settings = OpenAiSettings {
                    base_url: tier
                        .base_url
                        .clone()
                        .unwrap_or_else(|| openai::DEFAULT_BASE_URL.to_string()),
                    model: tier.model.clone(),
                    api_key,
                    timeout: Duration::from_secs(tier.timeout_secs),
                    max_tokens: tier.max_tokens,
                };
                OpenAiClient::new(settings).map_err(|source| ClientBuildError::Provider {
                    tier: tier.name.clone(),
                    source,
                })?
            }
        };
        info!(tier = %tier.name, model = %tier.model, "Configured generation tier");
        tiers.push(FallbackTier::new(tier.name.clone(), Arc::new(client)));
    }
    Ok(FallbackClient::new(tiers, config.retry.policy()))
}
