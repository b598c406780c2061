// dirdoc/src/config.rs

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use crate::client::fallback::RetryPolicy;
use crate::ignore_chain::DEFAULT_IGNORE_FILES;
use crate::path_safety::PathCheck;
use crate::prompt::DEFAULT_MAX_FILE_BYTES;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default)]
    pub force: bool,
    #[serde(default = "default_ignore_files")]
    pub ignore_files: Vec<String>,
    #[serde(default)]
    pub prompt: PromptSection,
    #[serde(default)]
    pub path_check: PathCheck,
    #[serde(default = "default_true")]
    pub refresh_root: bool,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub tiers: Vec<TierConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: default_root(),
            force: false,
            ignore_files: default_ignore_files(),
            prompt: PromptSection::default(),
            path_check: PathCheck::default(),
            refresh_root: true,
            retry: RetrySection::default(),
            tiers: Vec::new(),
        }
    }
}

impl Config {
    pub fn trace_loaded(&self) {
        info!(
            root = %self.root.display(),
            force = self.force,
            tiers_count = self.tiers.len(),
            refresh_root = self.refresh_root,
            "Loaded Config"
        );
        for tier in &self.tiers {
            tier.trace_loaded();
        }
        debug!(ignore_files = ?self.ignore_files, path_check = ?self.path_check, "Config loaded (full debug)");
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptSection {
    /// Inline template overriding the built-in one.
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: usize,
}

impl Default for PromptSection {
    fn default() -> Self {
        Self {
            template: None,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_retries_per_tier")]
    pub retries_per_tier: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            retries_per_tier: default_retries_per_tier(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetrySection {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            retries_per_tier: self.retries_per_tier,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierConfig {
    pub name: String,
    #[serde(default = "default_provider")]
    pub provider: ProviderKind,
    #[serde(default)]
    pub base_url: Option<String>,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Injected from `api_key_env` at load time; never read from or written to YAML.
    #[serde(skip)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl TierConfig {
    pub fn trace_loaded(&self) {
        info!(
            tier = %self.name,
            provider = ?self.provider,
            model = %self.model,
            api_key_env = %self.api_key_env,
            api_key_present = self.api_key.is_some(),
            "Loaded generation tier"
        );
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_ignore_files() -> Vec<String> {
    DEFAULT_IGNORE_FILES.iter().map(|s| s.to_string()).collect()
}

fn default_true() -> bool {
    true
}

fn default_max_file_bytes() -> usize {
    DEFAULT_MAX_FILE_BYTES
}

fn default_retries_per_tier() -> u32 {
    crate::client::fallback::DEFAULT_RETRIES_PER_TIER
}

fn default_base_delay_ms() -> u64 {
    crate::client::fallback::DEFAULT_BASE_DELAY.as_millis() as u64
}

fn default_max_delay_ms() -> u64 {
    crate::client::fallback::DEFAULT_MAX_DELAY.as_millis() as u64
}

fn default_provider() -> ProviderKind {
    ProviderKind::OpenAi
}

fn default_timeout_secs() -> u64 {
    crate::client::openai::DEFAULT_TIMEOUT.as_secs()
}
