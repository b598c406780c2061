use crate::config::Config;
use anyhow::Result;
use std::fs;
use std::path::Path;
use tracing::{error, info, warn};

/// Loads a static YAML config file (no secrets) and injects API keys from the
/// environment variables each tier names.
///
/// A tier whose key variable is unset is kept with `api_key: None`; building
/// the client for it fails later, so `plan` works without credentials.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!("Failed to read config file {:?}: {}", path_ref, e));
        }
    };

    let mut config: Config = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    if let Some(template) = &config.prompt.template {
        if template.trim().is_empty() {
            error!(config_path = ?path_ref, "prompt.template is empty");
            anyhow::bail!("prompt.template must not be empty");
        }
    }

    let mut seen = std::collections::HashSet::new();
    for tier in &mut config.tiers {
        if !seen.insert(tier.name.clone()) {
            error!(tier = %tier.name, "Duplicate tier name in config");
            anyhow::bail!("Duplicate tier name: {}", tier.name);
        }
        match std::env::var(&tier.api_key_env) {
            Ok(key) if !key.is_empty() => {
                info!(tier = %tier.name, api_key_env = %tier.api_key_env, "API key found in env");
                tier.api_key = Some(key);
            }
            Ok(_) | Err(_) => {
                warn!(tier = %tier.name, api_key_env = %tier.api_key_env, "API key environment variable not set");
                tier.api_key = None;
            }
        }
    }

    config.trace_loaded();
    info!(
        root = %config.root.display(),
        tiers_count = config.tiers.len(),
        "Config loaded and merged successfully"
    );

    Ok(config)
}
