//! Configuration resolution for terpscan-ingest
//!
//! Model API key priority: `TERPSCAN_OPENAI_API_KEY` → `OPENAI_API_KEY` → TOML.

use terpscan_common::config::TomlConfig;
use terpscan_common::{Error, Result};
use tracing::{info, warn};

/// Project-specific key variable (highest priority)
pub const API_KEY_ENV_VAR: &str = "TERPSCAN_OPENAI_API_KEY";

/// Conventional provider key variable
pub const OPENAI_ENV_VAR: &str = "OPENAI_API_KEY";

/// Resolve the model provider API key from environment and TOML
pub fn resolve_openai_api_key(toml_config: &TomlConfig) -> Result<String> {
    let candidates = [
        (std::env::var(API_KEY_ENV_VAR).ok(), API_KEY_ENV_VAR),
        (std::env::var(OPENAI_ENV_VAR).ok(), OPENAI_ENV_VAR),
        (toml_config.openai_api_key.clone(), "TOML"),
    ];

    let sources: Vec<&str> = candidates
        .iter()
        .filter(|(key, _)| key.as_deref().map_or(false, is_valid_key))
        .map(|(_, source)| *source)
        .collect();

    // Warn if multiple sources (potential misconfiguration)
    if sources.len() > 1 {
        warn!(
            "Model API key found in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }

    for (key, source) in candidates {
        if let Some(key) = key {
            if is_valid_key(&key) {
                info!("Model API key loaded from {}", source);
                return Ok(key.trim().to_string());
            }
        }
    }

    let config_path = terpscan_common::config::default_config_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "~/.config/terpscan/config.toml".to_string());

    Err(Error::Config(format!(
        "Model API key not configured. Please configure using one of:\n\
         1. Environment: {}=your-key-here\n\
         2. Environment: {}=your-key-here\n\
         3. TOML config: {} (openai_api_key = \"your-key\")",
        API_KEY_ENV_VAR,
        OPENAI_ENV_VAR,
        config_path
    )))
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
