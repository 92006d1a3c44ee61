//! Configuration loading and config-file resolution
//!
//! Config file priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`TERPSCAN_CONFIG`)
//! 3. OS-dependent default (`<config_dir>/terpscan/config.toml`)
//! 4. Built-in defaults when no file exists
//!
//! Every field carries a default, so a partial TOML file is valid.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "TERPSCAN_CONFIG";

/// Default chemical-profile API (Cannlytics strain data)
pub const DEFAULT_CANNLYTICS_URL: &str = "https://cannlytics.com/api/data/strains";

/// Default OpenAI-compatible API base URL
pub const DEFAULT_MODEL_BASE_URL: &str = "https://api.openai.com/v1";

/// Complete terpscan configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TomlConfig {
    /// API key for the vision/text model provider
    pub openai_api_key: Option<String>,
    /// Model endpoint and retry settings
    pub models: ModelSettings,
    /// Image chunking thresholds
    pub chunking: ChunkingSettings,
    /// Terpene resolution settings
    pub resolver: ResolverSettings,
    /// HTML menu settings
    pub html: HtmlSettings,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Model provider settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelSettings {
    /// OpenAI-compatible base URL (no trailing `/chat/completions`)
    pub base_url: String,
    /// Vision-capable model used for menu images
    pub vision_model: String,
    /// Text model used for HTML menus, cleanup and terpene estimation
    pub text_model: String,
    /// Attempts per call, including the first (retries on 429/5xx)
    pub max_attempts: u32,
    /// Total request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_MODEL_BASE_URL.to_string(),
            vision_model: "gpt-4o".to_string(),
            text_model: "gpt-4o-mini".to_string(),
            max_attempts: 3,
            timeout_secs: 60,
        }
    }
}

/// Image chunking settings (pixels)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingSettings {
    /// Height of each vertical band
    pub max_chunk_height: u32,
    /// Rows shared by adjacent bands
    pub overlap: u32,
    /// Images at or below this height are never split
    pub threshold: u32,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            max_chunk_height: 3000,
            overlap: 200,
            threshold: 4000,
        }
    }
}

/// Terpene resolution settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResolverSettings {
    /// Number of strains resolved concurrently per window
    pub concurrency_window: usize,
    /// Chemical-profile API base URL
    pub cannlytics_base_url: String,
    /// Chemical-profile API rate limit
    pub requests_per_second: u32,
    /// Query the chemical-profile API when the local set misses
    pub enable_chemical_lookup: bool,
    /// Ask the text model for an estimate when everything else misses
    pub enable_model_estimate: bool,
    /// Replace the bundled reference set with this JSON file
    pub reference_set_path: Option<PathBuf>,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            concurrency_window: 5,
            cannlytics_base_url: DEFAULT_CANNLYTICS_URL.to_string(),
            requests_per_second: 2,
            enable_chemical_lookup: true,
            enable_model_estimate: true,
            reference_set_path: None,
        }
    }
}

/// HTML menu settings
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HtmlSettings {
    /// Character budget for stripped menu text sent to the text model
    pub max_chars: usize,
}

impl Default for HtmlSettings {
    fn default() -> Self {
        Self { max_chars: 24_000 }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level filter (`RUST_LOG` overrides)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// OS-dependent default config file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("terpscan").join("config.toml"))
}

/// Load configuration following the priority order in the module docs
///
/// An explicitly named file (CLI or environment) must exist; the OS default
/// location is optional and falls back to built-in defaults.
pub fn load_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    if let Some(path) = cli_arg {
        return load_toml_config(path);
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return load_toml_config(Path::new(path.trim()));
        }
    }

    match default_config_path() {
        Some(path) if path.exists() => load_toml_config(&path),
        _ => {
            debug!("No config file found, using built-in defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Read and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Read config {} failed: {}", path.display(), e))
    })?;
    let config: TomlConfig = toml::from_str(&content)?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Write a config file atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let content = toml::to_string_pretty(config)?;
    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;

    debug!("Wrote configuration to {}", path.display());
    Ok(())
}

/// Standard User-Agent for outgoing HTTP requests
pub fn get_user_agent() -> String {
    format!("terpscan/{}", env!("CARGO_PKG_VERSION"))
}
