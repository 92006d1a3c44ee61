//! Configuration loading tests
//!
//! Covers config-file priority (CLI, environment, default), partial TOML
//! files falling back to defaults, and atomic writes.
//!
//! Tests that touch TERPSCAN_CONFIG are marked #[serial] so they never race
//! on the process environment.

use serial_test::serial;
use std::env;
use std::fs;
use tempfile::TempDir;
use terpscan_common::config::{
    load_config, load_toml_config, write_toml_config, ChunkingSettings, TomlConfig,
    CONFIG_ENV_VAR, DEFAULT_CANNLYTICS_URL,
};
use terpscan_common::Error;

#[test]
fn test_defaults() {
    let config = TomlConfig::default();
    assert!(config.openai_api_key.is_none());
    assert_eq!(config.models.vision_model, "gpt-4o");
    assert_eq!(config.models.text_model, "gpt-4o-mini");
    assert_eq!(config.models.max_attempts, 3);
    assert_eq!(
        config.chunking,
        ChunkingSettings {
            max_chunk_height: 3000,
            overlap: 200,
            threshold: 4000
        }
    );
    assert_eq!(config.resolver.concurrency_window, 5);
    assert_eq!(config.resolver.cannlytics_base_url, DEFAULT_CANNLYTICS_URL);
    assert_eq!(config.html.max_chars, 24_000);
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_partial_toml_uses_defaults_for_missing_fields() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
openai_api_key = "sk-test"

[chunking]
overlap = 150

[resolver]
enable_model_estimate = false
"#,
    )
    .unwrap();

    let config = load_toml_config(&path).unwrap();
    assert_eq!(config.openai_api_key.as_deref(), Some("sk-test"));
    assert_eq!(config.chunking.overlap, 150);
    assert_eq!(config.chunking.max_chunk_height, 3000);
    assert!(!config.resolver.enable_model_estimate);
    assert!(config.resolver.enable_chemical_lookup);
    assert_eq!(config.models.vision_model, "gpt-4o");
}

#[test]
fn test_malformed_toml_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    fs::write(&path, "[chunking\noverlap = ").unwrap();

    let result = load_toml_config(&path);
    assert!(matches!(result, Err(Error::Toml(_))));
}

#[test]
fn test_missing_explicit_file_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("does-not-exist.toml");

    let result = load_config(Some(&path));
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_cli_path_wins_over_environment() {
    let temp_dir = TempDir::new().unwrap();
    let cli_path = temp_dir.path().join("cli.toml");
    let env_path = temp_dir.path().join("env.toml");
    fs::write(&cli_path, "[html]\nmax_chars = 100\n").unwrap();
    fs::write(&env_path, "[html]\nmax_chars = 200\n").unwrap();

    env::set_var(CONFIG_ENV_VAR, &env_path);
    let config = load_config(Some(&cli_path)).unwrap();
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(config.html.max_chars, 100);
}

#[test]
#[serial]
fn test_environment_path_used_without_cli() {
    let temp_dir = TempDir::new().unwrap();
    let env_path = temp_dir.path().join("env.toml");
    fs::write(&env_path, "[logging]\nlevel = \"debug\"\n").unwrap();

    env::set_var(CONFIG_ENV_VAR, &env_path);
    let config = load_config(None).unwrap();
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_write_then_load() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("config.toml");

    let mut config = TomlConfig::default();
    config.openai_api_key = Some("sk-written".to_string());
    config.resolver.concurrency_window = 8;

    write_toml_config(&config, &path).unwrap();
    assert!(path.exists());
    assert!(!path.with_extension("toml.tmp").exists());

    let loaded = load_toml_config(&path).unwrap();
    assert_eq!(loaded, config);
}
