//! Configuration I/O - Loading and saving configuration
//!
//! Handles reading configuration from files and environment variables.

use std::path::Path;

use super::types::language::builtin_languages;
use super::types::Config;
use crate::error::{Error, Result};

/// Load configuration with layered precedence:
/// 1. Config file if it exists, otherwise defaults
/// 2. Environment variable overrides (includes .env)
pub fn load_config() -> Result<Config> {
    let config_path = super::paths::config_path();

    let mut config = if config_path.exists() {
        load_config_from_path(&config_path)?
    } else {
        Config::default()
    };

    apply_env_overrides(&mut config);

    Ok(config)
}

/// Load configuration from a specific path
pub fn load_config_from_path(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;

    let mut config: Config = if path.extension().map_or(false, |ext| ext == "json") {
        json5::from_str(&content).map_err(|e| Error::Config(format!("Invalid JSON config: {}", e)))?
    } else if path.extension().map_or(false, |ext| ext == "toml") {
        toml::from_str(&content).map_err(|e| Error::Config(format!("Invalid TOML config: {}", e)))?
    } else {
        // Try JSON5 first, then TOML
        json5::from_str(&content)
            .or_else(|_| toml::from_str(&content).map_err(|e| Error::Config(e.to_string())))
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?
    };

    // Configured languages extend the built-ins rather than replacing them
    for (id, language) in builtin_languages() {
        config.languages.entry(id).or_insert(language);
    }

    Ok(config)
}

/// Apply environment variable overrides to an existing config.
///
/// Loads a `.env` file first if present. Env vars have the highest
/// precedence: defaults < file < env.
pub fn apply_env_overrides(config: &mut Config) {
    dotenvy::dotenv().ok();

    if let Ok(bind) = std::env::var("CODERUNNER_BIND") {
        config.server.bind = bind;
    }
    if let Ok(port) = std::env::var("CODERUNNER_PORT").or_else(|_| std::env::var("PORT")) {
        if let Ok(port) = port.parse() {
            config.server.port = port;
        }
    }

    if let Ok(root) = std::env::var("CODERUNNER_TEMP_ROOT") {
        config.sandbox.temp_root = std::path::PathBuf::from(root);
    }
    if let Ok(backend) = std::env::var("CODERUNNER_BACKEND") {
        if let Ok(backend) = backend.parse() {
            config.sandbox.backend = backend;
        }
    }
    if let Ok(launcher) = std::env::var("CODERUNNER_LAUNCHER") {
        config.sandbox.launcher = launcher;
    }
    if let Ok(capacity) = std::env::var("CODERUNNER_QUEUE_CAPACITY") {
        if let Ok(v) = capacity.parse() {
            config.sandbox.queue_capacity = v;
        }
    }
}

/// Save configuration to a file
pub fn save_config(config: &Config, path: &Path) -> Result<()> {
    let content = if path.extension().map_or(false, |ext| ext == "toml") {
        toml::to_string_pretty(config)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?
    } else {
        serde_json::to_string_pretty(config)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(path, content)?;
    Ok(())
}
