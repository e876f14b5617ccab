//! Configuration module
//!
//! - types/mod.rs: Core configuration types (Config, ServerConfig)
//! - types/sandbox.rs: Container backend, workspace root and queue settings
//! - types/language.rs: Per-language run profiles and the built-in table
//! - io.rs: Configuration loading and saving
//! - validation.rs: Configuration validation
//! - paths.rs: Configuration file paths

mod io;
mod paths;
mod types;
mod validation;

pub use types::{Config, ServerConfig};

pub use types::language::{builtin_languages, LanguageConfig, FILE_PLACEHOLDER};

pub use types::sandbox::{SandboxBackend, SandboxConfig};

pub use io::{apply_env_overrides, load_config, load_config_from_path, save_config};
pub use paths::{config_dir, config_path};
pub use validation::{validate_config, ConfigValidationResult, ValidationIssue};
