//! Configuration validation
//!
//! Validates configuration and reports issues.

use std::collections::HashSet;

use super::types::sandbox::SandboxBackend;
use super::types::Config;

/// Result of configuration validation
#[derive(Debug, Clone)]
pub struct ConfigValidationResult {
    /// Whether the config is valid
    pub valid: bool,
    /// Validation errors (critical)
    pub errors: Vec<ValidationIssue>,
    /// Validation warnings (non-critical)
    pub warnings: Vec<ValidationIssue>,
}

impl ConfigValidationResult {
    /// Create a valid result
    pub fn valid() -> Self {
        ConfigValidationResult {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Add an error
    pub fn with_error(mut self, issue: ValidationIssue) -> Self {
        self.valid = false;
        self.errors.push(issue);
        self
    }

    /// Add a warning
    pub fn with_warning(mut self, issue: ValidationIssue) -> Self {
        self.warnings.push(issue);
        self
    }
}

/// A validation issue
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the config field
    pub path: String,
    /// Issue message
    pub message: String,
    /// Suggested fix
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    /// Create a new issue
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationIssue {
            path: path.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    /// Add a suggestion
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " ({})", suggestion)?;
        }
        Ok(())
    }
}

/// Validate the configuration
pub fn validate_config(config: &Config) -> ConfigValidationResult {
    let mut result = ConfigValidationResult::valid();

    result = validate_sandbox_config(config, result);
    result = validate_language_config(config, result);

    result
}

fn validate_sandbox_config(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    let sandbox = &config.sandbox;

    if sandbox.queue_capacity == 0 {
        result = result.with_error(
            ValidationIssue::new("sandbox.queue_capacity", "Queue capacity must be at least 1")
                .with_suggestion("Use the default of 500"),
        );
    }

    if !sandbox.mount_root.starts_with('/') {
        result = result.with_error(ValidationIssue::new(
            "sandbox.mount_root",
            format!("Mount root must be an absolute path, got {}", sandbox.mount_root),
        ));
    }

    if sandbox.backend == SandboxBackend::Cli && which::which(&sandbox.launcher).is_err() {
        result = result.with_warning(
            ValidationIssue::new(
                "sandbox.launcher",
                format!("Launcher {} not found in PATH", sandbox.launcher),
            )
            .with_suggestion("Install docker or set sandbox.launcher (e.g. podman)"),
        );
    }

    result
}

fn validate_language_config(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    if config.languages.is_empty() {
        result = result.with_error(ValidationIssue::new(
            "languages",
            "No languages configured",
        ));
    }

    for (id, language) in &config.languages {
        let path = format!("languages.{}", id);

        if language.image.trim().is_empty() {
            result = result.with_error(ValidationIssue::new(
                format!("{}.image", path),
                "Container image is empty",
            ));
        }
        if language.command.is_empty() {
            result = result.with_error(ValidationIssue::new(
                format!("{}.command", path),
                "Run command is empty",
            ));
        } else if !language
            .command
            .iter()
            .any(|arg| arg.contains(super::types::language::FILE_PLACEHOLDER))
        {
            result = result.with_warning(
                ValidationIssue::new(
                    format!("{}.command", path),
                    "Run command never references the source file",
                )
                .with_suggestion("Add a {file} argument"),
            );
        }
        if language.max_duration.is_zero() {
            result = result.with_error(ValidationIssue::new(
                format!("{}.max_duration", path),
                "Maximum duration must be greater than zero",
            ));
        }
        if let Some(next) = &language.next_stage {
            if !config.languages.contains_key(next) {
                result = result.with_error(ValidationIssue::new(
                    format!("{}.next_stage", path),
                    format!("Unknown next stage {}", next),
                ));
            }
        }
    }

    for id in config.languages.keys() {
        let mut seen = HashSet::new();
        let mut current = Some(id);
        while let Some(stage) = current {
            if !seen.insert(stage) {
                result = result.with_error(ValidationIssue::new(
                    format!("languages.{}.next_stage", id),
                    "Stage chain loops back on itself",
                ));
                break;
            }
            current = config
                .languages
                .get(stage)
                .and_then(|l| l.next_stage.as_ref());
        }
    }

    result
}
