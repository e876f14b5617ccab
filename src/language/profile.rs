use serde::Serialize;
use std::time::Duration;

use crate::config::{LanguageConfig, FILE_PLACEHOLDER};

/// Stem of the source file written into every workspace
pub const SOURCE_FILE_STEM: &str = "main";

/// Immutable description of how to run one language in a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LanguageProfile {
    /// Registry id, also used as the workspace subdirectory name
    pub id: String,
    /// Source file extension, without the dot
    pub extension: String,
    /// Argument template; each `{file}` is replaced with the in-container path
    pub command: Vec<String>,
    /// Container image reference
    pub image: String,
    /// Hard limit for one run
    #[serde(with = "humantime_serde")]
    pub max_duration: Duration,
    /// Id of the profile that runs after this one, in the same workspace
    pub next_stage: Option<String>,
}

impl LanguageProfile {
    pub fn from_config(id: impl Into<String>, config: &LanguageConfig) -> Self {
        LanguageProfile {
            id: id.into(),
            extension: config.extension.clone(),
            command: config.command.clone(),
            image: config.image.clone(),
            max_duration: config.max_duration,
            next_stage: config.next_stage.clone(),
        }
    }

    /// A profile with nothing to run is treated as absent
    pub fn is_empty(&self) -> bool {
        self.image.trim().is_empty() || self.command.is_empty()
    }

    /// `main.<extension>`
    pub fn source_file_name(&self) -> String {
        format!("{}.{}", SOURCE_FILE_STEM, self.extension)
    }

    /// Build the in-container argv for a source file path.
    ///
    /// Substitution happens per argument, so paths with spaces stay one argument.
    pub fn render_command(&self, file: &str) -> Vec<String> {
        self.command
            .iter()
            .map(|arg| arg.replace(FILE_PLACEHOLDER, file))
            .collect()
    }
}
