//! Language configuration types
//!
//! One entry per runnable language. Built-in entries cover go, node,
//! python3 and java; a config file may override or extend them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Placeholder substituted with the in-container source path
pub const FILE_PLACEHOLDER: &str = "{file}";

/// How to run one language inside a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageConfig {
    /// Source file extension, without the dot
    pub extension: String,
    /// Command run inside the container; `{file}` is replaced per argument
    pub command: Vec<String>,
    /// Container image reference
    pub image: String,
    /// Wall-clock limit for one run
    #[serde(with = "humantime_serde", default = "default_max_duration")]
    pub max_duration: Duration,
    /// Language id to run next in the same workspace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_stage: Option<String>,
}

fn default_max_duration() -> Duration {
    Duration::from_secs(10)
}

impl LanguageConfig {
    fn builtin(extension: &str, command: &[&str], image: &str) -> Self {
        LanguageConfig {
            extension: extension.to_string(),
            command: command.iter().map(|s| s.to_string()).collect(),
            image: image.to_string(),
            max_duration: default_max_duration(),
            next_stage: None,
        }
    }
}

/// The languages available without any configuration
pub fn builtin_languages() -> BTreeMap<String, LanguageConfig> {
    let mut languages = BTreeMap::new();
    languages.insert(
        "go".to_string(),
        LanguageConfig::builtin("go", &["go", "run", FILE_PLACEHOLDER], "golang:1.12"),
    );
    languages.insert(
        "node".to_string(),
        LanguageConfig::builtin("javascript", &["node", FILE_PLACEHOLDER], "node:10"),
    );
    languages.insert(
        "python3".to_string(),
        LanguageConfig::builtin("py", &["python", FILE_PLACEHOLDER], "python:3.7"),
    );
    languages.insert(
        "java".to_string(),
        LanguageConfig::builtin("java", &["java", FILE_PLACEHOLDER], "openjdk:11"),
    );
    languages
}
