//! Sandbox configuration types
//!
//! Configuration for the container backend, workspace root and job queue.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Sandbox configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// How containers are launched
    #[serde(default)]
    pub backend: SandboxBackend,
    /// Container CLI used by the `cli` backend
    #[serde(default = "default_launcher")]
    pub launcher: String,
    /// Arguments placed before the `run` subcommand (e.g. `--remote`)
    #[serde(default)]
    pub launcher_args: Vec<String>,
    /// Host directory under which per-job workspaces are created
    #[serde(default = "default_temp_root")]
    pub temp_root: PathBuf,
    /// In-container directory under which the workspace is mounted
    #[serde(default = "default_mount_root")]
    pub mount_root: String,
    /// Maximum number of jobs waiting for their turn
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Container network mode
    #[serde(default = "default_network")]
    pub network: String,
    /// Container memory limit (e.g. "512m")
    #[serde(default)]
    pub memory_limit: Option<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        SandboxConfig {
            backend: SandboxBackend::default(),
            launcher: default_launcher(),
            launcher_args: Vec::new(),
            temp_root: default_temp_root(),
            mount_root: default_mount_root(),
            queue_capacity: default_queue_capacity(),
            network: default_network(),
            memory_limit: None,
        }
    }
}

fn default_launcher() -> String {
    "docker".to_string()
}

fn default_temp_root() -> PathBuf {
    std::env::current_dir()
        .map(|d| d.join("tmp"))
        .unwrap_or_else(|_| PathBuf::from("./tmp"))
}

fn default_mount_root() -> String {
    "/tmp".to_string()
}

fn default_queue_capacity() -> usize {
    500
}

fn default_network() -> String {
    "none".to_string()
}

/// Container launch backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxBackend {
    /// Spawn the container CLI (`docker run ...`)
    #[default]
    Cli,
    /// Talk to the Docker Engine API directly
    Api,
}

impl std::str::FromStr for SandboxBackend {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cli" | "docker-cli" => Ok(SandboxBackend::Cli),
            "api" | "engine" => Ok(SandboxBackend::Api),
            _ => Err(crate::error::Error::Config(format!(
                "Invalid sandbox backend: {}. Valid: cli, api",
                s
            ))),
        }
    }
}

impl std::fmt::Display for SandboxBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SandboxBackend::Cli => write!(f, "cli"),
            SandboxBackend::Api => write!(f, "api"),
        }
    }
}
