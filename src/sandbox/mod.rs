//! Sandbox module - Container-isolated code execution
//!
//! Two interchangeable backends:
//! - CLI: spawns `docker run` (or a compatible launcher such as podman)
//! - API: drives the Docker Engine API directly

mod container;
mod docker_cli;
mod runner;

#[cfg(test)]
pub(crate) mod testing;

pub use container::ContainerRunner;
pub use docker_cli::DockerCliRunner;
pub use runner::{SandboxInvocation, SandboxRunner};

use std::sync::Arc;

use crate::config::{SandboxBackend, SandboxConfig};
use crate::error::Result;

/// Create a runner based on the configuration
pub async fn create_runner(config: &SandboxConfig) -> Result<Arc<dyn SandboxRunner>> {
    match config.backend {
        SandboxBackend::Cli => {
            let runner = DockerCliRunner::new(config)?;
            Ok(Arc::new(runner))
        }
        SandboxBackend::Api => {
            let runner = ContainerRunner::new(config).await?;
            Ok(Arc::new(runner))
        }
    }
}
