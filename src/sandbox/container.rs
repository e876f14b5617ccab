//! Docker Engine API execution
//!
//! Same contract as the CLI runner, but drives the daemon directly: pulls
//! missing images, creates a container with the workspace bind-mounted,
//! waits with a deadline, reads the logs in order, and force-removes it.

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, KillContainerOptions, LogOutput, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::Docker;
use futures::StreamExt;
use std::collections::HashSet;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::SandboxConfig;
use crate::error::{Error, Result};
use crate::sandbox::runner::{SandboxInvocation, SandboxRunner};

/// Docker Engine API runner
pub struct ContainerRunner {
    /// Docker client
    docker: Docker,
    /// Network mode
    network: String,
    /// Memory limit in bytes
    memory: Option<i64>,
    /// Images known to be present locally
    pulled: Mutex<HashSet<String>>,
}

impl ContainerRunner {
    /// Connect to the local Docker daemon
    pub async fn new(config: &SandboxConfig) -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| Error::Sandbox(format!("Failed to connect to Docker: {}", e)))?;

        docker
            .ping()
            .await
            .map_err(|e| Error::Sandbox(format!("Docker ping failed: {}", e)))?;

        info!("Container runner connected to Docker");

        let memory = match &config.memory_limit {
            Some(limit) => Some(parse_memory_limit(limit).ok_or_else(|| {
                Error::Config(format!("Invalid memory limit: {}", limit))
            })?),
            None => None,
        };

        Ok(ContainerRunner {
            docker,
            network: config.network.clone(),
            memory,
            pulled: Mutex::new(HashSet::new()),
        })
    }

    /// Pull `image` unless it is already present
    async fn ensure_image(&self, image: &str) -> Result<()> {
        let mut pulled = self.pulled.lock().await;
        if pulled.contains(image) {
            return Ok(());
        }

        if self.docker.inspect_image(image).await.is_err() {
            info!("Pulling Docker image: {}", image);

            let options = CreateImageOptions {
                from_image: image.to_string(),
                ..Default::default()
            };

            let mut stream = self.docker.create_image(Some(options), None, None);

            while let Some(result) = stream.next().await {
                match result {
                    Ok(info) => {
                        if let Some(status) = info.status {
                            debug!("Pull status: {}", status);
                        }
                    }
                    Err(e) => {
                        return Err(Error::Sandbox(format!("Failed to pull image {}: {}", image, e)));
                    }
                }
            }

            info!("Image {} pulled", image);
        }

        pulled.insert(image.to_string());
        Ok(())
    }

    /// Wait for a container to stop, returning its exit code
    async fn wait_for_container(&self, name: &str) -> Result<i64> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };

        let mut stream = self.docker.wait_container(name, Some(options));

        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // Non-zero exits surface as an error carrying the code
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(Error::Sandbox(format!("Wait failed: {}", e))),
            None => Err(Error::Sandbox("Container wait stream ended".to_string())),
        }
    }

    /// Read stdout and stderr interleaved in arrival order
    async fn get_container_logs(&self, name: &str) -> String {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            ..Default::default()
        };

        let mut stream = self.docker.logs(name, Some(options));
        let mut combined = Vec::new();

        while let Some(result) = stream.next().await {
            match result {
                Ok(LogOutput::StdOut { message })
                | Ok(LogOutput::StdErr { message })
                | Ok(LogOutput::Console { message }) => combined.extend_from_slice(&message),
                Ok(_) => {}
                Err(e) => warn!("Error reading logs: {}", e),
            }
        }

        String::from_utf8_lossy(&combined).into_owned()
    }

    async fn kill_container(&self, name: &str) {
        if let Err(e) = self
            .docker
            .kill_container(name, None::<KillContainerOptions<String>>)
            .await
        {
            debug!("Kill of {} failed: {}", name, e);
        }
    }

    async fn remove_container(&self, name: &str) {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };

        match self.docker.remove_container(name, Some(options)).await {
            Ok(()) => debug!("Removed container: {}", name),
            Err(e) => warn!("Failed to remove container {}: {}", name, e),
        }
    }

    fn guard(&self, name: &str) -> ContainerGuard {
        ContainerGuard {
            docker: self.docker.clone(),
            name: name.to_string(),
            armed: true,
        }
    }

    async fn start(&self, invocation: &SandboxInvocation) -> Result<()> {
        self.ensure_image(&invocation.image).await?;

        let create_options = CreateContainerOptions {
            name: invocation.name.as_str(),
            platform: None,
        };

        self.docker
            .create_container(
                Some(create_options),
                container_config(invocation, &self.network, self.memory),
            )
            .await
            .map_err(|e| Error::Sandbox(format!("Failed to create container: {}", e)))?;

        debug!("Created container: {}", invocation.name);

        self.docker
            .start_container(&invocation.name, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| Error::Sandbox(format!("Failed to start container: {}", e)))?;

        Ok(())
    }
}

/// Force-removes the container if `run` is dropped before it cleans up
struct ContainerGuard {
    docker: Docker,
    name: String,
    armed: bool,
}

impl ContainerGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("No runtime left to remove container {}", self.name);
            return;
        };

        warn!("Run of {} was abandoned, removing container", self.name);
        let docker = self.docker.clone();
        let name = std::mem::take(&mut self.name);
        handle.spawn(async move {
            let options = RemoveContainerOptions {
                force: true,
                ..Default::default()
            };
            if let Err(e) = docker.remove_container(&name, Some(options)).await {
                warn!("Failed to remove container {}: {}", name, e);
            }
        });
    }
}

/// Container configuration for one invocation
fn container_config(invocation: &SandboxInvocation, network: &str, memory: Option<i64>) -> Config<String> {
    let bind = format!("{}:{}", invocation.host_dir.display(), invocation.container_dir);

    Config {
        image: Some(invocation.image.clone()),
        cmd: Some(invocation.command.clone()),
        working_dir: Some(invocation.container_dir.clone()),
        network_disabled: Some(network == "none"),
        // A pty keeps stdout and stderr in the order they were written
        tty: Some(true),
        host_config: Some(bollard::service::HostConfig {
            binds: Some(vec![bind]),
            memory,
            network_mode: Some(network.to_string()),
            auto_remove: Some(false), // Removed manually after reading logs
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Parse a memory limit string (e.g., "512m", "1g") to bytes
fn parse_memory_limit(limit: &str) -> Option<i64> {
    let limit = limit.to_lowercase();
    let (num_str, unit) = if limit.ends_with('g') || limit.ends_with("gb") {
        (limit.trim_end_matches(|c| c == 'g' || c == 'b'), "g")
    } else if limit.ends_with('m') || limit.ends_with("mb") {
        (limit.trim_end_matches(|c| c == 'm' || c == 'b'), "m")
    } else if limit.ends_with('k') || limit.ends_with("kb") {
        (limit.trim_end_matches(|c| c == 'k' || c == 'b'), "k")
    } else {
        (limit.as_str(), "b")
    };

    let num: i64 = num_str.parse().ok()?;

    let scale: i64 = match unit {
        "g" => 1024 * 1024 * 1024,
        "m" => 1024 * 1024,
        "k" => 1024,
        _ => 1,
    };
    num.checked_mul(scale)
}

#[async_trait]
impl SandboxRunner for ContainerRunner {
    fn name(&self) -> &str {
        "api"
    }

    async fn run(&self, invocation: &SandboxInvocation) -> Result<String> {
        let start = Instant::now();
        let guard = self.guard(&invocation.name);

        if let Err(e) = self.start(invocation).await {
            self.remove_container(&invocation.name).await;
            guard.disarm();
            return Err(e);
        }

        let waited =
            tokio::time::timeout(invocation.timeout, self.wait_for_container(&invocation.name))
                .await;

        if waited.is_err() {
            warn!(
                "Container {} timed out after {:?}",
                invocation.name, invocation.timeout
            );
            self.kill_container(&invocation.name).await;
        }

        let output = self.get_container_logs(&invocation.name).await;
        self.remove_container(&invocation.name).await;
        guard.disarm();

        match waited {
            Ok(Ok(0)) => {
                debug!("Container {} finished in {:?}", invocation.name, start.elapsed());
                Ok(output)
            }
            Ok(Ok(code)) => Err(Error::Execution {
                status: Some(code),
                output,
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::Timeout {
                limit: invocation.timeout,
                output,
            }),
        }
    }
}
