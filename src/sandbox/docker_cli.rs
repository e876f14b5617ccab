//! Container execution through the docker (or compatible) CLI
//!
//! Spawns `docker run -t` with the workspace bind-mounted and reads the
//! client's stdout and stderr through one shared pipe, so output keeps the
//! order it was written in. The deadline is enforced by killing the client
//! and force-removing the named container.

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::unix::pipe;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::SandboxConfig;
use crate::error::{Error, Result};
use crate::sandbox::runner::{SandboxInvocation, SandboxRunner};

/// How long to keep draining the pipe after the process is gone
const OUTPUT_GRACE: Duration = Duration::from_secs(1);

/// Runner that shells out to a container CLI
#[derive(Debug, Clone)]
pub struct DockerCliRunner {
    /// Resolved launcher executable
    launcher: PathBuf,
    /// Arguments placed before the subcommand
    launcher_args: Vec<String>,
    /// Network mode for `--network`
    network: String,
    /// Value for `--memory`
    memory_limit: Option<String>,
}

impl DockerCliRunner {
    /// Create a runner, resolving the launcher on `PATH`
    pub fn new(config: &SandboxConfig) -> Result<Self> {
        let launcher = which::which(&config.launcher).map_err(|e| {
            Error::Sandbox(format!("Launcher {} not found: {}", config.launcher, e))
        })?;

        Ok(DockerCliRunner {
            launcher,
            launcher_args: config.launcher_args.clone(),
            network: config.network.clone(),
            memory_limit: config.memory_limit.clone(),
        })
    }

    /// Full argument list passed to the launcher for `run`
    pub fn run_args(&self, invocation: &SandboxInvocation) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.launcher_args.iter().map(OsString::from).collect();

        // A pty merges stdout and stderr inside the container in write order
        args.extend(
            ["run", "--rm", "-t", "--name", invocation.name.as_str()]
                .into_iter()
                .map(OsString::from),
        );
        args.push("--network".into());
        args.push(self.network.clone().into());
        if let Some(memory) = &self.memory_limit {
            args.push("--memory".into());
            args.push(memory.clone().into());
        }
        args.push("-w".into());
        args.push(invocation.container_dir.clone().into());

        let mut mount = invocation.host_dir.as_os_str().to_os_string();
        mount.push(":");
        mount.push(&invocation.container_dir);
        args.push("-v".into());
        args.push(mount);

        args.push(invocation.image.clone().into());
        args.extend(invocation.command.iter().map(OsString::from));
        args
    }

    /// Kill and remove the container if the CLI left it behind
    async fn force_remove(&self, name: &str) {
        remove_container(&self.launcher, &self.launcher_args, name).await;
    }

    fn guard(&self, name: &str) -> ContainerGuard {
        ContainerGuard {
            launcher: self.launcher.clone(),
            launcher_args: self.launcher_args.clone(),
            name: name.to_string(),
            armed: true,
        }
    }
}

async fn remove_container(launcher: &Path, launcher_args: &[String], name: &str) {
    let status = Command::new(launcher)
        .args(launcher_args)
        .args(["rm", "-f", name])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    match status {
        Ok(status) if status.success() => debug!("Removed container {}", name),
        Ok(status) => debug!("Container {} not removed ({})", name, status),
        Err(e) => warn!("Failed to remove container {}: {}", name, e),
    }
}

/// Force-removes a started container if `run` is dropped before it finishes.
///
/// Killing the CLI client alone leaves the daemon-side container running.
struct ContainerGuard {
    launcher: PathBuf,
    launcher_args: Vec<String>,
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
        let launcher = std::mem::take(&mut self.launcher);
        let launcher_args = std::mem::take(&mut self.launcher_args);
        let name = std::mem::take(&mut self.name);
        handle.spawn(async move {
            remove_container(&launcher, &launcher_args, &name).await;
        });
    }
}

/// Copy everything from `reader` into the shared buffer as it arrives
async fn pump<R>(mut reader: R, sink: Arc<Mutex<Vec<u8>>>) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        sink.lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(&buf[..n]);
    }
}

/// Wait briefly for the pump to finish and return what it collected
async fn collect_output(
    mut pump: JoinHandle<std::io::Result<()>>,
    sink: &Arc<Mutex<Vec<u8>>>,
) -> String {
    match tokio::time::timeout(OUTPUT_GRACE, &mut pump).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => warn!("Error reading process output: {}", e),
        Ok(Err(e)) => warn!("Output reader task failed: {}", e),
        Err(_) => {
            // A grandchild still holds the pipe open
            debug!("Output pipe still open after {:?}, giving up", OUTPUT_GRACE);
            pump.abort();
        }
    }

    let bytes = sink.lock().unwrap_or_else(|e| e.into_inner());
    String::from_utf8_lossy(&bytes).into_owned()
}

#[async_trait]
impl SandboxRunner for DockerCliRunner {
    fn name(&self) -> &str {
        "cli"
    }

    async fn run(&self, invocation: &SandboxInvocation) -> Result<String> {
        let args = self.run_args(invocation);
        debug!("Launching {} {:?}", self.launcher.display(), args);

        let pipe_err = |e: std::io::Error| {
            Error::Sandbox(format!("Failed to create output pipe: {}", e))
        };
        let (writer, reader) = pipe::pipe().map_err(pipe_err)?;
        let stdout = writer.into_blocking_fd().map_err(pipe_err)?;
        let stderr = stdout.try_clone().map_err(pipe_err)?;

        let start = Instant::now();
        // The command owns the write ends; dropping it leaves the child as
        // the only writer, so the pipe reaches EOF when the child exits.
        let spawned = {
            let mut command = Command::new(&self.launcher);
            command
                .args(&args)
                .stdin(Stdio::null())
                .stdout(stdout)
                .stderr(stderr)
                .kill_on_drop(true);
            command.spawn()
        };
        let mut child = spawned.map_err(|e| {
            Error::Sandbox(format!(
                "Failed to spawn {}: {}",
                self.launcher.display(),
                e
            ))
        })?;
        let guard = self.guard(&invocation.name);

        let sink = Arc::new(Mutex::new(Vec::new()));
        let reader = tokio::spawn(pump(reader, Arc::clone(&sink)));

        let waited = tokio::time::timeout(invocation.timeout, child.wait()).await;

        match waited {
            Ok(Ok(status)) => {
                guard.disarm();
                let output = collect_output(reader, &sink).await;
                debug!(
                    "Container {} exited with {} after {:?}",
                    invocation.name,
                    status,
                    start.elapsed()
                );

                if status.success() {
                    Ok(output)
                } else {
                    Err(Error::Execution {
                        status: status.code().map(i64::from),
                        output,
                    })
                }
            }
            Ok(Err(e)) => {
                self.force_remove(&invocation.name).await;
                guard.disarm();
                Err(Error::Sandbox(format!("Failed to wait for container: {}", e)))
            }
            Err(_) => {
                warn!(
                    "Container {} timed out after {:?}",
                    invocation.name, invocation.timeout
                );
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill launcher for {}: {}", invocation.name, e);
                }
                self.force_remove(&invocation.name).await;
                guard.disarm();

                let output = collect_output(reader, &sink).await;
                Err(Error::Timeout {
                    limit: invocation.timeout,
                    output,
                })
            }
        }
    }
}
