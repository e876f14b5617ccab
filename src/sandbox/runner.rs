//! Common runner trait and invocation type

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

use crate::error::Result;
use crate::language::LanguageProfile;

/// Everything a backend needs to run one stage of a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxInvocation {
    /// Container name, unique per job stage
    pub name: String,
    /// Image to run
    pub image: String,
    /// Argument vector executed inside the container
    pub command: Vec<String>,
    /// Host directory bind-mounted into the container
    pub host_dir: PathBuf,
    /// Where `host_dir` appears inside the container
    pub container_dir: String,
    /// Hard wall-clock limit
    pub timeout: Duration,
}

impl SandboxInvocation {
    /// Build the invocation for `profile`, mounting `host_dir` at
    /// `mount_root/<language id>` and pointing the command at `source_file`.
    pub fn new(
        job_id: Uuid,
        stage: usize,
        profile: &LanguageProfile,
        host_dir: PathBuf,
        mount_root: &str,
        source_file: &str,
    ) -> Self {
        let container_dir = format!("{}/{}", mount_root.trim_end_matches('/'), profile.id);
        let container_file = format!("{}/{}", container_dir, source_file);

        SandboxInvocation {
            name: format!("coderunner-{}-{}", job_id, stage),
            image: profile.image.clone(),
            command: profile.render_command(&container_file),
            host_dir,
            container_dir,
            timeout: profile.max_duration,
        }
    }
}

/// Trait for container launch backends
#[async_trait]
pub trait SandboxRunner: Send + Sync {
    /// Backend name
    fn name(&self) -> &str;

    /// Run the invocation to completion or until its timeout.
    ///
    /// Returns the combined stdout/stderr on a zero exit. A non-zero exit
    /// yields [`Error::Execution`](crate::Error::Execution) and an overrun
    /// yields [`Error::Timeout`](crate::Error::Timeout), both carrying the
    /// output captured so far.
    async fn run(&self, invocation: &SandboxInvocation) -> Result<String>;
}
