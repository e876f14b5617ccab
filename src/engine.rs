//! Execution engine - the `(code, language) → lines` entry point
//!
//! `Engine::execute` resolves the language, then hands the job to the
//! [`ExecutionQueue`]. When the job's turn comes, [`Pipeline`] creates its
//! workspace, writes the source, runs every stage in the sandbox, normalizes
//! the output and removes the workspace, whatever the outcome.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{Config, SandboxConfig};
use crate::error::{Error, ErrorKind, Result};
use crate::language::LanguageRegistry;
use crate::output::normalize;
use crate::queue::{ExecutionQueue, Job, JobHandler};
use crate::sandbox::{create_runner, SandboxInvocation, SandboxRunner};
use crate::workspace::Workspace;

/// Runs one job from workspace creation to cleanup
pub struct Pipeline {
    registry: Arc<LanguageRegistry>,
    runner: Arc<dyn SandboxRunner>,
    temp_root: PathBuf,
    mount_root: String,
}

impl Pipeline {
    pub fn new(
        registry: Arc<LanguageRegistry>,
        runner: Arc<dyn SandboxRunner>,
        config: &SandboxConfig,
    ) -> Self {
        Pipeline {
            registry,
            runner,
            temp_root: config.temp_root.clone(),
            mount_root: config.mount_root.clone(),
        }
    }

    /// Write the source and run each stage in turn, stopping at the first failure
    async fn run_stages(&self, job: &Job, workspace: &Workspace) -> Result<Vec<String>> {
        let file_name = job.profile.source_file_name();
        workspace.write_source(&file_name, &job.code).await?;

        let stages = self.registry.stages(&job.profile)?;
        let mut raw = String::new();

        for (index, stage) in stages.iter().enumerate() {
            let invocation = SandboxInvocation::new(
                job.id,
                index,
                stage,
                workspace.path().to_path_buf(),
                &self.mount_root,
                &file_name,
            );
            debug!(job = %job.id, stage = %stage.id, "Running");

            match self.runner.run(&invocation).await {
                Ok(output) => append_output(&mut raw, &output),
                Err(e) => {
                    // Earlier stages' output stays in front of the failing stage's
                    if let Some(output) = e.output() {
                        append_output(&mut raw, output);
                        return Err(e.with_output(raw));
                    }
                    return Err(e);
                }
            }
        }

        Ok(normalize(&raw))
    }
}

fn append_output(raw: &mut String, output: &str) {
    if !raw.is_empty() && !raw.ends_with('\n') {
        raw.push('\n');
    }
    raw.push_str(output);
}

#[async_trait]
impl JobHandler for Pipeline {
    async fn handle(&self, job: &Job) -> Result<Vec<String>> {
        let start = Instant::now();
        debug!(job = %job.id, language = %job.profile.id, "Preparing");

        let workspace = Workspace::create(&self.temp_root, &job.profile.id, job.id).await?;
        let outcome = self.run_stages(job, &workspace).await;
        let cleanup = workspace.destroy().await;
        debug!(job = %job.id, "Cleaned up");

        let outcome = match (outcome, cleanup) {
            (Ok(lines), Ok(())) => Ok(lines),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(cleanup)) => {
                warn!(job = %job.id, "Workspace cleanup failed: {}", cleanup);
                Err(e)
            }
        };

        match &outcome {
            Ok(lines) => info!(
                job = %job.id,
                language = %job.profile.id,
                lines = lines.len(),
                elapsed = ?start.elapsed(),
                "Job succeeded"
            ),
            Err(e) => info!(
                job = %job.id,
                language = %job.profile.id,
                kind = ?e.kind(),
                elapsed = ?start.elapsed(),
                "Job failed: {}",
                e
            ),
        }
        outcome
    }
}

/// The execution core: language lookup plus the global job queue
pub struct Engine {
    registry: Arc<LanguageRegistry>,
    queue: ExecutionQueue,
}

impl Engine {
    pub fn new(
        registry: Arc<LanguageRegistry>,
        runner: Arc<dyn SandboxRunner>,
        config: &SandboxConfig,
    ) -> Self {
        let pipeline = Pipeline::new(Arc::clone(&registry), runner, config);
        let queue = ExecutionQueue::new(config.queue_capacity, Arc::new(pipeline));
        Engine { registry, queue }
    }

    /// Build the registry and the configured sandbox backend
    pub async fn from_config(config: &Config) -> Result<Self> {
        let registry = Arc::new(LanguageRegistry::from_config(&config.languages)?);
        let runner = create_runner(&config.sandbox).await?;
        info!(
            "Engine ready: {} languages, {} backend",
            registry.len(),
            runner.name()
        );
        Ok(Engine::new(registry, runner, &config.sandbox))
    }

    /// Run `code` as `language` and return its normalized output lines.
    ///
    /// Unknown languages fail before anything is queued or written.
    pub async fn execute(&self, code: &str, language: &str) -> Result<Vec<String>> {
        let profile = self.registry.lookup(language)?;
        self.queue.submit(Job::new(profile, code)).await
    }

    pub fn registry(&self) -> &LanguageRegistry {
        &self.registry
    }

    pub fn queue(&self) -> &ExecutionQueue {
        &self.queue
    }
}

/// Flattened `(lines, error)` view of an execution result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Normalized output; on failure, whatever was printed before it
    pub output: Vec<String>,
    /// Error message, if the run failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Error classification, if the run failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

impl ExecutionReport {
    pub fn from_result(result: &Result<Vec<String>>) -> Self {
        match result {
            Ok(lines) => ExecutionReport {
                output: lines.clone(),
                error: None,
                kind: None,
            },
            Err(e) => ExecutionReport::from_error(e),
        }
    }

    pub fn from_error(error: &Error) -> Self {
        ExecutionReport {
            output: error.output_lines(),
            error: Some(error.to_string()),
            kind: Some(error.kind()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
