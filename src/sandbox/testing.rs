//! Test doubles for the sandbox layer

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

use crate::config::{LanguageConfig, SandboxConfig};
use crate::error::{Error, Result};
use crate::sandbox::runner::{SandboxInvocation, SandboxRunner};

/// Stand-in for `docker`: runs the command on the host with the bind mount
/// applied to any argument under the container directory. `rm -f <name>`
/// appends the name to the removal log.
const FAKE_LAUNCHER: &str = r#"
if [ "$1" = "rm" ]; then echo "$3" >> "@REMOVED_LOG@"; exit 0; fi
while [ "$#" -gt 0 ] && [ "$1" != "-v" ]; do shift; done
shift
mount="$1"
shift
host="${mount%%:*}"
ctr="${mount#*:}"
shift
for arg in "$@"; do
  shift
  case "$arg" in
    "$ctr"*) arg="$host${arg#"$ctr"}" ;;
  esac
  set -- "$@" "$arg"
done
cd "$host" || exit 125
exec "$@"
"#;

/// Sandbox config whose launcher is the fake script, run through `sh`
pub fn fake_launcher_config(scratch: &Path) -> SandboxConfig {
    let script = scratch.join("fake-docker.sh");
    let log = scratch.join("removed.log");
    std::fs::write(
        &script,
        FAKE_LAUNCHER.replace("@REMOVED_LOG@", &log.display().to_string()),
    )
    .unwrap();

    SandboxConfig {
        launcher: "sh".to_string(),
        launcher_args: vec![script.display().to_string()],
        temp_root: scratch.join("jobs"),
        mount_root: "/sandbox".to_string(),
        ..SandboxConfig::default()
    }
}

/// Container names the fake launcher was asked to remove
pub fn removed_containers(scratch: &Path) -> Vec<String> {
    std::fs::read_to_string(scratch.join("removed.log"))
        .map(|log| log.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

/// A language that runs its source with `sh`
pub fn shell_language(max_duration: Duration) -> LanguageConfig {
    LanguageConfig {
        extension: "sh".to_string(),
        command: vec!["sh".to_string(), "{file}".to_string()],
        image: "fake/shell".to_string(),
        max_duration,
        next_stage: None,
    }
}

/// A workspace holding `main.sh` and an invocation that runs it
pub fn invocation(code: &str, timeout: Duration) -> (TempDir, SandboxInvocation) {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("main.sh"), code).unwrap();

    let inv = SandboxInvocation {
        name: format!("coderunner-test-{}", uuid::Uuid::new_v4()),
        image: "fake/shell".into(),
        command: vec!["sh".into(), "/sandbox/shell/main.sh".into()],
        host_dir: dir.path().to_path_buf(),
        container_dir: "/sandbox/shell".into(),
        timeout,
    };
    (dir, inv)
}

/// Runner that echoes the mounted source file back, recording concurrency
#[derive(Default)]
pub struct RecordingRunner {
    pub delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    invocations: Mutex<Vec<SandboxInvocation>>,
}

impl RecordingRunner {
    pub fn with_delay(delay: Duration) -> Self {
        RecordingRunner {
            delay,
            ..Default::default()
        }
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn invocations(&self) -> Vec<SandboxInvocation> {
        self.invocations.lock().unwrap().clone()
    }

    fn source_path(invocation: &SandboxInvocation) -> PathBuf {
        let file = invocation.command.last().cloned().unwrap_or_default();
        let relative = file
            .strip_prefix(&invocation.container_dir)
            .unwrap_or(file.as_str())
            .trim_start_matches('/')
            .to_string();
        invocation.host_dir.join(relative)
    }
}

#[async_trait]
impl SandboxRunner for RecordingRunner {
    fn name(&self) -> &str {
        "recording"
    }

    async fn run(&self, invocation: &SandboxInvocation) -> Result<String> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.invocations.lock().unwrap().push(invocation.clone());

        let source = std::fs::read_to_string(Self::source_path(invocation));
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let source = source?;
        if source.starts_with("fail") {
            return Err(Error::Execution {
                status: Some(1),
                output: source,
            });
        }
        Ok(source)
    }
}
