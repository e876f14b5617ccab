//! Per-job workspaces
//!
//! A workspace is `root/<language>/<job id>` holding a single source file. It
//! is mounted into the container for the duration of one job and removed
//! afterwards. Dropping a [`Workspace`] that was never destroyed removes the
//! directory as a last resort (on the blocking pool when a runtime is
//! available), so a panicking job cannot leak it.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Guard over one job's directory
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    destroyed: bool,
}

impl Workspace {
    /// Create `root/language/job_id`, including missing parents.
    ///
    /// Succeeds if the directory already exists. A relative `root` is resolved
    /// against the current directory so the path can be bind-mounted.
    pub async fn create(root: &Path, language: &str, job_id: Uuid) -> Result<Self> {
        let root = if root.is_absolute() {
            root.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|e| Error::workspace(root, e))?
                .join(root)
        };
        let path = root.join(language).join(job_id.to_string());

        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| Error::workspace(&path, e))?;

        debug!("Created workspace {}", path.display());
        Ok(Workspace {
            path,
            destroyed: false,
        })
    }

    /// Absolute path of the workspace directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `code` verbatim to `file_name` and sync it to disk
    pub async fn write_source(&self, file_name: &str, code: &str) -> Result<PathBuf> {
        let file_path = self.path.join(file_name);
        let io_err = |e| Error::workspace(&file_path, e);

        let mut file = tokio::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&file_path)
            .await
            .map_err(io_err)?;

        file.write_all(code.as_bytes()).await.map_err(io_err)?;
        file.flush().await.map_err(io_err)?;
        file.sync_all().await.map_err(io_err)?;

        debug!("Wrote {} bytes of source to {}", code.len(), file_path.display());
        Ok(file_path)
    }

    /// Recursively remove the workspace
    pub async fn destroy(mut self) -> Result<()> {
        // Mark first: a failed removal should not be retried from Drop
        self.destroyed = true;

        tokio::fs::remove_dir_all(&self.path)
            .await
            .map_err(|e| Error::workspace(&self.path, e))?;

        debug!("Removed workspace {}", self.path.display());
        Ok(())
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.destroyed {
            return;
        }

        let path = std::mem::take(&mut self.path);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || remove_abandoned(&path));
            }
            Err(_) => remove_abandoned(&path),
        }
    }
}

fn remove_abandoned(path: &Path) {
    match std::fs::remove_dir_all(path) {
        Ok(()) => debug!("Removed abandoned workspace {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(
            "Failed to remove abandoned workspace {}: {}",
            path.display(),
            e
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_create_write_destroy() {
        let root = tempdir().unwrap();
        let id = Uuid::new_v4();

        let ws = Workspace::create(root.path(), "python3", id).await.unwrap();
        assert_eq!(ws.path(), root.path().join("python3").join(id.to_string()));
        assert!(ws.path().is_dir());

        let file = ws.write_source("main.py", "print('hi')\n").await.unwrap();
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "print('hi')\n");

        let path = ws.path().to_path_buf();
        ws.destroy().await.unwrap();
        assert!(!path.exists());
        assert!(root.path().join("python3").is_dir());
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let root = tempdir().unwrap();
        let id = Uuid::new_v4();
        std::fs::create_dir_all(root.path().join("go").join(id.to_string())).unwrap();

        let ws = Workspace::create(root.path(), "go", id).await.unwrap();
        assert!(ws.path().is_dir());
    }

    #[tokio::test]
    async fn test_distinct_jobs_get_distinct_paths() {
        let root = tempdir().unwrap();
        let a = Workspace::create(root.path(), "go", Uuid::new_v4()).await.unwrap();
        let b = Workspace::create(root.path(), "go", Uuid::new_v4()).await.unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[tokio::test]
    async fn test_drop_removes_directory() {
        let root = tempdir().unwrap();
        let ws = Workspace::create(root.path(), "node", Uuid::new_v4()).await.unwrap();
        ws.write_source("main.javascript", "1").await.unwrap();
        let path = ws.path().to_path_buf();

        drop(ws);

        // Removal runs on the blocking pool
        for _ in 0..100 {
            if !path.exists() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("{} was not removed", path.display());
    }

    #[test]
    fn test_drop_outside_runtime_removes_directory() {
        let root = tempdir().unwrap();
        let path = root.path().join("go").join("job");
        std::fs::create_dir_all(&path).unwrap();

        drop(Workspace {
            path: path.clone(),
            destroyed: false,
        });
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_destroy_missing_directory_fails() {
        let root = tempdir().unwrap();
        let ws = Workspace::create(root.path(), "java", Uuid::new_v4()).await.unwrap();
        std::fs::remove_dir_all(ws.path()).unwrap();

        match ws.destroy().await {
            Err(Error::WorkspaceIo { .. }) => {}
            other => panic!("expected workspace error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_under_a_file_fails() {
        let root = tempdir().unwrap();
        let blocker = root.path().join("go");
        std::fs::write(&blocker, "not a directory").unwrap();

        let err = Workspace::create(root.path(), "go", Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::WorkspaceIo { .. }));
    }
}
