//! Error types for coderunner

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using coderunner's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for coderunner
#[derive(Error, Debug)]
pub enum Error {
    /// The requested language has no profile in the registry
    #[error("Unknown language {0}")]
    UnknownLanguage(String),

    /// Workspace directory creation, source write, or cleanup failed
    #[error("Workspace I/O error at {}: {source}", path.display())]
    WorkspaceIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The sandboxed process ran past its profile's maximum duration
    #[error("Execution timed out after {}s", limit.as_secs_f64())]
    Timeout {
        limit: Duration,
        /// Output captured before the process was killed
        output: String,
    },

    /// The sandboxed process exited with a non-zero status
    #[error("Execution failed: {}", describe_status(*status))]
    Execution {
        status: Option<i64>,
        /// Combined stdout and stderr of the failed run
        output: String,
    },

    /// The container launcher or the container API failed
    #[error("Sandbox error: {0}")]
    Sandbox(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

fn describe_status(status: Option<i64>) -> String {
    match status {
        Some(code) => format!("exit status {}", code),
        None => "terminated by signal".to_string(),
    }
}

/// Stable classification of an [`Error`], suitable for wire formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnknownLanguage,
    WorkspaceIo,
    Timeout,
    Execution,
    Sandbox,
    Config,
    Internal,
}

impl Error {
    /// Wrap an I/O failure that happened under a workspace path
    pub fn workspace(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::WorkspaceIo {
            path: path.into(),
            source,
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnknownLanguage(_) => ErrorKind::UnknownLanguage,
            Error::WorkspaceIo { .. } => ErrorKind::WorkspaceIo,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Execution { .. } => ErrorKind::Execution,
            Error::Sandbox(_) => ErrorKind::Sandbox,
            Error::Config(_) => ErrorKind::Config,
            Error::Json(_) | Error::Io(_) | Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Raw output the sandboxed program produced before failing, if any
    pub fn output(&self) -> Option<&str> {
        match self {
            Error::Timeout { output, .. } | Error::Execution { output, .. } => Some(output),
            _ => None,
        }
    }

    /// Normalized lines of [`Error::output`]
    pub fn output_lines(&self) -> Vec<String> {
        self.output()
            .map(crate::output::normalize)
            .unwrap_or_default()
    }

    /// Replace the captured output, keeping the classification
    pub(crate) fn with_output(self, text: String) -> Self {
        match self {
            Error::Timeout { limit, .. } => Error::Timeout {
                limit,
                output: text,
            },
            Error::Execution { status, .. } => Error::Execution {
                status,
                output: text,
            },
            other => other,
        }
    }

    /// Check if error is a client error (caller's fault)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::UnknownLanguage(_) | Error::Timeout { .. } | Error::Execution { .. }
        )
    }
}

impl From<bollard::errors::Error> for Error {
    fn from(err: bollard::errors::Error) -> Self {
        Error::Sandbox(err.to_string())
    }
}
