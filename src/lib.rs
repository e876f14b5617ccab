//! # coderunner
//!
//! Runs untrusted snippets of code inside throwaway containers and returns
//! their output as trimmed, non-empty lines.
//!
//! ## Features
//!
//! - **Language profiles:** extension, command template, image and time limit per language
//! - **Global queue:** one execution at a time, first come first served
//! - **Isolated workspaces:** a fresh directory per job, always removed afterwards
//! - **Two backends:** the `docker` CLI or the Docker Engine API

pub mod config;
pub mod engine;
pub mod error;
pub mod language;
pub mod output;
pub mod queue;
pub mod sandbox;
pub mod server;
pub mod workspace;

pub use config::Config;
pub use engine::{Engine, ExecutionReport};
pub use error::{Error, ErrorKind, Result};
pub use language::{LanguageProfile, LanguageRegistry};
pub use queue::ExecutionQueue;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const NAME: &str = env!("CARGO_PKG_NAME");
