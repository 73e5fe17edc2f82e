// src/errors.rs

//! Crate-wide error types.
//!
//! Each layer has its own small enum so callers can match on the failure
//! they care about; [`VmprovError`] wraps them for code that just wants to
//! bubble things up with `?`.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VmprovError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Script lookup failures.
///
/// Role lookups never produce these: unknown roles fall back to the
/// custom-vm script.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("script directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("no script named '{0}' in the indexed script directory")]
    NotFound(String),

    #[error("failed to index script directory: {0}")]
    Index(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("interpreter pool is closed")]
    Closed,

    #[error("invalid pool size: min={min}, max={max}")]
    InvalidSize { min: usize, max: usize },

    #[error("failed to open interpreter {id}: {reason}")]
    Open { id: usize, reason: String },
}

/// Failures raised while driving a single interpreter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InterpreterError {
    /// The run was ended by the stop flag (cancellation, timeout, pool close).
    #[error("script execution was stopped by the host")]
    Stopped,

    #[error("script error: {0}")]
    Script(String),
}

/// Conditions a session surfaces to its caller instead of folding them into
/// a failed [`ExecutionResult`](crate::session::ExecutionResult).
#[derive(Error, Debug)]
pub enum SessionError {
    /// The caller cancelled the session. Carries everything captured so far.
    #[error("script execution was cancelled")]
    Cancelled(Box<crate::session::ExecutionResult>),

    #[error("session has already been started (state: {0:?})")]
    AlreadyStarted(crate::session::SessionState),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read configuration {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write configuration {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration document {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Human-readable description of an elapsed timeout, shared by the session
/// fault type and log lines.
pub(crate) fn describe_timeout(limit: Duration) -> String {
    format!("script did not finish within {:.1}s", limit.as_secs_f64())
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, VmprovError>;
