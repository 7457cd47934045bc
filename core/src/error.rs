//! Error types surfaced by the engine.
//!
//! Only configuration and lifecycle errors ever reach the operator. Failures
//! of individual scheduled actions are [`ActionError`]s, which the queue and
//! scheduler count and log but never propagate.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Outcome type of every unit of scheduled work.
pub type ActionResult = std::result::Result<(), ActionError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine is already running")]
    AlreadyRunning,

    #[error("engine is not running")]
    NotRunning,

    #[error("no frame source/injector registered for client '{0}'")]
    MissingBackend(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("background task join failed")]
    Join(#[source] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("input '{input}' was rejected by the injector")]
    InputRejected { input: String },

    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("task panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("{width}x{height} RGBA frame needs {expected} bytes, got {actual}")]
    BufferSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// A single problem found while validating a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Dotted location, e.g. `client[main].member[2]`
    pub location: String,
    pub message: String,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error in {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("serialize error for {path:?}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: toml::ser::Error,
    },

    #[error("invalid configuration ({} issue(s)): {}", .0.len(), join_issues(.0))]
    Invalid(Vec<ValidationIssue>),
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
