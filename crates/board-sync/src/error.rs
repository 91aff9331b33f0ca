//! Error types for board synchronization.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a sync run.
///
/// Missing optional data on issues never produces one of these; only
/// missing infrastructure (API, project, configuration, files) does.
#[derive(Debug, Error)]
pub enum SyncError {
    /// HTTP request failed before a response was received
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// API answered with a non-success status
    #[error("GitHub API returned error status {status}: {body}")]
    Transport { status: u16, body: String },

    /// GraphQL-level errors, or a response without data
    #[error("GraphQL errors: {0}")]
    GraphQl(String),

    /// The organization or its project could not be found
    #[error("Project #{number} not found in organization '{organization}'")]
    ProjectNotFound { organization: String, number: u64 },

    /// A required configuration value is not set
    #[error("Missing required configuration: {0}")]
    MissingConfig(&'static str),

    /// A configuration value could not be parsed
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Reading or writing a file failed
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, SyncError>;
