//! Error types for the Whalebone state store.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during state store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("invalid cluster name: {0:?}")]
    InvalidName(String),

    #[error("cluster not found: {0}")]
    NotFound(String),

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error in {path}: {message}")]
    Deserialize { path: PathBuf, message: String },

    #[error("cluster {cluster} state is corrupt: {reason}")]
    Corrupt { cluster: String, reason: String },

    #[error("failed to remove {} artifact(s) of cluster {cluster}: {}", .failed.len(), describe(.failed))]
    Remove {
        cluster: String,
        failed: Vec<(PathBuf, String)>,
    },
}

impl StateError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StateError::Io {
            path: path.into(),
            source,
        }
    }
}

fn describe(failed: &[(PathBuf, String)]) -> String {
    failed
        .iter()
        .map(|(path, err)| format!("{} ({err})", path.display()))
        .collect::<Vec<_>>()
        .join(", ")
}
