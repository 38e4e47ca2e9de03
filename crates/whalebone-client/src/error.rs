use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("{0} is not a YAML mapping")]
    NotAMapping(PathBuf),

    #[error("membership file {0} lists no hosts")]
    EmptyMembership(PathBuf),

    #[error("{host} is not listed in the cluster membership")]
    NotAMember { host: String },

    #[error("command `{command}` failed: {reason}")]
    Command { command: String, reason: String },
}

impl RewriteError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RewriteError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type RewriteResult<T> = Result<T, RewriteError>;
