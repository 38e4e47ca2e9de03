//! Cloud error types.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by providers and the instance directory.
#[derive(Debug, Error)]
pub enum CloudError {
    /// Eventual-consistency gap or flaky API call. Retried by
    /// `InstanceDirectory::resolve`, never returned from it.
    #[error("transient provider error: {0}")]
    Transient(String),

    #[error("launch rejected: {0}")]
    Launch(String),

    #[error("terminate rejected: {0}")]
    Terminate(String),

    /// The provider itself is unusable (missing binary, unparseable reply).
    #[error("provider error: {0}")]
    Provider(String),

    #[error("gave up resolving {missing} of {requested} instance(s) after {waited:?}")]
    TimedOut {
        requested: usize,
        missing: usize,
        waited: Duration,
    },

    #[error("cancelled")]
    Cancelled,
}

pub type CloudResult<T> = Result<T, CloudError>;
