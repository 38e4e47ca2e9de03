//! Lifecycle error types.

use std::time::Duration;

use thiserror::Error;

use whalebone_cloud::CloudError;
use whalebone_dispatch::DispatchError;
use whalebone_state::StateError;

use crate::phase::ClusterPhase;

/// Errors that can occur while driving a cluster.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Cloud(CloudError),

    #[error(transparent)]
    Dispatch(DispatchError),

    #[error("cluster {0} has no hosts with a public name")]
    NoHosts(String),

    #[error("{operation} timed out after {waited:?}; still pending: {}", .pending.join(", "))]
    TimedOut {
        operation: &'static str,
        waited: Duration,
        pending: Vec<String>,
    },

    #[error("bootstrap step {step:?} failed: {source}")]
    Bootstrap {
        step: String,
        #[source]
        source: DispatchError,
    },

    #[error("invalid phase transition {from} -> {to}")]
    InvalidTransition { from: ClusterPhase, to: ClusterPhase },

    #[error("cancelled")]
    Cancelled,
}

impl From<CloudError> for LifecycleError {
    fn from(e: CloudError) -> Self {
        match e {
            CloudError::Cancelled => LifecycleError::Cancelled,
            other => LifecycleError::Cloud(other),
        }
    }
}

impl From<DispatchError> for LifecycleError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::Cancelled { .. } => LifecycleError::Cancelled,
            other => LifecycleError::Dispatch(other),
        }
    }
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;
