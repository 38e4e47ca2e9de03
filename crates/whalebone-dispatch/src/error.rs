//! Dispatcher error types.

use thiserror::Error;

use crate::outcome::CommandOutcome;

/// Errors that abort or summarize a dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{} of {total} host(s) failed: {}", .failed.len(), summarize(.failed))]
    Failed {
        total: usize,
        failed: Vec<CommandOutcome>,
    },

    #[error("no hosts to dispatch to")]
    NoHosts,

    #[error("cannot read {path}: {source}")]
    LocalFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cancelled with {pending} host(s) still running")]
    Cancelled { pending: usize },
}

fn summarize(failed: &[CommandOutcome]) -> String {
    failed
        .iter()
        .map(|o| match &o.error {
            Some(err) => format!("{} ({err})", o.host),
            None => format!("{} (exit {})", o.host, o.exit_code.unwrap_or(-1)),
        })
        .collect::<Vec<_>>()
        .join(", ")
}
