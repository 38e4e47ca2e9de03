//! Bootstrap steps — opaque remote work run across the cluster in order.

use std::path::PathBuf;

/// One unit of remote work applied to every host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Run a shell command.
    Run { label: String, command: String },
    /// Copy a local file to a remote path.
    Push {
        label: String,
        local: PathBuf,
        remote: String,
    },
    /// Mirror a local directory onto a remote one.
    Mirror {
        label: String,
        local: PathBuf,
        remote: String,
    },
    /// Stream a local file into a remote command's stdin.
    Pipe {
        label: String,
        local: PathBuf,
        command: String,
    },
}

impl Step {
    pub fn run(label: impl Into<String>, command: impl Into<String>) -> Self {
        Step::Run {
            label: label.into(),
            command: command.into(),
        }
    }

    pub fn push(label: impl Into<String>, local: impl Into<PathBuf>, remote: impl Into<String>) -> Self {
        Step::Push {
            label: label.into(),
            local: local.into(),
            remote: remote.into(),
        }
    }

    pub fn mirror(
        label: impl Into<String>,
        local: impl Into<PathBuf>,
        remote: impl Into<String>,
    ) -> Self {
        Step::Mirror {
            label: label.into(),
            local: local.into(),
            remote: remote.into(),
        }
    }

    pub fn pipe(label: impl Into<String>, local: impl Into<PathBuf>, command: impl Into<String>) -> Self {
        Step::Pipe {
            label: label.into(),
            local: local.into(),
            command: command.into(),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Step::Run { label, .. }
            | Step::Push { label, .. }
            | Step::Mirror { label, .. }
            | Step::Pipe { label, .. } => label,
        }
    }
}
