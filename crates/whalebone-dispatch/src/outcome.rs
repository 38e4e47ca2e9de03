//! Per-host outcomes and their aggregate.

use crate::error::DispatchError;

/// What happened on one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub host: String,
    /// Exit code of the remote side, if the process ran to completion.
    pub exit_code: Option<i32>,
    /// Local failure (spawn error, signal, panic) or captured stderr.
    pub error: Option<String>,
    /// Captured standard output, if any.
    pub stdout: String,
}

impl CommandOutcome {
    pub fn success(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            exit_code: Some(0),
            error: None,
            stdout: String::new(),
        }
    }

    pub fn exited(host: impl Into<String>, code: i32, stderr: impl Into<String>) -> Self {
        let stderr = stderr.into();
        Self {
            host: host.into(),
            exit_code: Some(code),
            error: if code == 0 || stderr.is_empty() {
                None
            } else {
                Some(stderr)
            },
            stdout: String::new(),
        }
    }

    pub fn error(host: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            exit_code: None,
            error: Some(error.into()),
            stdout: String::new(),
        }
    }

    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0) && self.error.is_none()
    }
}

/// Aggregate of one dispatch, in the order hosts were given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchResult {
    pub outcomes: Vec<CommandOutcome>,
}

impl DispatchResult {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.succeeded())
            .map(|o| o.host.as_str())
            .collect()
    }

    pub fn failed(&self) -> Vec<&CommandOutcome> {
        self.outcomes.iter().filter(|o| !o.succeeded()).collect()
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(CommandOutcome::succeeded)
    }

    pub fn into_result(self) -> Result<DispatchResult, DispatchError> {
        if self.is_success() {
            return Ok(self);
        }
        let total = self.total();
        let failed = self
            .outcomes
            .into_iter()
            .filter(|o| !o.succeeded())
            .collect();
        Err(DispatchError::Failed { total, failed })
    }
}
