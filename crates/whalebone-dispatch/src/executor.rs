//! Single-host remote operations.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use whalebone_core::SshSettings;

use crate::outcome::CommandOutcome;

/// How a local path is shipped to a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    /// Copy one file (`scp`).
    Copy,
    /// Make the remote directory an exact mirror of a local one, skipping
    /// VCS metadata (`rsync --delete`).
    Mirror,
}

/// One operation against one host. Never fails: problems are reported
/// in the returned [`CommandOutcome`].
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run a shell command, optionally feeding `stdin`.
    async fn run(&self, host: &str, command: &str, stdin: Option<Arc<[u8]>>) -> CommandOutcome;

    /// Ship `local` to `remote` on the host.
    async fn transfer(&self, host: &str, local: &Path, remote: &str, mode: Transfer)
    -> CommandOutcome;
}

/// Executes through the local `ssh`, `scp` and `rsync` binaries.
#[derive(Debug, Clone)]
pub struct SshExecutor {
    settings: SshSettings,
}

impl SshExecutor {
    pub fn new(settings: SshSettings) -> Self {
        Self { settings }
    }

    fn transfer_command(&self, host: &str, local: &Path, remote: &str, mode: Transfer) -> Command {
        match mode {
            Transfer::Copy => {
                let mut cmd = Command::new("scp");
                cmd.args(self.settings.scp_args())
                    .arg(local)
                    .arg(self.settings.remote_target(host, remote));
                cmd
            }
            Transfer::Mirror => {
                // Trailing slash: sync the directory's contents, not the directory.
                let source = format!("{}/", local.display().to_string().trim_end_matches('/'));
                let mut cmd = Command::new("rsync");
                cmd.arg("-az")
                    .arg("--delete")
                    .arg("--exclude")
                    .arg("*.git")
                    .arg("--delete-excluded")
                    .arg("-e")
                    .arg(self.settings.rsync_shell())
                    .arg(source)
                    .arg(self.settings.remote_target(host, remote));
                cmd
            }
        }
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn run(&self, host: &str, command: &str, stdin: Option<Arc<[u8]>>) -> CommandOutcome {
        let mut cmd = Command::new("ssh");
        cmd.args(self.settings.ssh_args()).arg(host).arg(command);
        debug!(%host, %command, "ssh run");
        execute(host, cmd, stdin).await
    }

    async fn transfer(
        &self,
        host: &str,
        local: &Path,
        remote: &str,
        mode: Transfer,
    ) -> CommandOutcome {
        let cmd = self.transfer_command(host, local, remote, mode);
        debug!(%host, local = %local.display(), %remote, ?mode, "transfer");
        execute(host, cmd, None).await
    }
}

/// Run a prepared child process to completion and capture its outcome.
async fn execute(host: &str, mut cmd: Command, stdin: Option<Arc<[u8]>>) -> CommandOutcome {
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => return CommandOutcome::error(host, format!("failed to spawn: {e}")),
    };

    if let (Some(bytes), Some(mut pipe)) = (stdin, child.stdin.take()) {
        if let Err(e) = pipe.write_all(&bytes).await {
            return CommandOutcome::error(host, format!("failed to write stdin: {e}"));
        }
        // Dropping the pipe closes it so the remote side sees EOF.
        drop(pipe);
    }

    match child.wait_with_output().await {
        Ok(output) => {
            let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
            match output.status.code() {
                Some(code) => {
                    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                    CommandOutcome::exited(host, code, stderr).with_stdout(stdout)
                }
                None => CommandOutcome::error(host, "terminated by signal").with_stdout(stdout),
            }
        }
        Err(e) => CommandOutcome::error(host, format!("failed to wait: {e}")),
    }
}
