//! Single-host reachability probes.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use whalebone_core::SshSettings;

/// Result of a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    /// The host accepted a session and ran the no-op command.
    Reachable,
    /// The host was contacted but the session failed (auth, refused, exit status).
    Unreachable,
    /// The probe could not complete (spawn error or timeout).
    Failed,
}

impl ProbeResult {
    pub fn is_reachable(self) -> bool {
        self == ProbeResult::Reachable
    }
}

/// One reachability check against one host.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, host: &str) -> ProbeResult;
}

/// Checks that `ssh` can log in and run `exit 0`.
#[derive(Debug, Clone)]
pub struct SshProbe {
    settings: SshSettings,
    /// Upper bound on one probe, on top of ssh's own connect timeout.
    timeout: Duration,
}

impl SshProbe {
    pub fn new(settings: SshSettings) -> Self {
        let timeout = settings.connect_timeout + Duration::from_secs(5);
        Self { settings, timeout }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Probe for SshProbe {
    async fn probe(&self, host: &str) -> ProbeResult {
        let mut cmd = Command::new("ssh");
        cmd.args(self.settings.ssh_args())
            .arg(host)
            .arg("exit 0")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        match tokio::time::timeout(self.timeout, cmd.status()).await {
            Ok(Ok(status)) if status.success() => ProbeResult::Reachable,
            Ok(Ok(status)) => {
                debug!(%host, code = ?status.code(), "ssh probe rejected");
                ProbeResult::Unreachable
            }
            Ok(Err(e)) => {
                debug!(%host, error = %e, "ssh probe could not start");
                ProbeResult::Failed
            }
            Err(_) => {
                debug!(%host, "ssh probe timed out");
                ProbeResult::Failed
            }
        }
    }
}
