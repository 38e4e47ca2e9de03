//! SSH connection settings shared by the prober and the dispatcher.

use std::path::PathBuf;
use std::time::Duration;

/// How to reach cluster hosts over SSH.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshSettings {
    /// Private key (`.pem`) used for every connection.
    pub credentials: PathBuf,
    /// Remote login name.
    pub user: String,
    /// Passed to `ssh -o ConnectTimeout=`.
    pub connect_timeout: Duration,
}

impl SshSettings {
    pub fn new(credentials: impl Into<PathBuf>, user: impl Into<String>) -> Self {
        Self {
            credentials: credentials.into(),
            user: user.into(),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Options common to `ssh`, `scp`, and the `rsync -e` transport.
    fn common_options(&self) -> Vec<String> {
        vec![
            "-i".to_string(),
            self.credentials.display().to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)),
        ]
    }

    /// Arguments for `ssh`, up to but excluding the host.
    pub fn ssh_args(&self) -> Vec<String> {
        let mut args = self.common_options();
        args.push("-l".to_string());
        args.push(self.user.clone());
        args
    }

    /// Arguments for `scp`, up to but excluding source and target.
    pub fn scp_args(&self) -> Vec<String> {
        self.common_options()
    }

    /// Value for `rsync -e`.
    pub fn rsync_shell(&self) -> String {
        let mut parts = vec!["ssh".to_string()];
        parts.extend(self.ssh_args());
        parts.join(" ")
    }

    /// `user@host:path` target for copies.
    pub fn remote_target(&self, host: &str, path: &str) -> String {
        format!("{}@{}:{}", self.user, host, path)
    }

    /// Home directory of the remote user, assuming a stock layout.
    pub fn remote_home(&self) -> String {
        format!("/home/{}", self.user)
    }
}
