//! Fetch and install a Cassandra release on this node.

use tokio::process::Command;
use tracing::info;

use crate::error::{RewriteError, RewriteResult};

pub const DEFAULT_VERSION: &str = "0.7.0-rc2";
pub const DEFAULT_MIRROR: &str = "http://apache.mirrors.pair.com/cassandra";
pub const INSTALL_ROOT: &str = "/usr/local";

/// Shell steps that replace any installed release with `version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadPlan {
    pub version: String,
    pub mirror: String,
    /// Owner of the unpacked trees.
    pub owner: String,
}

impl DownloadPlan {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            mirror: DEFAULT_MIRROR.to_string(),
            owner: "ubuntu".to_string(),
        }
    }

    pub fn with_mirror(mut self, mirror: impl Into<String>) -> Self {
        self.mirror = mirror.into();
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    /// Mirror directory a release lives in: `0.7.0-rc2` is under `0.7.0/`.
    fn release_dir(&self) -> &str {
        self.version.split('-').next().unwrap_or(&self.version)
    }

    pub fn bin_dir(&self) -> String {
        format!("{INSTALL_ROOT}/apache-cassandra-{}", self.version)
    }

    pub fn src_dir(&self) -> String {
        format!("{INSTALL_ROOT}/apache-cassandra-{}-src", self.version)
    }

    pub fn commands(&self) -> Vec<String> {
        let v = &self.version;
        let owner = &self.owner;
        let base = format!("{}/{}", self.mirror.trim_end_matches('/'), self.release_dir());
        let bin_tar = format!("apache-cassandra-{v}-bin.tar.gz");
        let src_tar = format!("apache-cassandra-{v}-src.tar.gz");
        let bin_dir = self.bin_dir();
        let src_dir = self.src_dir();

        vec![
            format!("sudo rm -rf {INSTALL_ROOT}/apache-cassandra*"),
            format!("curl -fsSL -o /tmp/{bin_tar} {base}/{bin_tar}"),
            format!("curl -fsSL -o /tmp/{src_tar} {base}/{src_tar}"),
            format!("sudo tar -C {INSTALL_ROOT} -xzf /tmp/{bin_tar}"),
            format!("sudo tar -C {INSTALL_ROOT} -xzf /tmp/{src_tar}"),
            format!("sudo chown -R {owner}:{owner} {bin_dir}"),
            format!("sudo chown -R {owner}:{owner} {src_dir}"),
            format!("sudo ln -sf {bin_dir} {INSTALL_ROOT}/apache-cassandra"),
            format!("sudo ln -sf {src_dir} {INSTALL_ROOT}/apache-cassandra-src"),
            format!("ant -q -f {INSTALL_ROOT}/apache-cassandra-src/build.xml gen-thrift-py"),
            format!("chmod a+x {src_dir}/contrib/py_stress/stress.py"),
        ]
    }

    pub async fn run(&self) -> RewriteResult<()> {
        info!(version = %self.version, mirror = %self.mirror, "installing cassandra");
        run_commands(&self.commands()).await
    }
}

/// Run each command with `sh -c`, stopping at the first failure.
pub async fn run_commands(commands: &[String]) -> RewriteResult<()> {
    for (index, command) in commands.iter().enumerate() {
        info!(step = index + 1, total = commands.len(), %command, "running");
        let status = Command::new("sh")
            .arg("-c")
            .arg(command)
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| RewriteError::Command {
                command: command.clone(),
                reason: e.to_string(),
            })?;
        if !status.success() {
            let reason = match status.code() {
                Some(code) => format!("exit status {code}"),
                None => "killed by signal".to_string(),
            };
            return Err(RewriteError::Command {
                command: command.clone(),
                reason,
            });
        }
    }
    Ok(())
}
