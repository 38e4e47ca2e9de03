//! whalebone.toml configuration parser.
//!
//! Every field is optional in the file; missing values fall back to the
//! defaults below. Paths may start with `~/`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

use crate::duration::{parse_duration, parse_limit};
use crate::ssh::SshSettings;

/// File name looked up inside the state root.
pub const CONFIG_FILE_NAME: &str = "whalebone.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WhaleboneConfig {
    pub cluster: ClusterConfig,
    pub ssh: SshConfig,
    pub cassandra: CassandraConfig,
    pub timing: TimingConfig,
    pub cloud: CloudConfig,
    pub dispatch: DispatchConfig,
}

/// What to launch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub size: u32,
    pub keypair: String,
    pub image_id: String,
    pub instance_type: String,
    /// First-boot script passed as instance user data.
    pub setup_script: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            size: 1,
            keypair: "awsmfd".to_string(),
            image_id: "ami-08f40561".to_string(),
            instance_type: "m1.xlarge".to_string(),
            setup_script: "~/.whalebone/setup_script.sh".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    pub credentials: String,
    pub user: String,
    pub connect_timeout: String,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            credentials: "~/.ssh/awsmfd.pem".to_string(),
            user: "ubuntu".to_string(),
            connect_timeout: "10s".to_string(),
        }
    }
}

/// Files and versions pushed to the nodes during bootstrap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CassandraConfig {
    pub config: String,
    pub env: String,
    pub version: String,
}

impl Default for CassandraConfig {
    fn default() -> Self {
        Self {
            config: "~/.whalebone/cassandra.yaml".to_string(),
            env: "~/.whalebone/cassandra-env.sh".to_string(),
            version: "0.7.0-rc2".to_string(),
        }
    }
}

/// Polling intervals and upper bounds. A bound of "0" means unbounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub resolve_retry_interval: String,
    pub resolve_timeout: String,
    pub state_poll_interval: String,
    pub state_wait_timeout: String,
    pub reachability_poll_interval: String,
    pub reachability_timeout: String,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            resolve_retry_interval: "500ms".to_string(),
            resolve_timeout: "0".to_string(),
            state_poll_interval: "2s".to_string(),
            state_wait_timeout: "30m".to_string(),
            reachability_poll_interval: "1s".to_string(),
            reachability_timeout: "15m".to_string(),
        }
    }
}

/// Parsed form of [`TimingConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub resolve_retry_interval: Duration,
    pub resolve_timeout: Option<Duration>,
    pub state_poll_interval: Duration,
    pub state_wait_timeout: Option<Duration>,
    pub reachability_poll_interval: Duration,
    pub reachability_timeout: Option<Duration>,
}

impl TimingConfig {
    pub fn parse(&self) -> anyhow::Result<Timing> {
        Ok(Timing {
            resolve_retry_interval: interval("resolve_retry_interval", &self.resolve_retry_interval)?,
            resolve_timeout: limit("resolve_timeout", &self.resolve_timeout)?,
            state_poll_interval: interval("state_poll_interval", &self.state_poll_interval)?,
            state_wait_timeout: limit("state_wait_timeout", &self.state_wait_timeout)?,
            reachability_poll_interval: interval(
                "reachability_poll_interval",
                &self.reachability_poll_interval,
            )?,
            reachability_timeout: limit("reachability_timeout", &self.reachability_timeout)?,
        })
    }
}

fn interval(field: &str, value: &str) -> anyhow::Result<Duration> {
    match parse_duration(value) {
        Some(d) if !d.is_zero() => Ok(d),
        Some(_) => bail!("timing.{field} must be greater than zero"),
        None => bail!("timing.{field}: invalid duration {value:?}"),
    }
}

fn limit(field: &str, value: &str) -> anyhow::Result<Option<Duration>> {
    parse_limit(value).with_context(|| format!("timing.{field}: invalid duration {value:?}"))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    /// Path or name of the `aws` command line tool.
    pub aws_binary: String,
    pub region: Option<String>,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            aws_binary: "aws".to_string(),
            region: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Cap on concurrent host executions. Unset runs one task per host.
    pub max_concurrency: Option<usize>,
}

impl WhaleboneConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: WhaleboneConfig =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise return the defaults.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.is_file() {
            Self::from_file(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn ssh_settings(&self) -> anyhow::Result<SshSettings> {
        let mut settings = SshSettings::new(expand_home(&self.ssh.credentials), &self.ssh.user);
        settings.connect_timeout = interval("ssh.connect_timeout", &self.ssh.connect_timeout)
            .context("invalid ssh.connect_timeout")?;
        Ok(settings)
    }
}

/// Default state root: `~/.whalebone`.
pub fn default_state_root() -> PathBuf {
    expand_home("~/.whalebone")
}

/// Expand a leading `~/` against `$HOME`.
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ if path == "~" => std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(path)),
        _ => PathBuf::from(path),
    }
}
