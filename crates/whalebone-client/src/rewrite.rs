//! Per-node rewrite of `cassandra.yaml`.
//!
//! Position in the ring comes from the node's index in the private host
//! list; every node sees the same list, so every node agrees on the
//! token layout and the seed set without talking to each other.

use std::io::Write;
use std::path::Path;

use serde_yaml::{Mapping, Value};
use tracing::info;

use whalebone_core::ring;

use crate::error::{RewriteError, RewriteResult};

pub const DEFAULT_CONFIG_PATH: &str = "/usr/local/apache-cassandra/conf/cassandra.yaml";
pub const DEFAULT_MEMBERS_PATH: &str = "~/boxen.private";

/// Read one host name per line, skipping blank lines.
pub fn read_members(path: &Path) -> RewriteResult<Vec<String>> {
    let content = std::fs::read_to_string(path).map_err(|e| RewriteError::io(path, e))?;
    let members: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();
    if members.is_empty() {
        return Err(RewriteError::EmptyMembership(path.to_path_buf()));
    }
    Ok(members)
}

/// The values one node writes into its config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSettings {
    pub initial_token: u128,
    pub seeds: Vec<String>,
    /// Used for both `listen_address` and `rpc_address`.
    pub address: String,
}

impl NodeSettings {
    /// Settings for `host` within `members`. Host names compare
    /// case-insensitively.
    pub fn for_node(members: &[String], host: &str) -> RewriteResult<Self> {
        let not_a_member = || RewriteError::NotAMember {
            host: host.to_string(),
        };
        let index = members
            .iter()
            .position(|m| m.eq_ignore_ascii_case(host))
            .ok_or_else(not_a_member)?;
        let initial_token = ring::token(index, members.len()).ok_or_else(not_a_member)?;
        Ok(Self {
            initial_token,
            seeds: ring::seeds(members),
            address: members[index].clone(),
        })
    }

    /// Overwrite the four managed keys; everything else is left alone.
    pub fn apply(&self, config: &mut Mapping) {
        let address = Value::String(self.address.clone());
        config.insert(
            "initial_token".into(),
            Value::String(self.initial_token.to_string()),
        );
        config.insert(
            "seeds".into(),
            Value::Sequence(self.seeds.iter().cloned().map(Value::String).collect()),
        );
        config.insert("listen_address".into(), address.clone());
        config.insert("rpc_address".into(), address);
    }
}

/// Apply `settings` to the YAML file at `path`, replacing it atomically.
pub fn rewrite_file(path: &Path, settings: &NodeSettings) -> RewriteResult<()> {
    let text = std::fs::read_to_string(path).map_err(|e| RewriteError::io(path, e))?;
    let value: Value = serde_yaml::from_str(&text).map_err(|source| RewriteError::Yaml {
        path: path.to_path_buf(),
        source,
    })?;
    let mut config = match value {
        Value::Mapping(m) => m,
        Value::Null => Mapping::new(),
        _ => return Err(RewriteError::NotAMapping(path.to_path_buf())),
    };

    settings.apply(&mut config);
    let out = serde_yaml::to_string(&Value::Mapping(config)).map_err(|source| {
        RewriteError::Yaml {
            path: path.to_path_buf(),
            source,
        }
    })?;
    write_atomic(path, out.as_bytes())?;

    info!(
        path = %path.display(),
        token = %settings.initial_token,
        seeds = settings.seeds.len(),
        address = %settings.address,
        "config rewritten"
    );
    Ok(())
}

/// This node's fully qualified name, as `hostname -f` reports it.
pub async fn local_hostname() -> RewriteResult<String> {
    let command = "hostname -f";
    let output = tokio::process::Command::new("hostname")
        .arg("-f")
        .output()
        .await
        .map_err(|e| RewriteError::Command {
            command: command.to_string(),
            reason: e.to_string(),
        })?;
    if !output.status.success() {
        return Err(RewriteError::Command {
            command: command.to_string(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> RewriteResult<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| RewriteError::io(dir, e))?;
    tmp.write_all(bytes)
        .map_err(|e| RewriteError::io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| RewriteError::io(path, e.error))?;
    Ok(())
}
