//! Shared types used across Whalebone crates.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque instance identifier handed out by the cloud provider.
pub type InstanceId = String;

/// Lifecycle state of a cloud instance as last observed from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceState {
    Pending,
    Running,
    ShuttingDown,
    Terminated,
    /// Anything else the provider reports (stopping, stopped, or a state
    /// this tool does not track). Treated as transient.
    Unknown,
}

impl InstanceState {
    /// Map a provider state name onto the tracked states.
    pub fn from_provider(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "pending" => InstanceState::Pending,
            "running" => InstanceState::Running,
            "shutting-down" => InstanceState::ShuttingDown,
            "terminated" => InstanceState::Terminated,
            _ => InstanceState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceState::Pending => "pending",
            InstanceState::Running => "running",
            InstanceState::ShuttingDown => "shutting-down",
            InstanceState::Terminated => "terminated",
            InstanceState::Unknown => "unknown",
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One cloud-provisioned node.
///
/// Only ever built from a provider answer; the lifecycle never edits
/// these fields locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: InstanceId,
    pub state: InstanceState,
    /// Public DNS name. Empty until the provider assigns one.
    pub public_dns: String,
    /// Private DNS name. Empty until the provider assigns one.
    pub private_dns: String,
}

impl Instance {
    pub fn new(
        id: impl Into<String>,
        state: InstanceState,
        public_dns: impl Into<String>,
        private_dns: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            state,
            public_dns: public_dns.into(),
            private_dns: private_dns.into(),
        }
    }

    /// Name to use when talking to this node from outside the cloud.
    ///
    /// Falls back to the instance id so log lines stay readable while the
    /// provider has not assigned a name yet.
    pub fn display_host(&self) -> &str {
        if self.public_dns.is_empty() {
            &self.id
        } else {
            &self.public_dns
        }
    }
}

/// Parameters for a cluster launch request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchRequest {
    pub image_id: String,
    pub count: u32,
    pub keypair: String,
    pub instance_type: String,
    /// First-boot script handed to the instances verbatim.
    pub user_data: String,
}
