//! Persisted cluster record.

use serde::{Deserialize, Serialize};

use whalebone_core::{Instance, InstanceId};

/// Membership of one cluster, in launch order.
///
/// Index `i` of [`ids`](Self::ids), [`public_names`](Self::public_names)
/// and [`private_names`](Self::private_names) always refers to the same
/// instance because all three are projections of `instances`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub cluster: String,
    pub instances: Vec<Instance>,
    /// Unix timestamp (seconds) of the last save.
    pub updated_at: u64,
}

impl ClusterRecord {
    /// An empty record for a cluster that has never been saved.
    pub fn empty(cluster: &str) -> Self {
        Self {
            cluster: cluster.to_string(),
            instances: Vec::new(),
            updated_at: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn ids(&self) -> Vec<InstanceId> {
        self.instances.iter().map(|i| i.id.clone()).collect()
    }

    pub fn public_names(&self) -> Vec<String> {
        self.instances.iter().map(|i| i.public_dns.clone()).collect()
    }

    pub fn private_names(&self) -> Vec<String> {
        self.instances.iter().map(|i| i.private_dns.clone()).collect()
    }

    /// Public names that have been assigned, in record order.
    pub fn reachable_hosts(&self) -> Vec<String> {
        self.instances
            .iter()
            .filter(|i| !i.public_dns.is_empty())
            .map(|i| i.public_dns.clone())
            .collect()
    }
}
