//! Cluster phase and its transition table.

use std::fmt;

use serde::{Deserialize, Serialize};

use whalebone_core::InstanceState;
use whalebone_state::ClusterRecord;

/// Where a cluster is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterPhase {
    /// No record on disk.
    Absent,
    /// Instances requested, not all observed running yet.
    Launching,
    /// Every tracked instance observed running (or reclaimed).
    Running,
    /// Every tracked instance observed terminated; record not yet removed.
    Terminated,
}

impl ClusterPhase {
    /// Whether `self -> next` is a legal move. Staying put is always legal.
    pub fn can_transition_to(self, next: ClusterPhase) -> bool {
        use ClusterPhase::*;
        self == next
            || matches!(
                (self, next),
                (Absent, Launching)
                    | (Launching, Running)
                    | (Launching, Terminated)
                    | (Running, Terminated)
                    | (Terminated, Absent)
            )
    }

    /// Best guess at the phase of a previously saved cluster.
    pub fn from_record(record: &ClusterRecord) -> Self {
        if record.is_empty() {
            return ClusterPhase::Absent;
        }
        let states = record.instances.iter().map(|i| i.state);
        let mut all_terminated = true;
        let mut all_settled = true;
        for state in states {
            all_terminated &= state == InstanceState::Terminated;
            all_settled &= matches!(state, InstanceState::Running | InstanceState::Terminated);
        }
        if all_terminated {
            ClusterPhase::Terminated
        } else if all_settled {
            ClusterPhase::Running
        } else {
            ClusterPhase::Launching
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterPhase::Absent => "absent",
            ClusterPhase::Launching => "launching",
            ClusterPhase::Running => "running",
            ClusterPhase::Terminated => "terminated",
        }
    }
}

impl fmt::Display for ClusterPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
