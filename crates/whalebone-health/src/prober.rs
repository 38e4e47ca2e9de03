//! Parallel probe rounds and pending-host bookkeeping.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::checker::{Probe, ProbeResult};

/// Probes many hosts at once.
#[derive(Clone)]
pub struct ReachabilityProber {
    probe: Arc<dyn Probe>,
}

impl ReachabilityProber {
    pub fn new(probe: Arc<dyn Probe>) -> Self {
        Self { probe }
    }

    /// Probe every host once, concurrently. Results follow `hosts` order.
    pub async fn probe_round(&self, hosts: &[String]) -> Vec<(String, ProbeResult)> {
        let mut set = JoinSet::new();
        for (idx, host) in hosts.iter().enumerate() {
            let probe = self.probe.clone();
            let host = host.clone();
            set.spawn(async move {
                let result = probe.probe(&host).await;
                (idx, result)
            });
        }

        let mut slots = vec![ProbeResult::Failed; hosts.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, result)) => slots[idx] = result,
                // A panicked probe leaves its slot as Failed.
                Err(e) => error!(error = %e, "probe task failed"),
            }
        }

        hosts.iter().cloned().zip(slots).collect()
    }
}

/// Hosts that have not yet answered, with the number of probes each took.
#[derive(Debug, Default)]
pub struct ReachabilityTracker {
    pending: BTreeSet<String>,
    attempts: BTreeMap<String, u32>,
}

impl ReachabilityTracker {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pending: hosts.into_iter().map(Into::into).collect(),
            attempts: BTreeMap::new(),
        }
    }

    /// Record one probe. Returns `true` if the host just became reachable.
    pub fn record(&mut self, host: &str, result: ProbeResult) -> bool {
        if !self.pending.contains(host) {
            return false;
        }
        *self.attempts.entry(host.to_string()).or_insert(0) += 1;
        if result.is_reachable() {
            self.pending.remove(host);
            return true;
        }
        debug!(%host, ?result, attempts = self.attempts[host], "host still unreachable");
        false
    }

    pub fn pending(&self) -> Vec<String> {
        self.pending.iter().cloned().collect()
    }

    pub fn is_done(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn attempts(&self, host: &str) -> u32 {
        self.attempts.get(host).copied().unwrap_or(0)
    }
}
