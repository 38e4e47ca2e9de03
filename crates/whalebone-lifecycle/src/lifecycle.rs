//! Cluster lifecycle controller.
//!
//! Each wait is a poll loop with a bounded interval, an optional upper
//! bound and a cancellation check between rounds. Every successful
//! directory refresh is written back to the store before the loop
//! decides whether it is done.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use whalebone_cloud::{CloudError, InstanceDirectory};
use whalebone_core::config::Timing;
use whalebone_core::{Instance, InstanceId, InstanceState, LaunchRequest, Shutdown};
use whalebone_dispatch::{DispatchResult, Dispatcher};
use whalebone_health::{ReachabilityProber, ReachabilityTracker};
use whalebone_state::{ClusterRecord, ClusterStore};

use crate::error::{LifecycleError, LifecycleResult};
use crate::phase::ClusterPhase;
use crate::steps::Step;

/// Poll intervals and upper bounds for the lifecycle waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleTiming {
    pub state_poll_interval: Duration,
    /// `None` waits until cancelled.
    pub state_wait_timeout: Option<Duration>,
    pub reachability_poll_interval: Duration,
    pub reachability_timeout: Option<Duration>,
}

impl Default for LifecycleTiming {
    fn default() -> Self {
        Self {
            state_poll_interval: Duration::from_secs(2),
            state_wait_timeout: Some(Duration::from_secs(30 * 60)),
            reachability_poll_interval: Duration::from_secs(1),
            reachability_timeout: Some(Duration::from_secs(15 * 60)),
        }
    }
}

impl From<&Timing> for LifecycleTiming {
    fn from(t: &Timing) -> Self {
        Self {
            state_poll_interval: t.state_poll_interval,
            state_wait_timeout: t.state_wait_timeout,
            reachability_poll_interval: t.reachability_poll_interval,
            reachability_timeout: t.reachability_timeout,
        }
    }
}

/// What a state wait observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateWaitReport {
    pub target: InstanceState,
    /// Last refreshed view, in record order.
    pub instances: Vec<Instance>,
    /// Instances that reached `target`.
    pub reached: Vec<InstanceId>,
    /// Instances found terminated while waiting for something else.
    pub reclaimed: Vec<InstanceId>,
    /// Directory refreshes performed.
    pub rounds: u32,
}

impl StateWaitReport {
    fn empty(target: InstanceState) -> Self {
        Self {
            target,
            instances: Vec::new(),
            reached: Vec::new(),
            reclaimed: Vec::new(),
            rounds: 0,
        }
    }
}

/// Drives one named cluster.
pub struct ClusterLifecycle {
    cluster: String,
    store: ClusterStore,
    directory: InstanceDirectory,
    prober: ReachabilityProber,
    dispatcher: Dispatcher,
    timing: LifecycleTiming,
    phase: ClusterPhase,
}

impl ClusterLifecycle {
    /// Attach to `cluster`, taking its phase from whatever is on disk.
    pub fn open(
        cluster: impl Into<String>,
        store: ClusterStore,
        directory: InstanceDirectory,
        prober: ReachabilityProber,
        dispatcher: Dispatcher,
    ) -> LifecycleResult<Self> {
        let cluster = cluster.into();
        let record = store.load(&cluster)?;
        let phase = ClusterPhase::from_record(&record);
        debug!(%cluster, %phase, instances = record.len(), "cluster opened");
        Ok(Self {
            cluster,
            store,
            directory,
            prober,
            dispatcher,
            timing: LifecycleTiming::default(),
            phase,
        })
    }

    pub fn with_timing(mut self, timing: LifecycleTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn phase(&self) -> ClusterPhase {
        self.phase
    }

    pub fn store(&self) -> &ClusterStore {
        &self.store
    }

    /// The saved record, without contacting the provider.
    pub fn record(&self) -> LifecycleResult<ClusterRecord> {
        Ok(self.store.load(&self.cluster)?)
    }

    // ── Launch ─────────────────────────────────────────────────────

    /// Replace any existing cluster with a fresh one and bring it up.
    ///
    /// Order: terminate the old set, start the new one, save it, wait for
    /// every instance to run, wait for every host to accept ssh, then run
    /// `steps` in order across all hosts.
    pub async fn launch(
        &mut self,
        request: &LaunchRequest,
        steps: &[Step],
        shutdown: &Shutdown,
    ) -> LifecycleResult<StateWaitReport> {
        if self.terminate(shutdown).await? {
            info!(cluster = %self.cluster, "previous instances terminated");
        }

        self.advance(ClusterPhase::Launching)?;
        self.store.ensure_cluster_dir(&self.cluster)?;
        let launched = self.directory.launch(request).await?;
        self.store.save(&self.cluster, &launched)?;
        info!(
            cluster = %self.cluster,
            count = launched.len(),
            "cluster launched, waiting for it to come up"
        );

        self.wait_for_launch(steps, shutdown).await
    }

    /// Wait for the saved cluster to run and answer ssh, then run `steps`.
    pub async fn wait_for_launch(
        &mut self,
        steps: &[Step],
        shutdown: &Shutdown,
    ) -> LifecycleResult<StateWaitReport> {
        let report = self.wait_for_state(InstanceState::Running, shutdown).await?;
        if !report.reclaimed.is_empty() {
            warn!(
                cluster = %self.cluster,
                reclaimed = ?report.reclaimed,
                "continuing without reclaimed instances"
            );
        }
        self.wait_for_reachability(shutdown).await?;
        self.run_steps(steps, shutdown).await?;
        Ok(report)
    }

    // ── Waits ──────────────────────────────────────────────────────

    /// Poll the directory until every saved instance is in `target`.
    ///
    /// An instance found `terminated` while waiting for something else
    /// counts as settled and is listed in
    /// [`reclaimed`](StateWaitReport::reclaimed).
    pub async fn wait_for_state(
        &mut self,
        target: InstanceState,
        shutdown: &Shutdown,
    ) -> LifecycleResult<StateWaitReport> {
        let ids = self.record()?.ids();
        if ids.is_empty() {
            debug!(cluster = %self.cluster, %target, "no instances to wait for");
            return Ok(StateWaitReport::empty(target));
        }

        info!(cluster = %self.cluster, count = ids.len(), %target, "waiting for instances");
        let started = Instant::now();
        let deadline = self.timing.state_wait_timeout.map(|limit| started + limit);
        let mut settled: HashSet<InstanceId> = HashSet::new();
        let mut report = StateWaitReport::empty(target);

        loop {
            let instances = match self.directory.resolve_until(&ids, deadline, shutdown).await {
                Ok(instances) => instances,
                // A tracked id the provider no longer describes.
                Err(CloudError::TimedOut { .. }) => {
                    return Err(LifecycleError::TimedOut {
                        operation: "wait_for_state",
                        waited: started.elapsed(),
                        pending: pending_ids(&ids, &settled),
                    });
                }
                Err(e) => return Err(e.into()),
            };
            self.store.save(&self.cluster, &instances)?;
            report.rounds += 1;

            for instance in &instances {
                if settled.contains(&instance.id) {
                    continue;
                }
                if instance.state == target {
                    info!(
                        host = %instance.display_host(),
                        instance = %instance.id,
                        state = %instance.state,
                        "instance reached target state"
                    );
                    settled.insert(instance.id.clone());
                    report.reached.push(instance.id.clone());
                } else if instance.state == InstanceState::Terminated {
                    warn!(
                        host = %instance.display_host(),
                        instance = %instance.id,
                        %target,
                        "instance terminated while waiting"
                    );
                    settled.insert(instance.id.clone());
                    report.reclaimed.push(instance.id.clone());
                } else {
                    debug!(instance = %instance.id, state = %instance.state, "still waiting");
                }
            }
            report.instances = instances;

            if settled.len() == ids.len() {
                break;
            }

            if let Some(limit) = self.timing.state_wait_timeout {
                let waited = started.elapsed();
                if waited >= limit {
                    return Err(LifecycleError::TimedOut {
                        operation: "wait_for_state",
                        waited,
                        pending: pending_ids(&ids, &settled),
                    });
                }
            }

            if !shutdown.sleep(self.timing.state_poll_interval).await {
                return Err(LifecycleError::Cancelled);
            }
        }

        let next = match target {
            InstanceState::Terminated => ClusterPhase::Terminated,
            InstanceState::Running if report.reached.is_empty() => ClusterPhase::Terminated,
            InstanceState::Running => ClusterPhase::Running,
            _ => self.phase,
        };
        self.advance(next)?;

        info!(
            cluster = %self.cluster,
            %target,
            reached = report.reached.len(),
            reclaimed = report.reclaimed.len(),
            rounds = report.rounds,
            "instances settled"
        );
        Ok(report)
    }

    /// Probe every saved public host until all of them accept ssh.
    pub async fn wait_for_reachability(&self, shutdown: &Shutdown) -> LifecycleResult<()> {
        let record = self.record()?;
        let hosts = record.reachable_hosts();
        if hosts.len() < record.len() {
            warn!(
                cluster = %self.cluster,
                skipped = record.len() - hosts.len(),
                "instances without a public name are not probed"
            );
        }
        if hosts.is_empty() {
            return Ok(());
        }

        info!(cluster = %self.cluster, hosts = hosts.len(), "waiting for ssh");
        let started = Instant::now();
        let mut tracker = ReachabilityTracker::new(hosts);

        loop {
            let pending = tracker.pending();
            let results = tokio::select! {
                results = self.prober.probe_round(&pending) => results,
                _ = shutdown.cancelled() => return Err(LifecycleError::Cancelled),
            };
            for (host, result) in results {
                if tracker.record(&host, result) {
                    info!(%host, attempts = tracker.attempts(&host), "ssh is up");
                }
            }

            if tracker.is_done() {
                info!(cluster = %self.cluster, "every host accepts ssh");
                return Ok(());
            }

            if let Some(limit) = self.timing.reachability_timeout {
                let waited = started.elapsed();
                if waited >= limit {
                    return Err(LifecycleError::TimedOut {
                        operation: "wait_for_reachability",
                        waited,
                        pending: tracker.pending(),
                    });
                }
            }

            if !shutdown.sleep(self.timing.reachability_poll_interval).await {
                return Err(LifecycleError::Cancelled);
            }
        }
    }

    // ── Terminate ──────────────────────────────────────────────────

    /// Terminate every saved instance, wait for it, then drop the record.
    ///
    /// Returns `false` when there was nothing to terminate.
    pub async fn terminate(&mut self, shutdown: &Shutdown) -> LifecycleResult<bool> {
        self.store.ensure_cluster_dir(&self.cluster)?;
        let record = self.record()?;
        if record.is_empty() {
            debug!(cluster = %self.cluster, "nothing to terminate");
            self.phase = ClusterPhase::Absent;
            return Ok(false);
        }

        let ids = record.ids();
        info!(cluster = %self.cluster, count = ids.len(), "terminating cluster");
        self.directory.terminate(&ids).await?;
        self.wait_for_state(InstanceState::Terminated, shutdown).await?;
        self.store.remove(&self.cluster)?;
        self.advance(ClusterPhase::Absent)?;
        info!(cluster = %self.cluster, "cluster terminated");
        Ok(true)
    }

    // ── Queries ────────────────────────────────────────────────────

    /// Refresh every saved instance from the provider and save the result.
    ///
    /// Bounded by the state wait timeout.
    pub async fn instances(&self, shutdown: &Shutdown) -> LifecycleResult<Vec<Instance>> {
        let ids = self.store.load_required(&self.cluster)?.ids();
        let started = Instant::now();
        let deadline = self.timing.state_wait_timeout.map(|limit| started + limit);
        let instances = match self.directory.resolve_until(&ids, deadline, shutdown).await {
            Ok(instances) => instances,
            Err(CloudError::TimedOut { .. }) => {
                return Err(LifecycleError::TimedOut {
                    operation: "instances",
                    waited: started.elapsed(),
                    pending: ids,
                });
            }
            Err(e) => return Err(e.into()),
        };
        self.store.save(&self.cluster, &instances)?;
        Ok(instances)
    }

    /// Saved public names with an assigned value, in record order.
    pub fn hosts(&self) -> LifecycleResult<Vec<String>> {
        let hosts = self.store.load_required(&self.cluster)?.reachable_hosts();
        if hosts.is_empty() {
            return Err(LifecycleError::NoHosts(self.cluster.clone()));
        }
        Ok(hosts)
    }

    // ── Remote work ────────────────────────────────────────────────

    /// Run `command` on every host and return every outcome, failed or not.
    pub async fn dispatch(
        &self,
        command: &str,
        shutdown: &Shutdown,
    ) -> LifecycleResult<DispatchResult> {
        let hosts = self.hosts()?;
        Ok(self.dispatcher.dispatch(command, &hosts, shutdown).await?)
    }

    /// Like [`dispatch`](Self::dispatch), against the first host of the
    /// record only.
    pub async fn dispatch_first(
        &self,
        command: &str,
        shutdown: &Shutdown,
    ) -> LifecycleResult<DispatchResult> {
        let hosts = self.hosts()?;
        Ok(self.dispatcher.dispatch(command, &hosts[..1], shutdown).await?)
    }

    /// Run `steps` in order across every host, stopping at the first
    /// step any host fails.
    pub async fn run_steps(&self, steps: &[Step], shutdown: &Shutdown) -> LifecycleResult<()> {
        if steps.is_empty() {
            return Ok(());
        }
        let hosts = self.hosts()?;
        for (index, step) in steps.iter().enumerate() {
            info!(
                cluster = %self.cluster,
                step = %step.label(),
                index = index + 1,
                total = steps.len(),
                "running step"
            );
            self.run_step(step, &hosts, shutdown).await?;
        }
        Ok(())
    }

    async fn run_step(
        &self,
        step: &Step,
        hosts: &[String],
        shutdown: &Shutdown,
    ) -> LifecycleResult<()> {
        let d = &self.dispatcher;
        let result = match step {
            Step::Run { command, .. } => d.dispatch(command, hosts, shutdown).await,
            Step::Push { local, remote, .. } => d.push_file(local, remote, hosts, shutdown).await,
            Step::Mirror { local, remote, .. } => {
                d.mirror_dir(local, remote, hosts, shutdown).await
            }
            Step::Pipe { local, command, .. } => {
                d.pipe_file(local, command, hosts, shutdown).await
            }
        };
        result
            .and_then(DispatchResult::into_result)
            .map(|_| ())
            .map_err(|e| match LifecycleError::from(e) {
                LifecycleError::Dispatch(source) => LifecycleError::Bootstrap {
                    step: step.label().to_string(),
                    source,
                },
                other => other,
            })
    }

    // ── Phase ──────────────────────────────────────────────────────

    fn advance(&mut self, next: ClusterPhase) -> LifecycleResult<()> {
        if !self.phase.can_transition_to(next) {
            return Err(LifecycleError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        if self.phase != next {
            debug!(cluster = %self.cluster, from = %self.phase, to = %next, "phase change");
            self.phase = next;
        }
        Ok(())
    }
}

fn pending_ids(ids: &[InstanceId], settled: &HashSet<InstanceId>) -> Vec<InstanceId> {
    ids.iter().filter(|id| !settled.contains(*id)).cloned().collect()
}
