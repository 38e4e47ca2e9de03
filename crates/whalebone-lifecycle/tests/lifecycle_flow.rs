//! End-to-end lifecycle flows against the in-memory cloud.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use whalebone_cloud::{CloudProvider, DescribeFault, InMemoryCloud, InstanceDirectory};
use whalebone_core::{Instance, InstanceState, LaunchRequest, Shutdown};
use whalebone_dispatch::{CommandOutcome, Dispatcher, RemoteExecutor, Transfer};
use whalebone_health::{Probe, ProbeResult, ReachabilityProber};
use whalebone_lifecycle::{ClusterLifecycle, ClusterPhase, LifecycleError, LifecycleTiming, Step};
use whalebone_state::ClusterStore;

const CLUSTER: &str = "prod";

// ── Fakes ──────────────────────────────────────────────────────────

/// Unreachable for the first `failures` probes of each host.
struct FlakyProbe {
    failures: u32,
    seen: Mutex<HashMap<String, u32>>,
}

impl FlakyProbe {
    fn new(failures: u32) -> Self {
        Self {
            failures,
            seen: Mutex::new(HashMap::new()),
        }
    }

    fn probes(&self, host: &str) -> u32 {
        self.seen.lock().unwrap().get(host).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Probe for FlakyProbe {
    async fn probe(&self, host: &str) -> ProbeResult {
        let mut seen = self.seen.lock().unwrap();
        let count = seen.entry(host.to_string()).or_insert(0);
        *count += 1;
        if *count > self.failures {
            ProbeResult::Reachable
        } else {
            ProbeResult::Unreachable
        }
    }
}

/// Records every operation; fails `command` on `host` if told to.
#[derive(Default)]
struct RecordingExecutor {
    calls: Mutex<Vec<(String, String)>>,
    failing: Mutex<Option<(String, String)>>,
}

impl RecordingExecutor {
    fn fail(&self, host: &str, command: &str) {
        *self.failing.lock().unwrap() = Some((host.to_string(), command.to_string()));
    }

    fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    fn commands(&self) -> Vec<String> {
        self.calls().into_iter().map(|(_, c)| c).collect()
    }
}

#[async_trait]
impl RemoteExecutor for RecordingExecutor {
    async fn run(&self, host: &str, command: &str, _stdin: Option<Arc<[u8]>>) -> CommandOutcome {
        self.calls
            .lock()
            .unwrap()
            .push((host.to_string(), command.to_string()));
        let failing = self.failing.lock().unwrap().clone();
        match failing {
            Some((h, c)) if h == host && c == command => CommandOutcome::exited(host, 1, "boom"),
            _ => CommandOutcome::success(host),
        }
    }

    async fn transfer(
        &self,
        host: &str,
        local: &Path,
        remote: &str,
        _mode: Transfer,
    ) -> CommandOutcome {
        self.calls
            .lock()
            .unwrap()
            .push((host.to_string(), format!("transfer {} {remote}", local.display())));
        CommandOutcome::success(host)
    }
}

// ── Harness ────────────────────────────────────────────────────────

struct Harness {
    dir: TempDir,
    cloud: Arc<InMemoryCloud>,
    probe: Arc<FlakyProbe>,
    executor: Arc<RecordingExecutor>,
    timing: LifecycleTiming,
}

impl Harness {
    fn new(cloud: InMemoryCloud, probe_failures: u32) -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            cloud: Arc::new(cloud),
            probe: Arc::new(FlakyProbe::new(probe_failures)),
            executor: Arc::new(RecordingExecutor::default()),
            timing: LifecycleTiming {
                state_poll_interval: Duration::from_millis(1),
                state_wait_timeout: Some(Duration::from_secs(5)),
                reachability_poll_interval: Duration::from_millis(1),
                reachability_timeout: Some(Duration::from_secs(5)),
            },
        }
    }

    fn state_root(&self) -> PathBuf {
        self.dir.path().join("state")
    }

    fn store(&self) -> ClusterStore {
        ClusterStore::open(self.state_root()).unwrap()
    }

    /// A fresh controller over the same disk, cloud and hosts, as a new
    /// process invocation would build it.
    fn open(&self) -> ClusterLifecycle {
        let provider: Arc<dyn CloudProvider> = self.cloud.clone();
        let directory =
            InstanceDirectory::new(provider).with_retry_interval(Duration::from_millis(1));
        let prober = ReachabilityProber::new(self.probe.clone());
        let dispatcher = Dispatcher::new(self.executor.clone());
        ClusterLifecycle::open(CLUSTER, self.store(), directory, prober, dispatcher)
            .unwrap()
            .with_timing(self.timing)
    }

    fn local_file(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, "contents").unwrap();
        path
    }
}

fn request(count: u32) -> LaunchRequest {
    LaunchRequest {
        image_id: "ami-test".to_string(),
        count,
        keypair: "kp".to_string(),
        instance_type: "m1.xlarge".to_string(),
        user_data: "#!/bin/sh\n".to_string(),
    }
}

// ── Launch ─────────────────────────────────────────────────────────

#[tokio::test]
async fn launch_brings_cluster_up_and_runs_steps_in_order() {
    let h = Harness::new(InMemoryCloud::new().with_boot_polls(2), 1);
    let config = h.local_file("cassandra.yaml");
    let steps = vec![
        Step::run("setup", "test -f /tmp/setup_complete"),
        Step::push("config", &config, "cassandra.yaml"),
    ];

    let mut lifecycle = h.open();
    let report = lifecycle.launch(&request(3), &steps, &Shutdown::never()).await.unwrap();

    assert_eq!(lifecycle.phase(), ClusterPhase::Running);
    assert_eq!(report.reached.len(), 3);
    assert!(report.reclaimed.is_empty());
    assert!(report.rounds >= 3, "boot takes three describes, got {}", report.rounds);

    let record = lifecycle.record().unwrap();
    assert_eq!(record.len(), 3);
    assert!(record.instances.iter().all(|i| i.state == InstanceState::Running));

    for host in record.public_names() {
        assert!(!host.is_empty());
        assert_eq!(h.probe.probes(&host), 2);
    }

    let commands = h.executor.commands();
    assert_eq!(commands.len(), 6);
    assert!(commands[..3].iter().all(|c| c == "test -f /tmp/setup_complete"));
    assert!(commands[3..].iter().all(|c| c.starts_with("transfer ")));
}

#[tokio::test]
async fn relaunch_leaves_only_the_second_set() {
    let h = Harness::new(InMemoryCloud::new(), 0);
    let shutdown = Shutdown::never();

    let mut lifecycle = h.open();
    let first = lifecycle.launch(&request(3), &[], &shutdown).await.unwrap();
    let second = lifecycle.launch(&request(2), &[], &shutdown).await.unwrap();

    let live: Vec<String> = h.cloud.live_instances().into_iter().map(|i| i.id).collect();
    assert_eq!(live.len(), 2);
    assert_eq!(live, second.reached);
    assert!(first.reached.iter().all(|id| !live.contains(id)));
    assert_eq!(lifecycle.record().unwrap().ids(), live);
}

#[tokio::test]
async fn launch_failure_leaves_no_record() {
    let cloud = InMemoryCloud::new();
    cloud.reject_launches("insufficient capacity");
    let h = Harness::new(cloud, 0);

    let mut lifecycle = h.open();
    let err = lifecycle
        .launch(&request(2), &[], &Shutdown::never())
        .await
        .unwrap_err();

    assert!(matches!(err, LifecycleError::Cloud(_)), "got {err:?}");
    assert!(lifecycle.record().unwrap().is_empty());
}

// ── Waits ──────────────────────────────────────────────────────────

#[tokio::test]
async fn reclaimed_instance_settles_running_wait() {
    let h = Harness::new(InMemoryCloud::new().with_boot_polls(1), 0);
    let launched = h.cloud.run_instances(&request(2)).await.unwrap();
    h.store().save(CLUSTER, &launched).unwrap();
    assert!(h.cloud.reclaim(&launched[0].id));

    let mut lifecycle = h.open();
    assert_eq!(lifecycle.phase(), ClusterPhase::Launching);
    let report = lifecycle
        .wait_for_state(InstanceState::Running, &Shutdown::never())
        .await
        .unwrap();

    assert_eq!(report.reclaimed, vec![launched[0].id.clone()]);
    assert_eq!(report.reached, vec![launched[1].id.clone()]);
    assert_eq!(lifecycle.phase(), ClusterPhase::Running);
}

#[tokio::test]
async fn every_refresh_is_written_back() {
    let h = Harness::new(InMemoryCloud::new(), 0);
    let launched = h.cloud.run_instances(&request(2)).await.unwrap();
    h.store().save(CLUSTER, &launched).unwrap();

    let mut lifecycle = h.open();
    lifecycle
        .wait_for_state(InstanceState::Running, &Shutdown::never())
        .await
        .unwrap();

    let record = h.store().load(CLUSTER).unwrap();
    let public = std::fs::read_to_string(h.store().public_names_path(CLUSTER).unwrap()).unwrap();
    let lines: Vec<&str> = public.lines().collect();
    assert_eq!(lines, record.public_names());
    assert!(lines.iter().all(|l| !l.is_empty()));
}

#[tokio::test]
async fn transient_describe_errors_do_not_break_waits() {
    let h = Harness::new(InMemoryCloud::new(), 0);
    let launched = h.cloud.run_instances(&request(2)).await.unwrap();
    h.store().save(CLUSTER, &launched).unwrap();
    h.cloud.inject_fault(DescribeFault::Error("throttled".to_string()));
    h.cloud.inject_fault(DescribeFault::DropLast);

    let mut lifecycle = h.open();
    let report = lifecycle
        .wait_for_state(InstanceState::Running, &Shutdown::never())
        .await
        .unwrap();

    assert_eq!(report.reached.len(), 2);
    assert!(h.cloud.describe_calls() >= 3);
}

#[tokio::test]
async fn state_wait_times_out_with_pending_ids() {
    let mut h = Harness::new(InMemoryCloud::new().with_boot_polls(u32::MAX), 0);
    h.timing.state_wait_timeout = Some(Duration::from_millis(20));
    let launched = h.cloud.run_instances(&request(2)).await.unwrap();
    h.store().save(CLUSTER, &launched).unwrap();

    let mut lifecycle = h.open();
    let err = lifecycle
        .wait_for_state(InstanceState::Running, &Shutdown::never())
        .await
        .unwrap_err();

    match err {
        LifecycleError::TimedOut {
            operation, pending, ..
        } => {
            assert_eq!(operation, "wait_for_state");
            assert_eq!(pending.len(), 2);
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn state_wait_times_out_when_an_id_is_never_described() {
    let mut h = Harness::new(InMemoryCloud::new(), 0);
    h.timing.state_wait_timeout = Some(Duration::from_millis(50));
    let mut saved = h.cloud.run_instances(&request(1)).await.unwrap();
    saved.push(Instance::new("i-gone", InstanceState::Running, "", ""));
    h.store().save(CLUSTER, &saved).unwrap();

    let mut lifecycle = h.open();
    let err = tokio::time::timeout(
        Duration::from_secs(2),
        lifecycle.wait_for_state(InstanceState::Running, &Shutdown::never()),
    )
    .await
    .expect("state wait must honour its own timeout")
    .unwrap_err();

    match err {
        LifecycleError::TimedOut {
            operation, pending, ..
        } => {
            assert_eq!(operation, "wait_for_state");
            assert!(pending.contains(&"i-gone".to_string()), "got {pending:?}");
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(h.store().load(CLUSTER).unwrap().instances, saved);
}

#[tokio::test]
async fn instances_gives_up_on_an_id_that_is_never_described() {
    let mut h = Harness::new(InMemoryCloud::new(), 0);
    h.timing.state_wait_timeout = Some(Duration::from_millis(50));
    let saved = vec![Instance::new("i-gone", InstanceState::Running, "", "")];
    h.store().save(CLUSTER, &saved).unwrap();

    let err = tokio::time::timeout(
        Duration::from_secs(2),
        h.open().instances(&Shutdown::never()),
    )
    .await
    .expect("refresh must honour the state wait timeout")
    .unwrap_err();

    assert!(
        matches!(err, LifecycleError::TimedOut { operation: "instances", .. }),
        "got {err:?}"
    );
}

#[tokio::test]
async fn reachability_wait_times_out_with_pending_hosts() {
    let mut h = Harness::new(InMemoryCloud::new(), u32::MAX);
    h.timing.reachability_timeout = Some(Duration::from_millis(20));

    let mut lifecycle = h.open();
    let err = lifecycle
        .launch(&request(2), &[], &Shutdown::never())
        .await
        .unwrap_err();

    match err {
        LifecycleError::TimedOut {
            operation, pending, ..
        } => {
            assert_eq!(operation, "wait_for_reachability");
            assert_eq!(pending.len(), 2);
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn cancelled_wait_stops() {
    let h = Harness::new(InMemoryCloud::new().with_boot_polls(u32::MAX), 0);
    let launched = h.cloud.run_instances(&request(1)).await.unwrap();
    h.store().save(CLUSTER, &launched).unwrap();

    let (trigger, shutdown) = Shutdown::new();
    let mut lifecycle = h.open();
    let wait = tokio::spawn(async move {
        lifecycle
            .wait_for_state(InstanceState::Running, &shutdown)
            .await
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    trigger.fire();

    let err = wait.await.unwrap().unwrap_err();
    assert!(matches!(err, LifecycleError::Cancelled), "got {err:?}");
}

// ── Terminate ──────────────────────────────────────────────────────

#[tokio::test]
async fn terminating_an_absent_cluster_is_a_noop() {
    let h = Harness::new(InMemoryCloud::new(), 0);
    let mut lifecycle = h.open();

    let terminated = lifecycle.terminate(&Shutdown::never()).await.unwrap();

    assert!(!terminated);
    assert_eq!(h.cloud.terminate_calls(), 0);
    assert_eq!(lifecycle.phase(), ClusterPhase::Absent);
    assert!(h.state_root().join(CLUSTER).is_dir());
}

#[tokio::test]
async fn terminate_waits_then_drops_the_record() {
    let h = Harness::new(InMemoryCloud::new().with_shutdown_polls(2), 0);
    let shutdown = Shutdown::never();
    h.open().launch(&request(2), &[], &shutdown).await.unwrap();

    let mut lifecycle = h.open();
    assert_eq!(lifecycle.phase(), ClusterPhase::Running);
    assert!(lifecycle.terminate(&shutdown).await.unwrap());

    assert_eq!(lifecycle.phase(), ClusterPhase::Absent);
    assert!(h.cloud.live_instances().is_empty());
    assert!(lifecycle.record().unwrap().is_empty());
    assert!(!h.store().record_path(CLUSTER).unwrap().exists());
}

#[tokio::test]
async fn terminate_while_still_launching() {
    let h = Harness::new(InMemoryCloud::new().with_boot_polls(u32::MAX), 0);
    let launched = h.cloud.run_instances(&request(2)).await.unwrap();
    h.store().save(CLUSTER, &launched).unwrap();

    let mut lifecycle = h.open();
    assert_eq!(lifecycle.phase(), ClusterPhase::Launching);

    let terminated = tokio::time::timeout(
        Duration::from_secs(2),
        lifecycle.terminate(&Shutdown::never()),
    )
    .await
    .expect("terminate of a launching cluster must not hang")
    .unwrap();

    assert!(terminated);
    assert_eq!(lifecycle.phase(), ClusterPhase::Absent);
    assert!(h.cloud.live_instances().is_empty());
    assert!(lifecycle.record().unwrap().is_empty());
}

// ── Remote work ────────────────────────────────────────────────────

#[tokio::test]
async fn failing_step_stops_the_sequence() {
    let h = Harness::new(InMemoryCloud::new(), 0);
    let shutdown = Shutdown::never();
    let mut lifecycle = h.open();
    lifecycle.launch(&request(2), &[], &shutdown).await.unwrap();
    let hosts = lifecycle.hosts().unwrap();
    h.executor.fail(&hosts[1], "install");

    let steps = vec![Step::run("install", "install"), Step::run("after", "after")];
    let err = lifecycle.run_steps(&steps, &shutdown).await.unwrap_err();

    match err {
        LifecycleError::Bootstrap { step, source } => {
            assert_eq!(step, "install");
            assert!(source.to_string().contains(&hosts[1]), "got {source}");
        }
        other => panic!("expected step failure, got {other:?}"),
    }
    assert_eq!(h.executor.commands(), vec!["install", "install"]);
}

#[tokio::test]
async fn missing_local_file_fails_the_step_before_any_host() {
    let h = Harness::new(InMemoryCloud::new(), 0);
    let shutdown = Shutdown::never();
    let mut lifecycle = h.open();
    lifecycle.launch(&request(1), &[], &shutdown).await.unwrap();

    let steps = vec![Step::pipe("schema", h.dir.path().join("absent.cql"), "cqlsh")];
    let err = lifecycle.run_steps(&steps, &shutdown).await.unwrap_err();

    assert!(matches!(err, LifecycleError::Bootstrap { .. }), "got {err:?}");
    assert!(h.executor.calls().is_empty());
}

#[tokio::test]
async fn dispatch_first_targets_one_host() {
    let h = Harness::new(InMemoryCloud::new(), 0);
    let shutdown = Shutdown::never();
    let mut lifecycle = h.open();
    lifecycle.launch(&request(3), &[], &shutdown).await.unwrap();
    let hosts = lifecycle.hosts().unwrap();

    let result = lifecycle.dispatch_first("import", &shutdown).await.unwrap();

    assert_eq!(result.total(), 1);
    assert_eq!(h.executor.calls(), vec![(hosts[0].clone(), "import".to_string())]);
}

#[tokio::test]
async fn commands_on_an_unknown_cluster_fail() {
    let h = Harness::new(InMemoryCloud::new(), 0);
    let lifecycle = h.open();

    let err = lifecycle.dispatch("uptime", &Shutdown::never()).await.unwrap_err();

    assert!(matches!(err, LifecycleError::State(_)), "got {err:?}");
}

#[tokio::test]
async fn instances_refreshes_from_the_provider() {
    let h = Harness::new(InMemoryCloud::new(), 0);
    let launched = h.cloud.run_instances(&request(2)).await.unwrap();
    h.store().save(CLUSTER, &launched).unwrap();

    let instances = h.open().instances(&Shutdown::never()).await.unwrap();

    assert!(instances.iter().all(|i| i.state == InstanceState::Running));
    assert_eq!(h.store().load(CLUSTER).unwrap().instances, instances);
}
