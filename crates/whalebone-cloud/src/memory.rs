//! In-memory cloud provider.
//!
//! Simulates the parts of a real provider the lifecycle cares about:
//! instances boot through `pending`, shut down through `shutting-down`,
//! and describe calls can be made to fail or come back short. Every
//! describe that observes an instance counts as one poll toward its next
//! transition, so tests control convergence by counting rounds.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::debug;

use whalebone_core::{Instance, InstanceId, InstanceState, LaunchRequest};

use crate::error::{CloudError, CloudResult};
use crate::provider::CloudProvider;

/// A one-shot misbehaviour applied to the next describe call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescribeFault {
    /// Fail with `CloudError::Transient`.
    Error(String),
    /// Answer normally but leave out the last instance.
    DropLast,
}

#[derive(Debug)]
struct SimInstance {
    instance: Instance,
    /// Polls left before the pending transition completes.
    countdown: u32,
    serial: u64,
}

#[derive(Debug, Default)]
struct Inner {
    instances: Vec<SimInstance>,
    next_serial: u64,
    boot_polls: u32,
    shutdown_polls: u32,
    faults: VecDeque<DescribeFault>,
    launch_rejection: Option<String>,
    describe_calls: u64,
    run_calls: u64,
    terminate_calls: u64,
}

/// Deterministic provider for tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryCloud {
    inner: Mutex<Inner>,
}

impl InMemoryCloud {
    /// Instances become `running` on their first describe and
    /// `terminated` on the first describe after termination.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of describes an instance stays `pending` after the first.
    pub fn with_boot_polls(self, polls: u32) -> Self {
        self.lock().boot_polls = polls;
        self
    }

    /// Number of describes an instance stays `shutting-down` after the first.
    pub fn with_shutdown_polls(self, polls: u32) -> Self {
        self.lock().shutdown_polls = polls;
        self
    }

    /// Queue a fault for an upcoming describe call (FIFO).
    pub fn inject_fault(&self, fault: DescribeFault) {
        self.lock().faults.push_back(fault);
    }

    /// Make every subsequent `run_instances` fail.
    pub fn reject_launches(&self, reason: &str) {
        self.lock().launch_rejection = Some(reason.to_string());
    }

    /// Terminate an instance behind the cluster's back.
    pub fn reclaim(&self, id: &str) -> bool {
        let mut inner = self.lock();
        match inner.instances.iter_mut().find(|s| s.instance.id == id) {
            Some(sim) => {
                sim.instance.state = InstanceState::Terminated;
                sim.instance.public_dns.clear();
                sim.countdown = 0;
                true
            }
            None => false,
        }
    }

    /// Every instance not yet terminated, in launch order.
    pub fn live_instances(&self) -> Vec<Instance> {
        self.lock()
            .instances
            .iter()
            .filter(|s| s.instance.state != InstanceState::Terminated)
            .map(|s| s.instance.clone())
            .collect()
    }

    pub fn instance(&self, id: &str) -> Option<Instance> {
        self.lock()
            .instances
            .iter()
            .find(|s| s.instance.id == id)
            .map(|s| s.instance.clone())
    }

    pub fn describe_calls(&self) -> u64 {
        self.lock().describe_calls
    }

    pub fn run_calls(&self) -> u64 {
        self.lock().run_calls
    }

    pub fn terminate_calls(&self) -> u64 {
        self.lock().terminate_calls
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Nothing in here can leave Inner half-updated on panic.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SimInstance {
    /// Count one observation and apply a due transition.
    fn observe(&mut self) {
        let next = match self.instance.state {
            InstanceState::Pending => InstanceState::Running,
            InstanceState::ShuttingDown => InstanceState::Terminated,
            _ => return,
        };
        if self.countdown > 0 {
            self.countdown -= 1;
            return;
        }
        self.instance.state = next;
        match next {
            InstanceState::Running => {
                self.instance.public_dns = format!("ec2-{}.compute.example", self.serial);
                self.instance.private_dns = format!("ip-10-0-{}.internal", self.serial);
            }
            InstanceState::Terminated => self.instance.public_dns.clear(),
            _ => {}
        }
    }
}

#[async_trait]
impl CloudProvider for InMemoryCloud {
    async fn describe_instances(&self, ids: &[InstanceId]) -> CloudResult<Vec<Instance>> {
        let mut inner = self.lock();
        inner.describe_calls += 1;
        let fault = inner.faults.pop_front();
        if let Some(DescribeFault::Error(message)) = &fault {
            return Err(CloudError::Transient(message.clone()));
        }

        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(sim) = inner.instances.iter_mut().find(|s| &s.instance.id == id) {
                sim.observe();
                found.push(sim.instance.clone());
            }
        }
        if fault == Some(DescribeFault::DropLast) {
            found.pop();
        }
        Ok(found)
    }

    async fn run_instances(&self, request: &LaunchRequest) -> CloudResult<Vec<Instance>> {
        let mut inner = self.lock();
        inner.run_calls += 1;
        if let Some(reason) = &inner.launch_rejection {
            return Err(CloudError::Launch(reason.clone()));
        }

        let mut launched = Vec::with_capacity(request.count as usize);
        for _ in 0..request.count {
            inner.next_serial += 1;
            let serial = inner.next_serial;
            let instance = Instance::new(format!("i-{serial:08x}"), InstanceState::Pending, "", "");
            let countdown = inner.boot_polls;
            inner.instances.push(SimInstance {
                instance: instance.clone(),
                countdown,
                serial,
            });
            launched.push(instance);
        }
        debug!(count = launched.len(), "simulated launch");
        Ok(launched)
    }

    async fn terminate_instances(&self, ids: &[InstanceId]) -> CloudResult<()> {
        let mut inner = self.lock();
        inner.terminate_calls += 1;
        if let Some(unknown) = ids
            .iter()
            .find(|id| !inner.instances.iter().any(|s| &s.instance.id == *id))
        {
            return Err(CloudError::Terminate(format!("unknown instance id {unknown}")));
        }

        let shutdown_polls = inner.shutdown_polls;
        for sim in inner.instances.iter_mut().filter(|s| ids.contains(&s.instance.id)) {
            if sim.instance.state != InstanceState::Terminated {
                sim.instance.state = InstanceState::ShuttingDown;
                sim.countdown = shutdown_polls;
            }
        }
        Ok(())
    }
}
