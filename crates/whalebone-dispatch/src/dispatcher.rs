//! Fan-out of one operation across every host.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use whalebone_core::Shutdown;

use crate::error::DispatchError;
use crate::executor::{RemoteExecutor, Transfer};
use crate::outcome::{CommandOutcome, DispatchResult};

#[derive(Clone)]
pub struct Dispatcher {
    executor: Arc<dyn RemoteExecutor>,
    /// Cap on hosts worked concurrently. `None` is one task per host.
    max_concurrency: Option<usize>,
}

impl Dispatcher {
    pub fn new(executor: Arc<dyn RemoteExecutor>) -> Self {
        Self {
            executor,
            max_concurrency: None,
        }
    }

    pub fn with_max_concurrency(mut self, limit: Option<usize>) -> Self {
        self.max_concurrency = limit;
        self
    }

    /// Run `command` on every host.
    pub async fn dispatch(
        &self,
        command: &str,
        hosts: &[String],
        shutdown: &Shutdown,
    ) -> Result<DispatchResult, DispatchError> {
        info!(hosts = hosts.len(), %command, "dispatching command");
        let command: Arc<str> = Arc::from(command);
        self.fan_out(hosts, shutdown, move |exec, host| {
            let command = command.clone();
            async move { exec.run(&host, &command, None).await }
        })
        .await
    }

    /// Copy one local file to `remote` on every host.
    pub async fn push_file(
        &self,
        local: &Path,
        remote: &str,
        hosts: &[String],
        shutdown: &Shutdown,
    ) -> Result<DispatchResult, DispatchError> {
        self.transfer(local, remote, Transfer::Copy, hosts, shutdown).await
    }

    /// Mirror a local directory onto `remote` on every host.
    pub async fn mirror_dir(
        &self,
        local: &Path,
        remote: &str,
        hosts: &[String],
        shutdown: &Shutdown,
    ) -> Result<DispatchResult, DispatchError> {
        self.transfer(local, remote, Transfer::Mirror, hosts, shutdown).await
    }

    /// Stream a local file as stdin to `command` on every host.
    ///
    /// The file is read once up front; a missing file fails before any
    /// host is contacted.
    pub async fn pipe_file(
        &self,
        local: &Path,
        command: &str,
        hosts: &[String],
        shutdown: &Shutdown,
    ) -> Result<DispatchResult, DispatchError> {
        let bytes = tokio::fs::read(local)
            .await
            .map_err(|source| DispatchError::LocalFile {
                path: local.display().to_string(),
                source,
            })?;
        let bytes: Arc<[u8]> = Arc::from(bytes);
        info!(hosts = hosts.len(), %command, local = %local.display(), "piping file");
        let command: Arc<str> = Arc::from(command);
        self.fan_out(hosts, shutdown, move |exec, host| {
            let command = command.clone();
            let bytes = bytes.clone();
            async move { exec.run(&host, &command, Some(bytes)).await }
        })
        .await
    }

    async fn transfer(
        &self,
        local: &Path,
        remote: &str,
        mode: Transfer,
        hosts: &[String],
        shutdown: &Shutdown,
    ) -> Result<DispatchResult, DispatchError> {
        if !local.exists() {
            return Err(DispatchError::LocalFile {
                path: local.display().to_string(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }
        info!(hosts = hosts.len(), local = %local.display(), %remote, ?mode, "pushing");
        let local: Arc<Path> = Arc::from(local);
        let remote: Arc<str> = Arc::from(remote);
        self.fan_out(hosts, shutdown, move |exec, host| {
            let local = local.clone();
            let remote = remote.clone();
            async move { exec.transfer(&host, &local, &remote, mode).await }
        })
        .await
    }

    /// Spawn `op` once per host and collect every outcome.
    ///
    /// Each task owns exactly one result slot, indexed by host position,
    /// so completion order never affects the result.
    async fn fan_out<F, Fut>(
        &self,
        hosts: &[String],
        shutdown: &Shutdown,
        op: F,
    ) -> Result<DispatchResult, DispatchError>
    where
        F: Fn(Arc<dyn RemoteExecutor>, String) -> Fut,
        Fut: Future<Output = CommandOutcome> + Send + 'static,
    {
        if hosts.is_empty() {
            return Err(DispatchError::NoHosts);
        }
        if shutdown.is_cancelled() {
            return Err(DispatchError::Cancelled {
                pending: hosts.len(),
            });
        }

        let limiter = self
            .max_concurrency
            .map(|limit| Arc::new(Semaphore::new(limit.max(1))));
        let mut set = JoinSet::new();
        for (idx, host) in hosts.iter().enumerate() {
            let work = op(self.executor.clone(), host.clone());
            let limiter = limiter.clone();
            set.spawn(async move {
                let _permit = match limiter {
                    Some(sem) => sem.acquire_owned().await.ok(),
                    None => None,
                };
                (idx, work.await)
            });
        }

        let mut slots: Vec<Option<CommandOutcome>> = vec![None; hosts.len()];
        let mut pending = hosts.len();
        loop {
            let joined = tokio::select! {
                joined = set.join_next() => joined,
                _ = shutdown.cancelled() => {
                    // Aborted tasks drop their children, which kills them.
                    set.abort_all();
                    warn!(pending, "dispatch cancelled");
                    return Err(DispatchError::Cancelled { pending });
                }
            };
            let Some(joined) = joined else { break };
            pending -= 1;
            match joined {
                Ok((idx, outcome)) => {
                    if outcome.succeeded() {
                        debug!(host = %outcome.host, "host succeeded");
                    } else {
                        warn!(
                            host = %outcome.host,
                            exit_code = ?outcome.exit_code,
                            error = outcome.error.as_deref().unwrap_or(""),
                            "host failed"
                        );
                    }
                    slots[idx] = Some(outcome);
                }
                Err(e) => error!(error = %e, "dispatch task failed"),
            }
        }

        let outcomes: Vec<CommandOutcome> = slots
            .into_iter()
            .zip(hosts)
            .map(|(slot, host)| {
                slot.unwrap_or_else(|| CommandOutcome::error(host.clone(), "task did not complete"))
            })
            .collect();
        let result = DispatchResult { outcomes };
        info!(
            total = result.total(),
            failed = result.failed().len(),
            "dispatch finished"
        );
        Ok(result)
    }
}
