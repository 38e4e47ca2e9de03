//! Instance directory — provider lookups with transient-error tolerance.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use whalebone_core::{Instance, InstanceId, LaunchRequest, Shutdown};

use crate::error::{CloudError, CloudResult};
use crate::provider::CloudProvider;

/// Resolves instance ids to current records through a [`CloudProvider`].
#[derive(Clone)]
pub struct InstanceDirectory {
    provider: Arc<dyn CloudProvider>,
    /// Sleep between resolve attempts.
    retry_interval: Duration,
    /// Upper bound on a single resolve. `None` retries until cancelled.
    timeout: Option<Duration>,
}

impl InstanceDirectory {
    pub fn new(provider: Arc<dyn CloudProvider>) -> Self {
        Self {
            provider,
            retry_interval: Duration::from_millis(500),
            timeout: None,
        }
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Return exactly one current record per id, in the order of `ids`.
    ///
    /// The whole query is repeated while the provider errors transiently
    /// or answers for fewer ids than requested.
    pub async fn resolve(
        &self,
        ids: &[InstanceId],
        shutdown: &Shutdown,
    ) -> CloudResult<Vec<Instance>> {
        self.resolve_until(ids, None, shutdown).await
    }

    /// Like [`resolve`](Self::resolve), but gives up at `deadline` even
    /// when the directory itself has no timeout. The earlier of the two
    /// bounds wins. At least one query is always made.
    pub async fn resolve_until(
        &self,
        ids: &[InstanceId],
        deadline: Option<Instant>,
        shutdown: &Shutdown,
    ) -> CloudResult<Vec<Instance>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let started = Instant::now();
        let deadline = match (self.timeout.map(|t| started + t), deadline) {
            (Some(own), Some(caller)) => Some(own.min(caller)),
            (own, caller) => own.or(caller),
        };
        let mut attempt: u32 = 0;
        loop {
            if shutdown.is_cancelled() {
                return Err(CloudError::Cancelled);
            }
            attempt += 1;

            let answer = tokio::select! {
                answer = self.provider.describe_instances(ids) => answer,
                _ = shutdown.cancelled() => return Err(CloudError::Cancelled),
            };

            let missing = match answer {
                Ok(found) => match align(ids, found) {
                    Ok(instances) => {
                        if attempt > 1 {
                            debug!(attempt, count = instances.len(), "resolve converged");
                        }
                        return Ok(instances);
                    }
                    Err(missing) => {
                        info!(
                            attempt,
                            requested = ids.len(),
                            missing,
                            "provider answer incomplete, retrying"
                        );
                        missing
                    }
                },
                Err(CloudError::Transient(message)) => {
                    warn!(attempt, error = %message, "transient provider error, retrying");
                    ids.len()
                }
                Err(e) => return Err(e),
            };

            let mut pause = self.retry_interval;
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    return Err(CloudError::TimedOut {
                        requested: ids.len(),
                        missing,
                        waited: started.elapsed(),
                    });
                }
                pause = pause.min(deadline - now);
            }

            if !shutdown.sleep(pause).await {
                return Err(CloudError::Cancelled);
            }
        }
    }

    /// Start a new set of instances. Not retried.
    pub async fn launch(&self, request: &LaunchRequest) -> CloudResult<Vec<Instance>> {
        let instances = self
            .provider
            .run_instances(request)
            .await
            .map_err(|e| match e {
                CloudError::Transient(message) => CloudError::Launch(message),
                other => other,
            })?;

        if instances.len() != request.count as usize {
            warn!(
                requested = request.count,
                started = instances.len(),
                "provider started a different number of instances than requested"
            );
        }
        info!(
            count = instances.len(),
            image = %request.image_id,
            instance_type = %request.instance_type,
            "instances launched"
        );
        Ok(instances)
    }

    /// Request termination. Convergence is observed separately.
    pub async fn terminate(&self, ids: &[InstanceId]) -> CloudResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.provider
            .terminate_instances(ids)
            .await
            .map_err(|e| match e {
                CloudError::Transient(message) => CloudError::Terminate(message),
                other => other,
            })?;
        info!(count = ids.len(), "termination requested");
        Ok(())
    }
}

/// Order `found` by `ids`. On a gap, returns how many ids went unanswered.
fn align(ids: &[InstanceId], found: Vec<Instance>) -> Result<Vec<Instance>, usize> {
    let mut by_id: HashMap<InstanceId, Instance> =
        found.into_iter().map(|i| (i.id.clone(), i)).collect();
    let mut aligned = Vec::with_capacity(ids.len());
    let mut missing = 0;
    for id in ids {
        match by_id.remove(id) {
            Some(instance) => aligned.push(instance),
            None => missing += 1,
        }
    }
    if missing == 0 { Ok(aligned) } else { Err(missing) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{DescribeFault, InMemoryCloud};
    use whalebone_core::InstanceState;

    fn request(count: u32) -> LaunchRequest {
        LaunchRequest {
            image_id: "ami-test".to_string(),
            count,
            keypair: "kp".to_string(),
            instance_type: "m1.small".to_string(),
            user_data: String::new(),
        }
    }

    fn directory(cloud: Arc<InMemoryCloud>) -> InstanceDirectory {
        InstanceDirectory::new(cloud).with_retry_interval(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn resolve_retries_until_every_id_is_answered() {
        let cloud = Arc::new(InMemoryCloud::new());
        let dir = directory(cloud.clone());
        let launched = dir.launch(&request(3)).await.unwrap();
        let ids: Vec<_> = launched.iter().map(|i| i.id.clone()).collect();

        // First describe omits one of the three ids.
        cloud.inject_fault(DescribeFault::DropLast);
        let resolved = dir.resolve(&ids, &Shutdown::never()).await.unwrap();

        assert_eq!(resolved.len(), 3);
        assert_eq!(cloud.describe_calls(), 2);
        let resolved_ids: Vec<_> = resolved.iter().map(|i| i.id.clone()).collect();
        assert_eq!(resolved_ids, ids);
    }

    #[tokio::test]
    async fn resolve_swallows_transient_errors() {
        let cloud = Arc::new(InMemoryCloud::new());
        let dir = directory(cloud.clone());
        let ids: Vec<_> = dir
            .launch(&request(2))
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();

        cloud.inject_fault(DescribeFault::Error("RequestLimitExceeded".to_string()));
        cloud.inject_fault(DescribeFault::Error("InvalidInstanceID.NotFound".to_string()));
        let resolved = dir.resolve(&ids, &Shutdown::never()).await.unwrap();

        assert_eq!(resolved.len(), 2);
        assert_eq!(cloud.describe_calls(), 3);
    }

    #[tokio::test]
    async fn resolve_preserves_request_order() {
        let cloud = Arc::new(InMemoryCloud::new());
        let dir = directory(cloud.clone());
        let mut ids: Vec<_> = dir
            .launch(&request(4))
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        ids.reverse();

        let resolved = dir.resolve(&ids, &Shutdown::never()).await.unwrap();
        let resolved_ids: Vec<_> = resolved.into_iter().map(|i| i.id).collect();
        assert_eq!(resolved_ids, ids);
    }

    #[tokio::test]
    async fn resolve_of_nothing_skips_the_provider() {
        let cloud = Arc::new(InMemoryCloud::new());
        let resolved = directory(cloud.clone())
            .resolve(&[], &Shutdown::never())
            .await
            .unwrap();
        assert!(resolved.is_empty());
        assert_eq!(cloud.describe_calls(), 0);
    }

    #[tokio::test]
    async fn resolve_times_out_on_unknown_ids() {
        let cloud = Arc::new(InMemoryCloud::new());
        let dir = directory(cloud).with_timeout(Some(Duration::from_millis(20)));

        let err = dir
            .resolve(&["i-missing".to_string()], &Shutdown::never())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CloudError::TimedOut { requested: 1, missing: 1, .. }
        ));
    }

    #[tokio::test]
    async fn resolve_until_honours_caller_deadline() {
        let cloud = Arc::new(InMemoryCloud::new());
        let dir = directory(cloud.clone());
        let deadline = Instant::now() + Duration::from_millis(20);

        let err = tokio::time::timeout(
            Duration::from_secs(2),
            dir.resolve_until(&["i-missing".to_string()], Some(deadline), &Shutdown::never()),
        )
        .await
        .expect("resolve_until must stop at the deadline")
        .unwrap_err();
        assert!(matches!(err, CloudError::TimedOut { missing: 1, .. }));
        assert!(cloud.describe_calls() >= 1);
    }

    #[tokio::test]
    async fn resolve_until_past_deadline_still_queries_once() {
        let cloud = Arc::new(InMemoryCloud::new());
        let dir = directory(cloud.clone());
        let ids: Vec<_> = dir
            .launch(&request(1))
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();

        let resolved = dir
            .resolve_until(&ids, Some(Instant::now()), &Shutdown::never())
            .await
            .unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(cloud.describe_calls(), 1);
    }

    #[tokio::test]
    async fn resolve_stops_when_cancelled() {
        let cloud = Arc::new(InMemoryCloud::new());
        let dir = directory(cloud);
        let (trigger, shutdown) = Shutdown::new();

        let task = tokio::spawn(async move {
            dir.resolve(&["i-missing".to_string()], &shutdown).await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        trigger.fire();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, CloudError::Cancelled));
    }

    #[tokio::test]
    async fn launch_rejection_is_not_retried() {
        let cloud = Arc::new(InMemoryCloud::new());
        cloud.reject_launches("InsufficientInstanceCapacity");
        let err = directory(cloud.clone()).launch(&request(2)).await.unwrap_err();

        assert!(matches!(err, CloudError::Launch(ref m) if m.contains("Capacity")));
        assert_eq!(cloud.run_calls(), 1);
        assert!(cloud.live_instances().is_empty());
    }

    #[tokio::test]
    async fn terminate_of_nothing_is_noop() {
        let cloud = Arc::new(InMemoryCloud::new());
        directory(cloud.clone()).terminate(&[]).await.unwrap();
        assert_eq!(cloud.terminate_calls(), 0);
    }

    #[tokio::test]
    async fn terminate_moves_instances_toward_terminated() {
        let cloud = Arc::new(InMemoryCloud::new());
        let dir = directory(cloud.clone());
        let ids: Vec<_> = dir
            .launch(&request(1))
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();

        dir.terminate(&ids).await.unwrap();
        let resolved = dir.resolve(&ids, &Shutdown::never()).await.unwrap();
        assert_eq!(resolved[0].state, InstanceState::Terminated);
    }

    #[test]
    fn align_reports_missing_count() {
        let found = vec![Instance::new("a", InstanceState::Running, "", "")];
        let ids = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(align(&ids, found), Err(2));
    }
}
