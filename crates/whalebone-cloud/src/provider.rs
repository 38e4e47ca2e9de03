//! The provider seam.

use async_trait::async_trait;

use whalebone_core::{Instance, InstanceId, LaunchRequest};

use crate::error::CloudResult;

/// Raw cloud API calls, one attempt each. Retrying is the directory's job.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Look up the current record of each id.
    ///
    /// May return fewer instances than requested, in any order. API
    /// failures that might clear up on their own are `CloudError::Transient`.
    async fn describe_instances(&self, ids: &[InstanceId]) -> CloudResult<Vec<Instance>>;

    /// Start `request.count` instances. Rejections are `CloudError::Launch`.
    async fn run_instances(&self, request: &LaunchRequest) -> CloudResult<Vec<Instance>>;

    /// Ask for termination. Returns once the request is accepted.
    async fn terminate_instances(&self, ids: &[InstanceId]) -> CloudResult<()>;
}
