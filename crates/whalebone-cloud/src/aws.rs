//! Provider backed by the `aws` command line tool.
//!
//! Speaks to EC2 through `aws ec2 <subcommand> --output json` rather than
//! carrying an SDK; the CLI owns credentials, regions and request signing.

use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use whalebone_core::{Instance, InstanceId, InstanceState, LaunchRequest};

use crate::error::{CloudError, CloudResult};
use crate::provider::CloudProvider;

#[derive(Debug, Clone)]
pub struct AwsCliProvider {
    binary: String,
    region: Option<String>,
}

/// Outcome of one CLI invocation that managed to start.
enum CliOutput {
    Success(Vec<u8>),
    Failure { code: i32, stderr: String },
}

impl AwsCliProvider {
    pub fn new(binary: impl Into<String>, region: Option<String>) -> Self {
        Self {
            binary: binary.into(),
            region,
        }
    }

    fn ec2(&self, subcommand: &str) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("ec2").arg(subcommand).arg("--output").arg("json");
        if let Some(region) = &self.region {
            cmd.arg("--region").arg(region);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn exec(&self, mut cmd: Command) -> CloudResult<CliOutput> {
        debug!(?cmd, "running aws cli");
        let output = cmd.output().await.map_err(|e| {
            CloudError::Provider(format!("failed to execute {}: {e}", self.binary))
        })?;
        if output.status.success() {
            Ok(CliOutput::Success(output.stdout))
        } else {
            Ok(CliOutput::Failure {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl CloudProvider for AwsCliProvider {
    async fn describe_instances(&self, ids: &[InstanceId]) -> CloudResult<Vec<Instance>> {
        let mut cmd = self.ec2("describe-instances");
        cmd.arg("--instance-ids").args(ids);
        match self.exec(cmd).await? {
            CliOutput::Success(stdout) => parse_describe(&stdout),
            // Fresh ids are routinely unknown for a few seconds after launch.
            CliOutput::Failure { code, stderr } => Err(CloudError::Transient(format!(
                "describe-instances exited with {code}: {stderr}"
            ))),
        }
    }

    async fn run_instances(&self, request: &LaunchRequest) -> CloudResult<Vec<Instance>> {
        let mut cmd = self.ec2("run-instances");
        cmd.arg("--image-id")
            .arg(&request.image_id)
            .arg("--count")
            .arg(request.count.to_string())
            .arg("--key-name")
            .arg(&request.keypair)
            .arg("--instance-type")
            .arg(&request.instance_type);
        if !request.user_data.is_empty() {
            cmd.arg("--user-data").arg(&request.user_data);
        }
        match self.exec(cmd).await? {
            CliOutput::Success(stdout) => parse_run(&stdout),
            CliOutput::Failure { code, stderr } => Err(CloudError::Launch(format!(
                "run-instances exited with {code}: {stderr}"
            ))),
        }
    }

    async fn terminate_instances(&self, ids: &[InstanceId]) -> CloudResult<()> {
        let mut cmd = self.ec2("terminate-instances");
        cmd.arg("--instance-ids").args(ids);
        match self.exec(cmd).await? {
            CliOutput::Success(_) => Ok(()),
            CliOutput::Failure { code, stderr } => Err(CloudError::Terminate(format!(
                "terminate-instances exited with {code}: {stderr}"
            ))),
        }
    }
}

// ── Wire shapes ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeOutput {
    #[serde(default)]
    reservations: Vec<Reservation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Reservation {
    #[serde(default)]
    instances: Vec<AwsInstance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RunOutput {
    #[serde(default)]
    instances: Vec<AwsInstance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AwsInstance {
    instance_id: String,
    state: AwsState,
    #[serde(default)]
    public_dns_name: Option<String>,
    #[serde(default)]
    private_dns_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AwsState {
    name: String,
}

impl From<AwsInstance> for Instance {
    fn from(raw: AwsInstance) -> Self {
        Instance {
            id: raw.instance_id,
            state: InstanceState::from_provider(&raw.state.name),
            public_dns: raw.public_dns_name.unwrap_or_default(),
            private_dns: raw.private_dns_name.unwrap_or_default(),
        }
    }
}

fn parse_describe(stdout: &[u8]) -> CloudResult<Vec<Instance>> {
    let parsed: DescribeOutput = serde_json::from_slice(stdout)
        .map_err(|e| CloudError::Provider(format!("unparseable describe-instances output: {e}")))?;
    Ok(parsed
        .reservations
        .into_iter()
        .flat_map(|r| r.instances)
        .map(Instance::from)
        .collect())
}

fn parse_run(stdout: &[u8]) -> CloudResult<Vec<Instance>> {
    let parsed: RunOutput = serde_json::from_slice(stdout)
        .map_err(|e| CloudError::Provider(format!("unparseable run-instances output: {e}")))?;
    Ok(parsed.instances.into_iter().map(Instance::from).collect())
}
