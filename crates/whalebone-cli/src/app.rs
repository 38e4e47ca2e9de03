//! Settings resolution and component wiring.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Args;
use tracing::debug;

use whalebone_cloud::{AwsCliProvider, CloudProvider, InstanceDirectory};
use whalebone_core::config::{CONFIG_FILE_NAME, Timing, default_state_root, expand_home};
use whalebone_core::{LaunchRequest, SshSettings, WhaleboneConfig};
use whalebone_dispatch::{Dispatcher, RemoteExecutor, SshExecutor};
use whalebone_health::{Probe, ReachabilityProber, SshProbe};
use whalebone_lifecycle::{ClusterLifecycle, LifecycleTiming};
use whalebone_state::ClusterStore;

use crate::recipes::Recipes;

/// Command-line values that take precedence over `whalebone.toml`.
#[derive(Debug, Clone, Default, Args)]
pub struct Overrides {
    /// Number of instances to launch.
    #[arg(long)]
    pub cluster_size: Option<u32>,
    /// EC2 keypair the instances are launched with.
    #[arg(long)]
    pub keypair: Option<String>,
    /// AMI id for the nodes.
    #[arg(long)]
    pub image_id: Option<String>,
    #[arg(long)]
    pub instance_type: Option<String>,
    /// SSH private key (.pem) used to reach the nodes.
    #[arg(long)]
    pub credentials: Option<String>,
    /// SSH login name.
    #[arg(long)]
    pub user: Option<String>,
    /// First-boot script passed as user data.
    #[arg(long)]
    pub setup_script: Option<String>,
    /// cassandra.yaml pushed to every node.
    #[arg(long)]
    pub cassandra_config: Option<String>,
    /// cassandra-env.sh pushed to every node.
    #[arg(long)]
    pub cassandra_env: Option<String>,
    #[arg(long)]
    pub cassandra_version: Option<String>,
    /// whalebone-client binary to install on the nodes
    /// (default: next to this executable).
    #[arg(long)]
    pub client_binary: Option<PathBuf>,
    /// Where cluster records live (default: ~/.whalebone).
    #[arg(long)]
    pub state_dir: Option<PathBuf>,
    /// Config file (default: <state-dir>/whalebone.toml).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Overrides {
    pub fn apply(&self, config: &mut WhaleboneConfig) {
        fn set<T: Clone>(slot: &mut T, value: &Option<T>) {
            if let Some(v) = value {
                *slot = v.clone();
            }
        }
        set(&mut config.cluster.size, &self.cluster_size);
        set(&mut config.cluster.keypair, &self.keypair);
        set(&mut config.cluster.image_id, &self.image_id);
        set(&mut config.cluster.instance_type, &self.instance_type);
        set(&mut config.cluster.setup_script, &self.setup_script);
        set(&mut config.ssh.credentials, &self.credentials);
        set(&mut config.ssh.user, &self.user);
        set(&mut config.cassandra.config, &self.cassandra_config);
        set(&mut config.cassandra.env, &self.cassandra_env);
        set(&mut config.cassandra.version, &self.cassandra_version);
    }
}

/// Resolved settings for one invocation.
#[derive(Debug, Clone)]
pub struct App {
    pub config: WhaleboneConfig,
    pub timing: Timing,
    pub ssh: SshSettings,
    pub state_root: PathBuf,
    pub client_binary: PathBuf,
}

impl App {
    /// Config file, then flags.
    pub fn load(overrides: &Overrides) -> anyhow::Result<Self> {
        let state_root = overrides
            .state_dir
            .clone()
            .unwrap_or_else(default_state_root);
        let config_path = overrides
            .config
            .clone()
            .unwrap_or_else(|| state_root.join(CONFIG_FILE_NAME));
        let mut config = WhaleboneConfig::load_or_default(&config_path)?;
        overrides.apply(&mut config);

        let client_binary = match &overrides.client_binary {
            Some(path) => path.clone(),
            None => std::env::current_exe()
                .context("locating the whalebone executable")?
                .with_file_name("whalebone-client"),
        };
        Self::from_config(config, state_root, client_binary)
    }

    pub fn from_config(
        config: WhaleboneConfig,
        state_root: PathBuf,
        client_binary: PathBuf,
    ) -> anyhow::Result<Self> {
        if config.cluster.size == 0 {
            bail!("cluster size must be at least 1");
        }
        let timing = config.timing.parse()?;
        let ssh = config.ssh_settings()?;
        debug!(state_root = %state_root.display(), user = %ssh.user, "settings resolved");
        Ok(Self {
            config,
            timing,
            ssh,
            state_root,
            client_binary,
        })
    }

    pub fn store(&self) -> anyhow::Result<ClusterStore> {
        ClusterStore::open(&self.state_root)
            .with_context(|| format!("opening state root {}", self.state_root.display()))
    }

    pub fn recipes(&self) -> Recipes {
        Recipes {
            user: self.ssh.user.clone(),
            cassandra_version: self.config.cassandra.version.clone(),
            cassandra_config: expand_home(&self.config.cassandra.config),
            cassandra_env: expand_home(&self.config.cassandra.env),
            client_binary: self.client_binary.clone(),
        }
    }

    /// A controller backed by the `aws` CLI and the local ssh tools.
    pub fn lifecycle(&self, cluster: &str) -> anyhow::Result<ClusterLifecycle> {
        let provider: Arc<dyn CloudProvider> = Arc::new(AwsCliProvider::new(
            self.config.cloud.aws_binary.clone(),
            self.config.cloud.region.clone(),
        ));
        self.lifecycle_with(
            cluster,
            provider,
            Arc::new(SshProbe::new(self.ssh.clone())),
            Arc::new(SshExecutor::new(self.ssh.clone())),
        )
    }

    pub fn lifecycle_with(
        &self,
        cluster: &str,
        provider: Arc<dyn CloudProvider>,
        probe: Arc<dyn Probe>,
        executor: Arc<dyn RemoteExecutor>,
    ) -> anyhow::Result<ClusterLifecycle> {
        let directory = InstanceDirectory::new(provider)
            .with_retry_interval(self.timing.resolve_retry_interval)
            .with_timeout(self.timing.resolve_timeout);
        let dispatcher =
            Dispatcher::new(executor).with_max_concurrency(self.config.dispatch.max_concurrency);
        let lifecycle = ClusterLifecycle::open(
            cluster,
            self.store()?,
            directory,
            ReachabilityProber::new(probe),
            dispatcher,
        )?;
        Ok(lifecycle.with_timing(LifecycleTiming::from(&self.timing)))
    }

    /// What `launch` asks the provider for. Reads the setup script.
    pub fn launch_request(&self) -> anyhow::Result<LaunchRequest> {
        let cluster = &self.config.cluster;
        let script = expand_home(&cluster.setup_script);
        let user_data = std::fs::read_to_string(&script)
            .with_context(|| format!("reading setup script {}", script.display()))?;
        Ok(LaunchRequest {
            image_id: cluster.image_id.clone(),
            count: cluster.size,
            keypair: cluster.keypair.clone(),
            instance_type: cluster.instance_type.clone(),
            user_data,
        })
    }

    /// Fail before anything is launched if a file the bootstrap pushes
    /// is missing.
    pub fn check_bootstrap_files(&self) -> anyhow::Result<()> {
        let recipes = self.recipes();
        let missing: Vec<String> = [
            recipes.client_binary.as_path(),
            recipes.cassandra_config.as_path(),
            recipes.cassandra_env.as_path(),
        ]
        .into_iter()
        .filter(|p| !p.is_file())
        .map(|p: &Path| p.display().to_string())
        .collect();
        if !missing.is_empty() {
            bail!("missing bootstrap files: {}", missing.join(", "));
        }
        Ok(())
    }
}
