//! whalebone-client — node-side helper pushed by `whalebone install_client`.
//!
//! ```text
//! whalebone-client modify-config
//! whalebone-client download-cassandra --version 0.7.0-rc2
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use whalebone_client::download::{DEFAULT_MIRROR, DEFAULT_VERSION};
use whalebone_client::rewrite::{
    self, DEFAULT_CONFIG_PATH, DEFAULT_MEMBERS_PATH, NodeSettings,
};
use whalebone_client::DownloadPlan;
use whalebone_core::config::expand_home;

#[derive(Parser)]
#[command(name = "whalebone-client", about = "Whalebone on-node helper")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Set this node's token, seeds and addresses in cassandra.yaml.
    ModifyConfig {
        /// Private host list, one name per line.
        #[arg(long, default_value = DEFAULT_MEMBERS_PATH)]
        members: String,

        /// Cassandra config file to rewrite.
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// This node's name; defaults to `hostname -f`.
        #[arg(long)]
        hostname: Option<String>,
    },

    /// Download and install a Cassandra release.
    DownloadCassandra {
        #[arg(long, default_value = DEFAULT_VERSION)]
        version: String,

        #[arg(long, default_value = DEFAULT_MIRROR)]
        mirror: String,

        /// Owner of the installed trees.
        #[arg(long, default_value = "ubuntu")]
        owner: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::ModifyConfig {
            members,
            config,
            hostname,
        } => {
            let members_path = expand_home(&members);
            let nodes = rewrite::read_members(&members_path)?;
            let host = match hostname {
                Some(h) => h,
                None => rewrite::local_hostname().await?,
            };
            info!(%host, nodes = nodes.len(), "rewriting node config");
            let settings = NodeSettings::for_node(&nodes, &host)
                .with_context(|| format!("reading {}", members_path.display()))?;
            rewrite::rewrite_file(&config, &settings)?;
        }
        Command::DownloadCassandra {
            version,
            mirror,
            owner,
        } => {
            DownloadPlan::new(version)
                .with_mirror(mirror)
                .with_owner(owner)
                .run()
                .await?;
        }
    }

    Ok(())
}
