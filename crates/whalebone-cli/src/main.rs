//! whalebone — launch and drive Cassandra clusters on EC2.
//!
//! ```text
//! whalebone [OPTIONS] <CLUSTER_NAME> <COMMAND> [EXTRA_ARG]
//!
//! whalebone --cluster-size 4 prod launch
//! whalebone prod run 'df -h /mnt'
//! whalebone loadgen push_client_config prod
//! whalebone prod terminate
//! ```
//!
//! Cluster records live under `~/.whalebone/<cluster>/`; settings come
//! from `~/.whalebone/whalebone.toml` and are overridden by flags.

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use tracing::warn;

use whalebone_core::Shutdown;

mod app;
mod command;
mod commands;
mod recipes;

use crate::app::{App, Overrides};
use crate::command::ClusterCommand;

#[derive(Parser)]
#[command(
    name = "whalebone",
    about = "Launch, bootstrap and tear down Cassandra clusters on EC2",
    version
)]
struct Cli {
    #[command(flatten)]
    overrides: Overrides,

    /// Name of the cluster to act on.
    cluster_name: String,

    #[arg(value_enum)]
    command: ClusterCommand,

    /// Required by run, stress, push_client_config, push_local_cassandra
    /// and push_pub_key; rejected otherwise.
    #[arg(allow_hyphen_values = true)]
    extra_arg: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(message) = cli.command.check_extra(cli.extra_arg.as_deref()) {
        Cli::command()
            .error(ErrorKind::WrongNumberOfValues, message)
            .exit();
    }

    let app = App::load(&cli.overrides)?;
    let mut lifecycle = app.lifecycle(&cli.cluster_name)?;

    let (trigger, shutdown) = Shutdown::new();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping outstanding work");
            trigger.fire();
        }
    });

    commands::execute(
        &app,
        &mut lifecycle,
        cli.command,
        cli.extra_arg.as_deref(),
        &shutdown,
        &mut std::io::stdout(),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_positionals_and_flags() {
        let cli = Cli::try_parse_from([
            "whalebone",
            "--cluster-size",
            "4",
            "--user",
            "admin",
            "prod",
            "run",
            "uptime",
        ])
        .unwrap();
        assert_eq!(cli.cluster_name, "prod");
        assert_eq!(cli.command, ClusterCommand::Run);
        assert_eq!(cli.extra_arg.as_deref(), Some("uptime"));
        assert_eq!(cli.overrides.cluster_size, Some(4));
        assert_eq!(cli.overrides.user.as_deref(), Some("admin"));
    }

    #[test]
    fn unknown_command_is_rejected_at_parse_time() {
        let err = Cli::try_parse_from(["whalebone", "prod", "explode"])
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidValue);
    }

    #[test]
    fn snake_case_names_parse() {
        let cli = Cli::try_parse_from(["whalebone", "prod", "wait_for_terminate"]).unwrap();
        assert_eq!(cli.command, ClusterCommand::WaitForTerminate);
        assert!(cli.command.check_extra(cli.extra_arg.as_deref()).is_ok());
    }

    #[test]
    fn extra_arg_may_start_with_a_dash() {
        let cli = Cli::try_parse_from(["whalebone", "prod", "stress", "-n 1000"]).unwrap();
        assert_eq!(cli.extra_arg.as_deref(), Some("-n 1000"));
    }

    #[test]
    fn missing_cluster_name_is_an_error() {
        assert!(Cli::try_parse_from(["whalebone"]).is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
