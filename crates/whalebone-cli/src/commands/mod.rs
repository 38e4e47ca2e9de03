//! Command routing. One arm per [`ClusterCommand`].

pub mod cluster;
pub mod remote;

use std::io::Write;
use std::path::Path;

use anyhow::Context;

use whalebone_core::{InstanceState, Shutdown};
use whalebone_lifecycle::ClusterLifecycle;

use crate::app::App;
use crate::command::ClusterCommand;
use crate::recipes::{self, Recipes};

use self::cluster::Listing;

pub async fn execute(
    app: &App,
    lifecycle: &mut ClusterLifecycle,
    command: ClusterCommand,
    extra: Option<&str>,
    shutdown: &Shutdown,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let recipes = app.recipes();
    let extra = || {
        extra.with_context(|| format!("{} requires an extra argument", command.name()))
    };

    match command {
        // ── Membership ─────────────────────────────────────────────
        ClusterCommand::List => cluster::list(lifecycle, Listing::Full, shutdown, out).await,
        ClusterCommand::ListPublicDns => {
            cluster::list(lifecycle, Listing::Public, shutdown, out).await
        }
        ClusterCommand::ListPrivateDns => {
            cluster::list(lifecycle, Listing::Private, shutdown, out).await
        }

        // ── Lifecycle ──────────────────────────────────────────────
        ClusterCommand::Launch => cluster::launch(app, lifecycle, shutdown).await,
        ClusterCommand::WaitForLaunch => {
            lifecycle
                .wait_for_launch(&recipes.setup_barrier(), shutdown)
                .await?;
            Ok(())
        }
        ClusterCommand::Terminate => {
            lifecycle.terminate(shutdown).await?;
            Ok(())
        }
        ClusterCommand::WaitForTerminate => {
            lifecycle
                .wait_for_state(InstanceState::Terminated, shutdown)
                .await?;
            Ok(())
        }
        ClusterCommand::WaitForSsh => Ok(lifecycle.wait_for_reachability(shutdown).await?),

        // ── Single remote commands ─────────────────────────────────
        ClusterCommand::Run => remote::run(lifecycle, extra()?, shutdown, out).await,
        ClusterCommand::Ring => remote::run(lifecycle, recipes::RING, shutdown, out).await,
        ClusterCommand::Stress => {
            remote::run(lifecycle, &recipes.stress(extra()?), shutdown, out).await
        }
        ClusterCommand::Stop => remote::run(lifecycle, recipes::STOP, shutdown, out).await,
        ClusterCommand::Cleardata => {
            remote::run(lifecycle, recipes::CLEARDATA, shutdown, out).await
        }
        ClusterCommand::FullUpgrade => {
            remote::run(lifecycle, recipes::FULL_UPGRADE, shutdown, out).await
        }
        ClusterCommand::Reboot => remote::run(lifecycle, recipes::REBOOT, shutdown, out).await,
        ClusterCommand::ImportSchema => {
            remote::run_first(lifecycle, recipes::IMPORT_SCHEMA, shutdown, out).await
        }

        // ── Step sequences ─────────────────────────────────────────
        ClusterCommand::Start => remote::steps(lifecycle, &recipes.start(), shutdown).await,
        ClusterCommand::Mkdirs => remote::steps(lifecycle, &recipes.mkdirs(), shutdown).await,
        ClusterCommand::BuildRaid => {
            remote::steps(lifecycle, &recipes.build_raid(), shutdown).await
        }
        ClusterCommand::InstallClient => {
            let steps = install_client(&recipes, lifecycle)?;
            remote::steps(lifecycle, &steps, shutdown).await
        }
        ClusterCommand::DownloadCassandra => {
            remote::steps(lifecycle, &recipes.download_cassandra(), shutdown).await
        }
        ClusterCommand::PushConfig => {
            remote::steps(lifecycle, &recipes.push_config(), shutdown).await
        }
        ClusterCommand::PushClientConfig => {
            let steps = push_client_config(&recipes, lifecycle, extra()?)?;
            remote::steps(lifecycle, &steps, shutdown).await
        }
        ClusterCommand::PushLocalCassandra => {
            let steps = recipes.push_local_cassandra(Path::new(extra()?));
            remote::steps(lifecycle, &steps, shutdown).await
        }
        ClusterCommand::PushPubKey => {
            let steps = recipes.push_pub_key(Path::new(extra()?));
            remote::steps(lifecycle, &steps, shutdown).await
        }
    }
}

fn install_client(
    recipes: &Recipes,
    lifecycle: &ClusterLifecycle,
) -> anyhow::Result<Vec<whalebone_lifecycle::Step>> {
    let store = lifecycle.store();
    let cluster = lifecycle.cluster();
    Ok(recipes.install_client(
        &store.public_names_path(cluster)?,
        &store.private_names_path(cluster)?,
    ))
}

/// Ship `remote`'s host files, which must describe a launched cluster.
fn push_client_config(
    recipes: &Recipes,
    lifecycle: &ClusterLifecycle,
    remote: &str,
) -> anyhow::Result<Vec<whalebone_lifecycle::Step>> {
    let store = lifecycle.store();
    store
        .load_required(remote)
        .with_context(|| format!("remote cluster {remote}"))?;
    Ok(recipes.push_client_config(
        &store.public_names_path(remote)?,
        &store.private_names_path(remote)?,
    ))
}
