//! Membership listing and whole-cluster lifecycle commands.

use std::io::Write;

use tracing::{info, warn};

use whalebone_core::Shutdown;
use whalebone_lifecycle::ClusterLifecycle;

use crate::app::App;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Listing {
    /// `id public private`
    Full,
    Public,
    Private,
}

/// Print the current membership, refreshed from the provider. An absent
/// cluster prints nothing.
pub async fn list(
    lifecycle: &ClusterLifecycle,
    listing: Listing,
    shutdown: &Shutdown,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    if lifecycle.record()?.is_empty() {
        return Ok(());
    }
    for i in lifecycle.instances(shutdown).await? {
        match listing {
            Listing::Full => writeln!(out, "{} {} {}", i.id, i.public_dns, i.private_dns)?,
            Listing::Public => writeln!(out, "{}", i.public_dns)?,
            Listing::Private => writeln!(out, "{}", i.private_dns)?,
        }
    }
    Ok(())
}

/// Terminate whatever is there, launch a fresh set and bootstrap it.
pub async fn launch(
    app: &App,
    lifecycle: &mut ClusterLifecycle,
    shutdown: &Shutdown,
) -> anyhow::Result<()> {
    app.check_bootstrap_files()?;
    let request = app.launch_request()?;

    let cluster = lifecycle.cluster().to_string();
    let public = lifecycle.store().public_names_path(&cluster)?;
    let private = lifecycle.store().private_names_path(&cluster)?;
    let steps = app.recipes().bootstrap(&public, &private);

    let report = lifecycle.launch(&request, &steps, shutdown).await?;
    if !report.reclaimed.is_empty() {
        warn!(
            %cluster,
            reclaimed = report.reclaimed.len(),
            "some instances were terminated by the provider during launch"
        );
    }
    info!(%cluster, nodes = report.reached.len(), "cluster is up");
    Ok(())
}
