//! whalebone-client — runs on every cluster node.
//!
//! Pushed to `~/bin/whalebone-client` by `whalebone install_client`
//! together with the cluster's host files (`~/boxen.public`,
//! `~/boxen.private`). Two jobs:
//!
//! - **modify-config**: give this node its ring token, the seed list and
//!   its own listen/rpc address in `cassandra.yaml`.
//! - **download-cassandra**: fetch, unpack and link a Cassandra release.

pub mod download;
pub mod error;
pub mod rewrite;

pub use download::DownloadPlan;
pub use error::{RewriteError, RewriteResult};
pub use rewrite::NodeSettings;
