//! whalebone-state — on-disk cluster membership for Whalebone.
//!
//! Each cluster owns a directory under the state root:
//!
//! ```text
//! ~/.whalebone/<cluster>/
//!   ├── cluster.json    ordered Vec<Instance> (source of truth)
//!   ├── boxen.public    one public name per line, record order
//!   └── boxen.private   one private name per line, record order
//! ```
//!
//! The host files exist for remote tooling and bootstrap scripts that
//! want plain lists of peers. They are derived from the record on every
//! save, and `load` rewrites any that no longer match it.
//!
//! Every artifact is replaced by writing a temporary file in the same
//! directory and renaming it over the old one. `cluster.json` is
//! written first; once it lands the save has happened.
//!
//! No cross-process locking is done. Running two commands against the
//! same cluster name at once is the caller's problem.

pub mod error;
pub mod store;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::ClusterStore;
pub use types::ClusterRecord;
