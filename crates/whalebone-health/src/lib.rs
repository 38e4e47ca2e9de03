//! whalebone-health — SSH reachability for cluster hosts.
//!
//! # Architecture
//!
//! ```text
//! ReachabilityProber
//!   ├── Arc<dyn Probe>           one check against one host
//!   │   └── SshProbe             `ssh <host> 'exit 0'`
//!   └── probe_round(hosts)       every host in parallel, one probe each
//!
//! ReachabilityTracker            hosts still waiting, attempts per host
//! ```
//!
//! A host that does not answer is not an error, it simply stays pending.
//! Deciding how long to keep waiting is up to the caller.

pub mod checker;
pub mod prober;

pub use checker::{Probe, ProbeResult, SshProbe};
pub use prober::{ReachabilityProber, ReachabilityTracker};
