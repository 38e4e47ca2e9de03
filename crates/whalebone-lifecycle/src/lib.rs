//! whalebone-lifecycle — drives a named cluster through its lifecycle.
//!
//! ```text
//! absent ──launch──▶ launching ──wait_for_state(running)──▶ running
//!                        │                                     │
//!                        └──────────── terminate ──────────────┤
//!                                                              ▼
//!                        absent ◀──record removed── terminated
//! ```
//!
//! # Architecture
//!
//! ```text
//! ClusterLifecycle
//!   ├── ClusterStore          (read membership, write every refresh)
//!   ├── InstanceDirectory     (launch, resolve, terminate)
//!   ├── ReachabilityProber    (ssh rounds until every host answers)
//!   └── Dispatcher            (bootstrap steps and ad-hoc commands)
//! ```
//!
//! Every multi-step operation is fail-fast: the first error aborts and
//! nothing is rolled back. Host failures are collected by the dispatcher
//! and turned into an error here.
//!
//! One `ClusterLifecycle` is the single owner of its cluster's record.
//! Two processes driving the same cluster name at once are not guarded
//! against.

pub mod error;
pub mod lifecycle;
pub mod phase;
pub mod steps;

pub use error::{LifecycleError, LifecycleResult};
pub use lifecycle::{ClusterLifecycle, LifecycleTiming, StateWaitReport};
pub use phase::ClusterPhase;
pub use steps::Step;
