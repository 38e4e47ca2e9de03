//! whalebone-dispatch — run one thing on every cluster host at once.
//!
//! # Architecture
//!
//! ```text
//! Dispatcher
//!   ├── Arc<dyn RemoteExecutor>   one operation against one host
//!   │   └── SshExecutor           ssh / scp / rsync child processes
//!   ├── JoinSet (+ optional Semaphore)   one task per host
//!   └── DispatchResult            outcome slot per host, host order
//! ```
//!
//! A failing host never cancels the others. Every outcome is collected
//! before the call returns, and the caller decides whether aggregate
//! failure is fatal (`DispatchResult::into_result`).

pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod outcome;

pub use dispatcher::Dispatcher;
pub use error::DispatchError;
pub use executor::{RemoteExecutor, SshExecutor, Transfer};
pub use outcome::{CommandOutcome, DispatchResult};
