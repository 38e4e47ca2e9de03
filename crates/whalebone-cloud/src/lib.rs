//! whalebone-cloud — resolves cluster members against the cloud provider.
//!
//! # Architecture
//!
//! ```text
//! InstanceDirectory
//!   ├── Arc<dyn CloudProvider>  (injected, never global)
//!   │   ├── AwsCliProvider      drives `aws ec2 ...`
//!   │   └── InMemoryCloud       deterministic simulator for tests
//!   ├── resolve()    whole-query retry until every id is answered
//!   ├── launch()     single attempt, rejection is fatal
//!   └── terminate()  fire-and-forget request
//! ```
//!
//! Providers are eventually consistent: a describe right after a launch
//! may omit fresh ids or fail outright. `resolve` absorbs both, logging
//! each miss and sleeping a fixed interval between attempts.

pub mod aws;
pub mod directory;
pub mod error;
pub mod memory;
pub mod provider;

pub use aws::AwsCliProvider;
pub use directory::InstanceDirectory;
pub use error::{CloudError, CloudResult};
pub use memory::{DescribeFault, InMemoryCloud};
pub use provider::CloudProvider;
