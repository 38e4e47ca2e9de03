pub mod config;
pub mod duration;
pub mod ring;
pub mod shutdown;
pub mod ssh;
pub mod types;

pub use config::WhaleboneConfig;
pub use shutdown::{Shutdown, ShutdownTrigger};
pub use ssh::SshSettings;
pub use types::*;
