//! Runtime core: exit dispatch and the spawn entry point.
//!
//! - [`registry`]: SIGCHLD multiplexing and the pending/unclaimed exit tables;
//! - [`manager`]: spawns handles and wires events to subscribers;
//! - [`builder`]: assembles a manager;
//! - [`config`]: shared settings.

mod builder;
mod config;
mod manager;
mod registry;

pub use builder::ManagerBuilder;
pub use config::ManagerConfig;
pub use manager::ProcessManager;
pub use registry::{ExitCallback, ExitRegistry};
