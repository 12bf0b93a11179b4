//! # Built-in subscribers
//!
//! - [`LiveSet`]: pids of started-but-not-finished children.
//! - [`LogWriter`]: renders events through `tracing` (feature `logging`).

mod live;
#[cfg(feature = "logging")]
mod log;

pub use live::LiveSet;
#[cfg(feature = "logging")]
pub use log::LogWriter;
