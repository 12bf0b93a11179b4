//! Lifecycle events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish "process started" / "process finished" notifications (plus signal
//! and escalation notices) to third parties.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `ProcessHandle` (spawn, signal, completion callback),
//!   `timeout::terminate`, `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: `ProcessManager`'s listener (fans out to `SubscriberSet`),
//!   and any receiver obtained from [`Bus::subscribe`].

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
