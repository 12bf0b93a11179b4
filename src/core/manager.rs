//! # ProcessManager: spawn entry point and event wiring.
//!
//! The [`ProcessManager`] owns the event [`Bus`], a [`SubscriberSet`] and the
//! [`ManagerConfig`]; it shares an [`ExitRegistry`] (the process-wide one by
//! default) with every handle it creates.
//!
//! ## Architecture
//! ```text
//! spawn(spec) ──► ProcessHandle::spawn(spec, registry, bus)
//!                    track() → fork/exec → adopt() → ProcessStarted → on_exit()
//!
//! Event flow:
//!   handles / callbacks ── publish(Event) ──► Bus ──► manager listener ──► SubscriberSet::emit
//!                                                                    ┌─────────┼─────────┐
//!                                                                    ▼         ▼         ▼
//!                                                                [queue S1] [queue S2] [queue SN]
//! ```
//!
//! ## Example
//! ```rust
//! use procvisor::{Command, ManagerConfig, ProcessManager, ProcessSpec};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = ProcessManager::new(ManagerConfig::default());
//!
//!     let result = manager
//!         .run(ProcessSpec::new(Command::argv(["echo", "hello"])))
//!         .await?;
//!
//!     assert_eq!(result.exit_code(), 0);
//!     assert_eq!(result.stdout()?, b"hello\n");
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{ExitRegistry, ManagerBuilder, ManagerConfig};
use crate::error::ProcessError;
use crate::events::{Bus, Event};
use crate::process::{Captures, ProcessHandle, ProcessResult, ProcessSpec};
use crate::subscribers::SubscriberSet;

/// Spawns children and fans their lifecycle events out to subscribers.
pub struct ProcessManager {
    cfg: ManagerConfig,
    bus: Bus,
    registry: Arc<ExitRegistry>,
    subs: Arc<SubscriberSet>,
    listener: CancellationToken,
}

impl ProcessManager {
    /// Returns a builder for fine-grained construction.
    pub fn builder(cfg: ManagerConfig) -> ManagerBuilder {
        ManagerBuilder::new(cfg)
    }

    /// Manager with no subscribers and the global registry.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(cfg: ManagerConfig) -> Arc<Self> {
        ManagerBuilder::new(cfg).build()
    }

    pub(super) fn new_internal(
        cfg: ManagerConfig,
        bus: Bus,
        registry: Arc<ExitRegistry>,
        subs: Arc<SubscriberSet>,
    ) -> Self {
        let listener = CancellationToken::new();
        if !subs.is_empty() {
            subscriber_listener(bus.subscribe(), Arc::clone(&subs), listener.clone());
        }
        Self {
            cfg,
            bus,
            registry,
            subs,
            listener,
        }
    }

    /// Spawns `spec` with in-memory capture buffers.
    pub fn spawn(&self, spec: ProcessSpec) -> Result<ProcessHandle, ProcessError> {
        self.spawn_with(spec, Captures::default())
    }

    /// Spawns `spec`, capturing into caller-supplied buffers.
    pub fn spawn_with(
        &self,
        spec: ProcessSpec,
        captures: Captures,
    ) -> Result<ProcessHandle, ProcessError> {
        ProcessHandle::spawn(
            spec,
            captures,
            Arc::clone(&self.registry),
            self.bus.clone(),
            &self.cfg,
        )
    }

    /// Spawns `spec` and waits for its result.
    pub async fn run(&self, spec: ProcessSpec) -> Result<ProcessResult, ProcessError> {
        self.spawn(spec)?.wait().await
    }

    #[inline]
    pub fn config(&self) -> &ManagerConfig {
        &self.cfg
    }

    /// The event bus shared with all handles.
    #[inline]
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// A raw receiver observing subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    #[inline]
    pub fn registry(&self) -> &Arc<ExitRegistry> {
        &self.registry
    }

    /// Number of attached subscribers.
    pub fn subscribers(&self) -> usize {
        self.subs.len()
    }
}

impl Drop for ProcessManager {
    fn drop(&mut self) {
        self.listener.cancel();
    }
}

/// Forwards bus events to the subscriber set until cancelled or the bus closes.
fn subscriber_listener(
    mut rx: broadcast::Receiver<Event>,
    set: Arc<SubscriberSet>,
    stop: CancellationToken,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                msg = rx.recv() => match msg {
                    Ok(ev) => set.emit(&ev),
                    Err(RecvError::Lagged(n)) => {
                        warn!(skipped = n, "subscriber listener lagged behind the bus");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
    });
}
