//! # LiveSet: pids of children that have started and not yet finished
//!
//! Maintains the set by listening to [`EventKind::ProcessStarted`] and
//! [`EventKind::ProcessFinished`].
//!
//! ## Behavior
//! - Duplicate **start** (pid reused before the finish was delivered) → warn.
//! - **Finish** without prior start → warn.
//!
//! The view lags the registry by the subscriber queue; it is meant for
//! dashboards and shutdown reports, not for control flow.

use std::collections::BTreeSet;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use tracing::warn;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Tracks the pids of live children as seen through the event stream.
pub struct LiveSet {
    inner: RwLock<BTreeSet<u32>>,
    capacity: usize,
}

impl LiveSet {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(BTreeSet::new()),
            capacity: 2048,
        }
    }

    /// Configure the queue capacity for this subscriber.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Sorted snapshot of live pids.
    #[must_use]
    pub fn snapshot(&self) -> Vec<u32> {
        let g = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        g.iter().copied().collect()
    }
}

#[async_trait]
impl Subscribe for LiveSet {
    async fn on_event(&self, ev: &Event) {
        let Some(pid) = ev.pid else { return };
        match ev.kind {
            EventKind::ProcessStarted => {
                let mut g = self.inner.write().unwrap_or_else(PoisonError::into_inner);
                if !g.insert(pid) {
                    warn!(pid, "LiveSet: duplicate start");
                }
            }
            EventKind::ProcessFinished => {
                let mut g = self.inner.write().unwrap_or_else(PoisonError::into_inner);
                if !g.remove(&pid) {
                    warn!(pid, "LiveSet: finish without start");
                }
            }
            _ => {}
        }
    }

    fn name(&self) -> &'static str {
        "LiveSet"
    }

    fn queue_capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for LiveSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_then_finish() {
        let live = LiveSet::new();
        live.on_event(&Event::new(EventKind::ProcessStarted).with_pid(9)).await;
        live.on_event(&Event::new(EventKind::ProcessStarted).with_pid(3)).await;
        assert_eq!(live.snapshot(), vec![3, 9]);

        live.on_event(&Event::new(EventKind::ProcessFinished).with_pid(9)).await;
        assert_eq!(live.snapshot(), vec![3]);
    }

    #[tokio::test]
    async fn test_ignores_events_without_pid() {
        let live = LiveSet::new();
        live.on_event(&Event::new(EventKind::ProcessStarted)).await;
        assert!(live.snapshot().is_empty());
    }
}
