//! # Manager configuration.
//!
//! Provides [`ManagerConfig`], the settings shared by every handle a
//! [`ProcessManager`](crate::ProcessManager) spawns.
//!
//! ## Sentinel values
//! - `poll_interval = 0s` → clamped to 1 ms (a zero sleep would spin)
//! - `bus_capacity = 0` → clamped to 1 by [`Bus`](crate::events::Bus)

use std::time::Duration;

/// Configuration for the process manager.
///
/// ## Field semantics
/// - `poll_interval`: delay between status checks in `wait()` (default 10 ms)
/// - `bus_capacity`: event bus ring buffer size (min 1)
/// - `kill_on_drop`: send `SIGKILL` when a handle of a running child is dropped
///
/// All fields are public. Prefer the helper accessors over sentinel checks.
#[derive(Clone, Debug)]
pub struct ManagerConfig {
    /// Delay between status re-checks while waiting.
    pub poll_interval: Duration,

    /// Capacity of the event bus broadcast channel ring buffer.
    ///
    /// Receivers lagging by more than `bus_capacity` messages get `Lagged`
    /// and skip older items.
    pub bus_capacity: usize,

    /// Kill still-running children whose handle is dropped.
    ///
    /// The exit is reaped and published either way.
    pub kill_on_drop: bool,
}

impl ManagerConfig {
    /// Returns the poll interval, never below 1 ms.
    #[inline]
    pub fn poll_interval_clamped(&self) -> Duration {
        self.poll_interval.max(Duration::from_millis(1))
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for ManagerConfig {
    /// - `poll_interval = 10ms`
    /// - `bus_capacity = 1024`
    /// - `kill_on_drop = true`
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            bus_capacity: 1024,
            kill_on_drop: true,
        }
    }
}
