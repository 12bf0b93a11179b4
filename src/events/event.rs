//! # Lifecycle events emitted by process handles.
//!
//! The [`EventKind`] enum classifies event types across two categories:
//! - **Process events**: started, signaled, escalated, finished
//! - **Subscriber events**: per-subscriber overflow and panic reports
//!
//! The [`Event`] struct carries metadata such as timestamps, pid, command,
//! exit code and, for start/finish, the spec and result themselves.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically. No ordering holds between the events of two independent
//! children beyond that.
//!
//! ## Example
//! ```rust
//! use procvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::ProcessFinished)
//!     .with_pid(4242)
//!     .with_exit_code(0);
//!
//! assert_eq!(ev.kind, EventKind::ProcessFinished);
//! assert_eq!(ev.pid, Some(4242));
//! assert_eq!(ev.exit_code, Some(0));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use nix::sys::signal::Signal;

use crate::process::{ProcessResult, ProcessSpec};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `reason`: subscriber name and panic info
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `reason`: subscriber name and drop reason
    SubscriberOverflow,

    // === Process lifecycle events ===
    /// Child was spawned and registered.
    ///
    /// Sets:
    /// - `pid`, `command` (expanded), `spec`
    ProcessStarted,

    /// A signal was delivered to a live child.
    ///
    /// Sets:
    /// - `pid`, `signal`
    ProcessSignaled,

    /// Grace period elapsed after the terminate signal; `SIGKILL` follows.
    ///
    /// Sets:
    /// - `pid`, `signal` (the kill signal), `delay_ms` (grace)
    TerminateEscalated,

    /// Exit observed, pipes drained, OS resources released.
    ///
    /// Sets:
    /// - `pid`, `command`, `exit_code`, `reason` (category label), `result`
    ProcessFinished,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Process identifier.
    pub pid: Option<u32>,
    /// Expanded command line.
    pub command: Option<Arc<str>>,
    /// Final exit code.
    pub exit_code: Option<i32>,
    /// Signal number involved.
    pub signal: Option<i32>,
    /// Delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Human-readable reason.
    pub reason: Option<Arc<str>>,

    /// Spec the child was spawned from.
    pub spec: Option<Arc<ProcessSpec>>,
    /// Result of a finished child.
    pub result: Option<ProcessResult>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            pid: None,
            command: None,
            exit_code: None,
            signal: None,
            delay_ms: None,
            reason: None,
            spec: None,
            result: None,
        }
    }

    #[inline]
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    #[inline]
    pub fn with_command(mut self, command: impl Into<Arc<str>>) -> Self {
        self.command = Some(command.into());
        self
    }

    #[inline]
    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    #[inline]
    pub fn with_signal(mut self, signal: Signal) -> Self {
        self.signal = Some(signal as i32);
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[inline]
    pub fn with_spec(mut self, spec: Arc<ProcessSpec>) -> Self {
        self.spec = Some(spec);
        self
    }

    #[inline]
    pub fn with_result(mut self, result: ProcessResult) -> Self {
        self.result = Some(result);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_reason(format!("subscriber={subscriber} info={info}"))
    }

    #[inline]
    pub fn is_subscriber_event(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        )
    }
}
