//! # LogWriter: lifecycle events as `tracing` records
//!
//! A minimal subscriber that renders incoming [`Event`]s with `tracing::info!`.
//! Use it for tests or demos; install any `tracing` subscriber to see output.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO procvisor: [started] pid=4242 command=timeout 1.000s sleep 5
//! INFO procvisor: [signaled] pid=4242 signal=SIGTERM
//! INFO procvisor: [finished] pid=4242 code=143 category=signaled
//! ```

use async_trait::async_trait;
use tracing::info;

use crate::events::{Event, EventKind};
use crate::exit::signal_name;
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let pid = e.pid.unwrap_or_default();
        let signal = e.signal.map(signal_name).unwrap_or("none");
        match e.kind {
            EventKind::ProcessStarted => {
                info!(target: "procvisor", "[started] pid={pid} command={}", e.command.as_deref().unwrap_or(""));
            }
            EventKind::ProcessSignaled => {
                info!(target: "procvisor", "[signaled] pid={pid} signal={signal}");
            }
            EventKind::TerminateEscalated => {
                info!(target: "procvisor", "[escalated] pid={pid} signal={signal} grace_ms={:?}", e.delay_ms);
            }
            EventKind::ProcessFinished => {
                info!(
                    target: "procvisor",
                    "[finished] pid={pid} code={:?} category={}",
                    e.exit_code,
                    e.reason.as_deref().unwrap_or("unknown")
                );
            }
            EventKind::SubscriberOverflow => {
                info!(target: "procvisor", "[subscriber-overflow] {}", e.reason.as_deref().unwrap_or(""));
            }
            EventKind::SubscriberPanicked => {
                info!(target: "procvisor", "[subscriber-panicked] {}", e.reason.as_deref().unwrap_or(""));
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
