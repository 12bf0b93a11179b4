//! # Timeout wrapping and termination escalation.
//!
//! Two halves:
//! - **Before spawn**: [`wrapper_prefix`] turns a [`TimeoutSpec`] into a
//!   `timeout(1)` invocation that is prepended to the command. The deadline is
//!   enforced by that external process, never by an internal timer racing
//!   `wait()`.
//! - **After spawn**: [`terminate`] sends the spec's terminate signal and, when
//!   a grace period is given, escalates to `SIGKILL` if the child is still
//!   running once it elapses.
//!
//! ## Wrapper format
//! ```text
//! timeout [--signal <n>] [--kill-after <secs>s] <secs, 3 decimals>s <command...>
//! ```
//! - `--signal` only when the signal differs from `SIGTERM` (the utility default)
//! - `--kill-after` only when an escalation delay is set
//!
//! ## Escalation
//! ```text
//! terminate(grace):
//!   already released ─► Ok(false)            (idempotent, never raises)
//!   signal(term)     ─► not delivered ─► Ok(false)
//!                    └► delivered
//!                         ├─ grace = None ─► Ok(true)
//!                         └─ sleep(grace) ─► still running? ─► SIGKILL
//!   released now with a non-accepted code ─► Err(CommandFailed/CommandTimedOut)
//! ```

use std::time::Duration;

use nix::sys::signal::Signal;
use tracing::debug;

use super::{ProcessHandle, TimeoutSpec};
use crate::error::ProcessError;
use crate::events::{Event, EventKind};

/// Name of the external deadline utility.
const TIMEOUT_PROGRAM: &str = "timeout";

/// Builds the `timeout(1)` prefix for `timeout`, or an empty prefix for `None`.
///
/// # Example
/// ```
/// use procvisor::{Signal, TimeoutSpec, wrapper_prefix};
///
/// let spec = TimeoutSpec::new(1.5)
///     .with_signal(Signal::SIGINT)
///     .with_kill_after(10.0);
/// assert_eq!(
///     wrapper_prefix(Some(&spec)),
///     vec!["timeout", "--signal", "2", "--kill-after", "10s", "1.500s"],
/// );
/// assert!(wrapper_prefix(None).is_empty());
/// ```
pub fn wrapper_prefix(timeout: Option<&TimeoutSpec>) -> Vec<String> {
    let Some(timeout) = timeout else {
        return Vec::new();
    };

    let mut prefix = vec![TIMEOUT_PROGRAM.to_string()];

    if timeout.signal != TimeoutSpec::DEFAULT_SIGNAL {
        prefix.push("--signal".to_string());
        prefix.push((timeout.signal as i32).to_string());
    }

    if let Some(kill_after) = timeout.kill_after_secs {
        prefix.push("--kill-after".to_string());
        prefix.push(format!("{kill_after}s"));
    }

    prefix.push(format!("{:.3}s", timeout.duration_secs));
    prefix
}

/// Sends the handle's terminate signal and optionally escalates to `SIGKILL`.
///
/// Returns whether the initial signal reached a live process. Calling this on a
/// handle that has already exited is a no-op returning `Ok(false)`.
///
/// If the exit is observed during this call and its code is not accepted, the
/// classified failure is returned instead.
pub async fn terminate(
    handle: &ProcessHandle,
    grace: Option<Duration>,
) -> Result<bool, ProcessError> {
    if handle.is_done() {
        return Ok(false);
    }

    let delivered = handle.signal(handle.spec().term_signal());

    if let (true, Some(grace)) = (delivered, grace) {
        tokio::time::sleep(grace).await;
        // A stopped child holds SIGTERM pending; only SIGKILL ends it.
        if !handle.is_done() {
            debug!(pid = handle.pid(), grace = ?grace, "grace elapsed; escalating to SIGKILL");
            handle.publish(
                Event::new(EventKind::TerminateEscalated)
                    .with_pid(handle.pid())
                    .with_signal(Signal::SIGKILL)
                    .with_delay(grace),
            );
            handle.signal(Signal::SIGKILL);
        }
    }

    if handle.is_done() {
        if let Some(outcome) = handle.outcome() {
            outcome?;
        }
    }
    Ok(delivered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_timeout_no_prefix() {
        assert!(wrapper_prefix(None).is_empty());
    }

    #[test]
    fn test_defaults_emit_duration_only() {
        assert_eq!(
            wrapper_prefix(Some(&TimeoutSpec::new(0.01))),
            vec!["timeout", "0.010s"]
        );
    }

    #[test]
    fn test_duration_rounds_to_millis() {
        assert_eq!(
            wrapper_prefix(Some(&TimeoutSpec::new(1.23456))),
            vec!["timeout", "1.235s"]
        );
    }

    #[test]
    fn test_negative_duration_is_passed_through() {
        assert_eq!(
            wrapper_prefix(Some(&TimeoutSpec::new(-1.0))),
            vec!["timeout", "-1.000s"]
        );
    }

    #[test]
    fn test_custom_signal_and_kill_after() {
        let spec = TimeoutSpec::new(3.0)
            .with_signal(Signal::SIGKILL)
            .with_kill_after(0.5);
        assert_eq!(
            wrapper_prefix(Some(&spec)),
            vec!["timeout", "--signal", "9", "--kill-after", "0.5s", "3.000s"]
        );
    }

    #[test]
    fn test_default_signal_is_not_emitted() {
        let spec = TimeoutSpec::new(3.0).with_signal(Signal::SIGTERM);
        assert_eq!(wrapper_prefix(Some(&spec)), vec!["timeout", "3.000s"]);
    }
}
