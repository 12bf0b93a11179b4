//! # Exit classification.
//!
//! Pure mapping from a raw exit code to an [`ExitCategory`]. The category only
//! feeds diagnostics; whether an exit counts as a failure is decided separately
//! by [`is_acceptable`] against the caller's accepted set.
//!
//! ```text
//!   0          → Success
//!   1          → GeneralError
//!   2          → InvalidUsage
//!   124        → TimedOut
//!   125        → TimeoutInvocationFailed
//!   126        → PermissionDenied
//!   127        → CommandNotFound
//!   129..=159  → Signaled(code - 128)
//!   otherwise  → Unknown
//! ```

use std::fmt;

use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;

use super::code;

/// Semantic category of a raw exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitCategory {
    Success,
    GeneralError,
    InvalidUsage,
    TimedOut,
    TimeoutInvocationFailed,
    PermissionDenied,
    CommandNotFound,
    /// Terminated by the given signal number.
    Signaled(i32),
    Unknown,
}

impl ExitCategory {
    /// Classifies a raw exit code.
    ///
    /// # Example
    /// ```
    /// use procvisor::ExitCategory;
    ///
    /// assert_eq!(ExitCategory::classify(0), ExitCategory::Success);
    /// assert_eq!(ExitCategory::classify(124), ExitCategory::TimedOut);
    /// assert_eq!(ExitCategory::classify(137), ExitCategory::Signaled(9));
    /// assert_eq!(ExitCategory::classify(200), ExitCategory::Unknown);
    /// ```
    pub fn classify(code: i32) -> Self {
        match code {
            code::SUCCESS => ExitCategory::Success,
            code::GENERAL_ERROR => ExitCategory::GeneralError,
            code::INVALID_USAGE => ExitCategory::InvalidUsage,
            code::TIMED_OUT => ExitCategory::TimedOut,
            code::TIMEOUT_COMMAND_FAILED => ExitCategory::TimeoutInvocationFailed,
            code::COMMAND_NOT_EXECUTABLE => ExitCategory::PermissionDenied,
            code::COMMAND_NOT_FOUND => ExitCategory::CommandNotFound,
            c if c > code::SIGNAL_BASE && c < code::SIGNAL_LIMIT => {
                ExitCategory::Signaled(c - code::SIGNAL_BASE)
            }
            _ => ExitCategory::Unknown,
        }
    }

    /// Short stable label (snake_case) for logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ExitCategory::Success => "success",
            ExitCategory::GeneralError => "general_error",
            ExitCategory::InvalidUsage => "invalid_usage",
            ExitCategory::TimedOut => "timed_out",
            ExitCategory::TimeoutInvocationFailed => "timeout_invocation_failed",
            ExitCategory::PermissionDenied => "permission_denied",
            ExitCategory::CommandNotFound => "command_not_found",
            ExitCategory::Signaled(_) => "signaled",
            ExitCategory::Unknown => "unknown",
        }
    }

    /// Fixed human-readable explanation.
    pub fn description(&self) -> String {
        match self {
            ExitCategory::Success => "Succeeded.".to_string(),
            ExitCategory::GeneralError => "General error.".to_string(),
            ExitCategory::InvalidUsage => "Misuse of shell builtins.".to_string(),
            ExitCategory::TimedOut => "Timed out.".to_string(),
            ExitCategory::TimeoutInvocationFailed => "Timeout command failed.".to_string(),
            ExitCategory::PermissionDenied => "Permission denied.".to_string(),
            ExitCategory::CommandNotFound => "Command not found.".to_string(),
            ExitCategory::Signaled(n) => format!("Terminated by {} ({n}).", signal_name(*n)),
            ExitCategory::Unknown => "Unknown error.".to_string(),
        }
    }
}

impl fmt::Display for ExitCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

/// An exit code paired with its category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifiedExit {
    pub code: i32,
    pub category: ExitCategory,
}

impl ClassifiedExit {
    pub fn new(code: i32) -> Self {
        Self {
            code,
            category: ExitCategory::classify(code),
        }
    }
}

/// Returns `true` if `code` is one of the caller-accepted codes.
#[inline]
pub fn is_acceptable(code: i32, accepted: &[i32]) -> bool {
    accepted.contains(&code)
}

/// Maps a signal number to its conventional name (`"SIGKILL"`), or `"Unknown"`.
pub fn signal_name(signal: i32) -> &'static str {
    Signal::try_from(signal)
        .map(Signal::as_str)
        .unwrap_or("Unknown")
}

/// Converts a terminal wait status into an exit code.
///
/// Normal exits keep their code as-is; signal terminations become `128 + N`.
/// Non-terminal statuses (stopped, continued, still alive) yield `None`.
pub(crate) fn exit_code_of(status: WaitStatus) -> Option<i32> {
    match status {
        WaitStatus::Exited(_, code) => Some(code),
        WaitStatus::Signaled(_, sig, _) => Some(code::SIGNAL_BASE + sig as i32),
        _ => None,
    }
}
