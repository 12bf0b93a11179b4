//! # Stable exit status codes.
//!
//! Codes produced by shells, by the `timeout(1)` wrapper and by signal
//! termination (`128 + N`). Callers match on these instead of magic numbers.

/// Process exited normally.
pub const SUCCESS: i32 = 0;
/// Catch-all for general errors.
pub const GENERAL_ERROR: i32 = 1;
/// Misuse of shell builtins.
pub const INVALID_USAGE: i32 = 2;
/// `timeout(1)` deadline exceeded.
pub const TIMED_OUT: i32 = 124;
/// `timeout(1)` itself failed (bad duration, bad signal, ...).
pub const TIMEOUT_COMMAND_FAILED: i32 = 125;
/// Command found but not executable.
pub const COMMAND_NOT_EXECUTABLE: i32 = 126;
/// Command not found.
pub const COMMAND_NOT_FOUND: i32 = 127;

/// Base added to a signal number when a child is terminated by that signal.
pub const SIGNAL_BASE: i32 = 128;
/// Upper bound (exclusive) of the range interpreted as `128 + N`.
pub const SIGNAL_LIMIT: i32 = 160;

pub const SIGHUP: i32 = SIGNAL_BASE + 1;
pub const SIGINT: i32 = SIGNAL_BASE + 2;
pub const SIGKILL: i32 = SIGNAL_BASE + 9;
pub const SIGSEGV: i32 = SIGNAL_BASE + 11;
pub const SIGTERM: i32 = SIGNAL_BASE + 15;

/// Exit code recorded when a child was reaped outside the registry and its
/// real status is unknowable.
pub const LOST: i32 = -1;
