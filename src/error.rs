//! Error types used by the procvisor runtime.
//!
//! This module defines two error enums:
//!
//! - [`ProcessError`]: errors surfaced to callers of spawn / wait / terminate.
//! - [`RegistryError`]: invariant violations inside the exit registry.
//!
//! Both provide helper methods (`as_label`, `as_message`) for logging/metrics.
//! A target process that is already gone is **not** an error: signal delivery
//! reports it as a `false` return instead.

use std::io;

use thiserror::Error;

use crate::exit::ExitCategory;
use crate::process::{Command, ProcessResult};

/// # Invariant violations detected by the exit registry.
///
/// These are programming errors, never runtime conditions. They are returned to
/// the caller that triggered them and are never silently recovered.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A completion callback is already pending for this pid.
    #[error("callback already registered for pid {pid}")]
    DuplicateRegistration {
        /// Process identifier.
        pid: u32,
    },

    /// A second exit was observed for a pid whose exit was already recorded.
    #[error("exit already observed for pid {pid}")]
    AlreadyExited {
        /// Process identifier.
        pid: u32,
    },

    /// An exit was reported for a pid that was never adopted or awaited.
    #[error("exit reported for untracked pid {pid}")]
    Untracked {
        /// Process identifier.
        pid: u32,
    },
}

impl RegistryError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use procvisor::RegistryError;
    ///
    /// let err = RegistryError::DuplicateRegistration { pid: 7 };
    /// assert_eq!(err.as_label(), "registry_duplicate_registration");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RegistryError::DuplicateRegistration { .. } => "registry_duplicate_registration",
            RegistryError::AlreadyExited { .. } => "registry_already_exited",
            RegistryError::Untracked { .. } => "registry_untracked",
        }
    }

    /// Returns the pid the violation refers to.
    pub fn pid(&self) -> u32 {
        match self {
            RegistryError::DuplicateRegistration { pid }
            | RegistryError::AlreadyExited { pid }
            | RegistryError::Untracked { pid } => *pid,
        }
    }
}

/// # Errors produced by process spawning and completion.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ProcessError {
    /// The OS refused to create the child. No handle exists.
    #[error("failed to spawn {command}: {source}")]
    Spawn {
        /// The expanded command that was attempted.
        command: Command,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// The child exited with a code outside the accepted set.
    #[error("{} (code: {}, command: {})", .category, .result.exit_code(), .result.command())]
    CommandFailed {
        /// Classification of the exit code.
        category: ExitCategory,
        /// Full result, including captured output.
        result: Box<ProcessResult>,
    },

    /// The child was stopped by its `timeout(1)` wrapper (exit code 124).
    #[error("Timed out. (code: {}, command: {})", .result.exit_code(), .result.command())]
    CommandTimedOut {
        /// Full result, including captured output.
        result: Box<ProcessResult>,
    },

    /// Registry invariant violation (internal defect).
    #[error("registry invariant violated: {0}")]
    Registry(#[from] RegistryError),
}

impl ProcessError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use procvisor::{ProcessError, RegistryError};
    ///
    /// let err = ProcessError::from(RegistryError::AlreadyExited { pid: 1 });
    /// assert_eq!(err.as_label(), "process_registry_violation");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ProcessError::Spawn { .. } => "process_spawn_failed",
            ProcessError::CommandFailed { .. } => "process_command_failed",
            ProcessError::CommandTimedOut { .. } => "process_timed_out",
            ProcessError::Registry(_) => "process_registry_violation",
        }
    }

    /// Returns a human-readable message including captured output, if any.
    pub fn as_message(&self) -> String {
        match self {
            ProcessError::CommandFailed { result, .. }
            | ProcessError::CommandTimedOut { result } => {
                let stdout = result.stdout().unwrap_or_default();
                let stderr = result.stderr().unwrap_or_default();
                format!(
                    "{self}\n{}\n{}",
                    String::from_utf8_lossy(&stdout),
                    String::from_utf8_lossy(&stderr)
                )
            }
            other => other.to_string(),
        }
    }

    /// True for [`ProcessError::CommandTimedOut`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProcessError::CommandTimedOut { .. })
    }

    /// Exit code carried by completion failures.
    pub fn exit_code(&self) -> Option<i32> {
        self.result().map(ProcessResult::exit_code)
    }

    /// Result carried by completion failures.
    pub fn result(&self) -> Option<&ProcessResult> {
        match self {
            ProcessError::CommandFailed { result, .. }
            | ProcessError::CommandTimedOut { result } => Some(result),
            _ => None,
        }
    }

    /// Builds the failure for a non-accepted exit.
    pub(crate) fn from_result(result: ProcessResult) -> Self {
        let category = result.classified().category;
        match category {
            ExitCategory::TimedOut => ProcessError::CommandTimedOut {
                result: Box::new(result),
            },
            category => ProcessError::CommandFailed {
                category,
                result: Box::new(result),
            },
        }
    }
}
