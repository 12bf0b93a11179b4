//! # Completed process result.
//!
//! A [`ProcessResult`] is materialized exactly once per handle, at the moment
//! the exit is observed and the pipes are drained. It shares the handle's
//! capture buffers, so output stays readable (and rewindable) after the fact.

use std::io;
use std::sync::Arc;

use super::{CaptureBuffer, Command, ProcessSpec};
use crate::exit::{ClassifiedExit, code};

/// Outcome of one finished child.
#[derive(Clone, Debug)]
pub struct ProcessResult {
    spec: Arc<ProcessSpec>,
    command: Arc<Command>,
    pid: u32,
    exit_code: i32,
    stdin: CaptureBuffer,
    stdout: CaptureBuffer,
    stderr: CaptureBuffer,
}

impl ProcessResult {
    pub(crate) fn new(
        spec: Arc<ProcessSpec>,
        command: Arc<Command>,
        pid: u32,
        exit_code: i32,
        [stdin, stdout, stderr]: [CaptureBuffer; 3],
    ) -> Self {
        Self {
            spec,
            command,
            pid,
            exit_code,
            stdin,
            stdout,
            stderr,
        }
    }

    #[inline]
    pub fn spec(&self) -> &ProcessSpec {
        &self.spec
    }

    /// The expanded command that was executed.
    #[inline]
    pub fn command(&self) -> &Command {
        &self.command
    }

    #[inline]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    #[inline]
    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    pub fn classified(&self) -> ClassifiedExit {
        ClassifiedExit::new(self.exit_code)
    }

    /// True if the exit code is in the spec's accepted set.
    pub fn succeeded(&self) -> bool {
        self.spec.accepts(self.exit_code)
    }

    /// True if the `timeout(1)` wrapper fired.
    pub fn timed_out(&self) -> bool {
        self.exit_code == code::TIMED_OUT
    }

    /// Everything written to the child's stdin.
    pub fn stdin(&self) -> io::Result<Vec<u8>> {
        self.stdin.contents()
    }

    /// Entire captured stdout.
    pub fn stdout(&self) -> io::Result<Vec<u8>> {
        self.stdout.contents()
    }

    /// Entire captured stderr.
    pub fn stderr(&self) -> io::Result<Vec<u8>> {
        self.stderr.contents()
    }

    /// Stdout bytes not yet consumed through the handle or this result.
    pub fn read_stdout_buffer(&self) -> io::Result<Vec<u8>> {
        self.stdout.read_unread()
    }

    /// Stderr bytes not yet consumed through the handle or this result.
    pub fn read_stderr_buffer(&self) -> io::Result<Vec<u8>> {
        self.stderr.read_unread()
    }
}
