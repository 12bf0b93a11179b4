//! # Process specification.
//!
//! Defines [`ProcessSpec`], the immutable description of a child to spawn:
//! what to run ([`Command`]), where, with which environment, under which
//! optional [`TimeoutSpec`], how to terminate it, and which exit codes count
//! as success.
//!
//! ## Rules
//! - A spec is never mutated after spawn; handles and results share it via `Arc`.
//! - `envs = Some(..)` **replaces** the inherited environment, it does not merge.
//! - The default accepted set is `{0}`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use nix::sys::signal::Signal;

use super::timeout;
use crate::exit::code;

/// What to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// A single string run through `sh -c`.
    Shell(String),
    /// An argument vector; the first element is the program.
    Argv(Vec<String>),
}

impl Command {
    /// Creates an argv command.
    pub fn argv<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Command::Argv(args.into_iter().map(Into::into).collect())
    }

    /// Creates a shell command.
    pub fn shell(script: impl Into<String>) -> Self {
        Command::Shell(script.into())
    }

    /// Prepends `prefix` to the command.
    ///
    /// Argv commands get the prefix as leading elements. Shell commands get the
    /// prefix joined with spaces, followed by one space and the original script.
    pub fn prefixed(&self, prefix: &[String]) -> Command {
        if prefix.is_empty() {
            return self.clone();
        }
        match self {
            Command::Argv(args) => {
                Command::Argv(prefix.iter().chain(args.iter()).cloned().collect())
            }
            Command::Shell(script) => Command::Shell(format!("{} {script}", prefix.join(" "))),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Shell(script) => f.write_str(script),
            Command::Argv(args) => {
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write_quoted(f, arg)?;
                }
                Ok(())
            }
        }
    }
}

/// Writes `arg` as one `sh` word, single-quoting it unless it is plain.
fn write_quoted(f: &mut fmt::Formatter<'_>, arg: &str) -> fmt::Result {
    let plain = !arg.is_empty()
        && arg
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"-_./=:,+@%".contains(&b));
    if plain {
        return f.write_str(arg);
    }
    f.write_str("'")?;
    f.write_str(&arg.replace('\'', r"'\''"))?;
    f.write_str("'")
}

impl From<&str> for Command {
    fn from(script: &str) -> Self {
        Command::Shell(script.to_string())
    }
}

impl From<String> for Command {
    fn from(script: String) -> Self {
        Command::Shell(script)
    }
}

impl From<Vec<String>> for Command {
    fn from(args: Vec<String>) -> Self {
        Command::Argv(args)
    }
}

/// Deadline enforced by wrapping the command in `timeout(1)`.
///
/// - `duration_secs` may be fractional; a negative value is passed through and
///   surfaces as a wrapper failure (exit 125), not rejected here.
/// - `signal` is sent at expiry (default `SIGTERM`).
/// - `kill_after_secs` escalates to `SIGKILL` if the child ignores `signal`.
///   It defaults to `None`: no `--kill-after` flag is emitted and `timeout(1)`
///   never escalates. Set it explicitly (for example `10.0`) to get a hard
///   deadline for children that ignore `signal`.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeoutSpec {
    pub duration_secs: f64,
    pub signal: Signal,
    pub kill_after_secs: Option<f64>,
}

impl TimeoutSpec {
    /// Default signal sent by `timeout(1)` at expiry.
    pub const DEFAULT_SIGNAL: Signal = Signal::SIGTERM;

    pub fn new(duration_secs: f64) -> Self {
        Self {
            duration_secs,
            signal: Self::DEFAULT_SIGNAL,
            kill_after_secs: None,
        }
    }

    #[must_use]
    pub fn with_signal(mut self, signal: Signal) -> Self {
        self.signal = signal;
        self
    }

    #[must_use]
    pub fn with_kill_after(mut self, secs: f64) -> Self {
        self.kill_after_secs = Some(secs);
        self
    }
}

/// Immutable description of a child process.
///
/// ## Example
/// ```rust
/// use procvisor::{Command, ProcessSpec, TimeoutSpec};
///
/// let spec = ProcessSpec::new(Command::argv(["sleep", "1"]))
///     .with_timeout(TimeoutSpec::new(0.5))
///     .with_accepted_codes([0, 124]);
///
/// assert_eq!(
///     spec.expanded_command(),
///     Command::argv(["timeout", "0.500s", "sleep", "1"])
/// );
/// assert!(spec.accepts(124));
/// ```
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    command: Command,
    working_dir: Option<PathBuf>,
    envs: Option<BTreeMap<String, String>>,
    timeout: Option<TimeoutSpec>,
    term_signal: Signal,
    accepted_codes: Vec<i32>,
    discard_output: bool,
}

impl ProcessSpec {
    /// Default graceful termination signal.
    pub const DEFAULT_TERM_SIGNAL: Signal = Signal::SIGTERM;

    /// Creates a spec with defaults: current directory, inherited environment,
    /// no timeout, `SIGTERM`, accepted codes `{0}`.
    pub fn new(command: impl Into<Command>) -> Self {
        Self {
            command: command.into(),
            working_dir: None,
            envs: None,
            timeout: None,
            term_signal: Self::DEFAULT_TERM_SIGNAL,
            accepted_codes: vec![code::SUCCESS],
            discard_output: false,
        }
    }

    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Replaces the child's environment entirely.
    #[must_use]
    pub fn with_envs<I, K, V>(mut self, envs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.envs = Some(
            envs.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: TimeoutSpec) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_term_signal(mut self, signal: Signal) -> Self {
        self.term_signal = signal;
        self
    }

    /// Replaces the accepted exit codes.
    #[must_use]
    pub fn with_accepted_codes(mut self, codes: impl IntoIterator<Item = i32>) -> Self {
        self.accepted_codes = codes.into_iter().collect();
        self
    }

    /// Sends stdout and stderr to `/dev/null` instead of capturing them.
    ///
    /// Reads on a discarded channel return `None` and the result's buffers
    /// stay empty. The child never blocks on a full pipe.
    #[must_use]
    pub fn with_no_output(mut self) -> Self {
        self.discard_output = true;
        self
    }

    #[inline]
    pub fn command(&self) -> &Command {
        &self.command
    }

    #[inline]
    pub fn working_dir(&self) -> Option<&PathBuf> {
        self.working_dir.as_ref()
    }

    #[inline]
    pub fn envs(&self) -> Option<&BTreeMap<String, String>> {
        self.envs.as_ref()
    }

    #[inline]
    pub fn timeout(&self) -> Option<&TimeoutSpec> {
        self.timeout.as_ref()
    }

    #[inline]
    pub fn term_signal(&self) -> Signal {
        self.term_signal
    }

    #[inline]
    pub fn accepted_codes(&self) -> &[i32] {
        &self.accepted_codes
    }

    #[inline]
    pub fn discards_output(&self) -> bool {
        self.discard_output
    }

    /// Returns `true` if `code` is in the accepted set.
    #[inline]
    pub fn accepts(&self, code: i32) -> bool {
        crate::exit::is_acceptable(code, &self.accepted_codes)
    }

    /// The command actually executed: the timeout prefix (if any) followed by
    /// the spec command.
    pub fn expanded_command(&self) -> Command {
        self.command
            .prefixed(&timeout::wrapper_prefix(self.timeout.as_ref()))
    }
}
