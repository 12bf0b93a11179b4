//! # Process handle: one OS child and its lifecycle state machine.
//!
//! ```text
//!            SIGSTOP                      exit observed (poll or SIGCHLD)
//!   Running ─────────► Stopped     Running/Stopped ──► Exited ──► Released
//!      ▲                  │                           (code set)  (pipes drained,
//!      └──── SIGCONT ─────┘                                        result built)
//! ```
//!
//! ## Rules
//! - The exit code is write-once: the first completion wins, later ones are ignored.
//! - `Exited → Released` happens inside the same critical section as the exit
//!   observation, so no output can be lost between the two.
//! - Status queries force a refresh (`registry.poll`) first; notification
//!   delivery is asynchronous relative to the caller.
//! - The handle lock is never held while calling into the registry (the
//!   completion callback takes it).
//! - After release, `signal()` is a no-op returning `false` and reads replay
//!   the capture buffers until they run dry, then return `None`.

use std::fmt;
use std::io::{self, ErrorKind, Write};
use std::process::{ChildStderr, ChildStdin, ChildStdout, Command as OsCommand, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::Stream;
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tracing::{debug, warn};

use super::output::{self, OutputChannel};
use super::{CaptureBuffer, Captures, Command, PipeDrain, ProcessResult, ProcessSpec, timeout};
use crate::core::{ExitRegistry, ManagerConfig};
use crate::error::ProcessError;
use crate::events::{Bus, Event, EventKind};

/// Program used to run [`Command::Shell`] scripts.
const SHELL: &str = "sh";

/// Lifecycle state of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Child is alive and scheduled.
    Running,
    /// Child is suspended (stop signal).
    Stopped,
    /// Exit code captured; resources not yet released.
    Exited,
    /// Terminal: pipes drained and closed, child reaped, result materialized.
    Released,
}

impl ProcessState {
    /// True once an exit has been observed.
    #[inline]
    pub fn is_done(self) -> bool {
        matches!(self, ProcessState::Exited | ProcessState::Released)
    }
}

/// State shared between the handle and its completion callback.
struct Lifecycle {
    state: ProcessState,
    stdout: PipeDrain<ChildStdout>,
    stderr: PipeDrain<ChildStderr>,
    result: Option<ProcessResult>,
}

struct Shared {
    life: Mutex<Lifecycle>,
    stdin: Mutex<Option<ChildStdin>>,
    input: CaptureBuffer,
}

impl Shared {
    fn life(&self) -> MutexGuard<'_, Lifecycle> {
        self.life.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stdin(&self) -> MutexGuard<'_, Option<ChildStdin>> {
        self.stdin.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Performs `Exited → Released` once. Returns the result on the first call.
    fn release(
        &self,
        spec: &Arc<ProcessSpec>,
        command: &Arc<Command>,
        pid: u32,
        code: i32,
    ) -> Option<ProcessResult> {
        let result = {
            let mut life = self.life();
            if life.result.is_some() {
                return None;
            }
            life.state = ProcessState::Exited;

            if let Err(e) = life.stdout.drain() {
                warn!(pid, error = %e, "failed to drain stdout");
            }
            if let Err(e) = life.stderr.drain() {
                warn!(pid, error = %e, "failed to drain stderr");
            }

            let result = ProcessResult::new(
                Arc::clone(spec),
                Arc::clone(command),
                pid,
                code,
                [
                    self.input.clone(),
                    life.stdout.buffer().clone(),
                    life.stderr.buffer().clone(),
                ],
            );
            life.result = Some(result.clone());
            life.state = ProcessState::Released;
            result
        };

        self.stdin().take();
        Some(result)
    }
}

/// Owns exactly one spawned child.
///
/// Obtained from [`ProcessManager::spawn`](crate::ProcessManager::spawn).
/// All methods take `&self`; a handle may be shared across tasks behind an `Arc`.
pub struct ProcessHandle {
    pid: u32,
    spec: Arc<ProcessSpec>,
    command: Arc<Command>,
    registry: Arc<ExitRegistry>,
    bus: Bus,
    shared: Arc<Shared>,
    poll_interval: Duration,
    kill_on_drop: bool,
}

impl ProcessHandle {
    /// Spawns `spec` and registers the child with `registry`.
    ///
    /// Order: `track()` → OS spawn → non-blocking pipes → `adopt()` →
    /// `ProcessStarted` → `on_exit()`.
    pub(crate) fn spawn(
        spec: ProcessSpec,
        captures: Captures,
        registry: Arc<ExitRegistry>,
        bus: Bus,
        config: &ManagerConfig,
    ) -> Result<Self, ProcessError> {
        let spec = Arc::new(spec);
        let command = Arc::new(spec.expanded_command());
        let fail = |source: io::Error| ProcessError::Spawn {
            command: Command::clone(&command),
            source,
        };

        let mut os = os_command(&command, &spec).map_err(fail)?;
        registry.track().map_err(fail)?;

        let mut child = match os.spawn() {
            Ok(child) => child,
            Err(e) => {
                registry.untrack();
                return Err(fail(e));
            }
        };
        let pid = child.id();

        let Captures {
            stdin: input,
            stdout,
            stderr,
        } = captures;
        let life = match Lifecycle::new(
            child.stdout.take(),
            child.stderr.take(),
            stdout.unwrap_or_default(),
            stderr.unwrap_or_default(),
        ) {
            Ok(life) => life,
            Err(e) => {
                abandon(&registry, pid);
                return Err(fail(e));
            }
        };
        let shared = Arc::new(Shared {
            life: Mutex::new(life),
            stdin: Mutex::new(child.stdin.take()),
            input: input.unwrap_or_default(),
        });
        // Reaping belongs to the registry from here on.
        drop(child);

        registry.adopt(pid);
        debug!(pid, command = %command, "spawned child");
        bus.publish(
            Event::new(EventKind::ProcessStarted)
                .with_pid(pid)
                .with_command(command.to_string())
                .with_spec(Arc::clone(&spec)),
        );

        let callback = {
            let shared = Arc::clone(&shared);
            let spec = Arc::clone(&spec);
            let command = Arc::clone(&command);
            let bus = bus.clone();
            move |code: i32| {
                let Some(result) = shared.release(&spec, &command, pid, code) else {
                    return;
                };
                let category = result.classified().category;
                debug!(pid, code, category = category.as_label(), "child released");
                bus.publish(
                    Event::new(EventKind::ProcessFinished)
                        .with_pid(pid)
                        .with_command(command.to_string())
                        .with_exit_code(code)
                        .with_reason(category.as_label())
                        .with_result(result),
                );
            }
        };
        if let Err(e) = registry.on_exit(pid, callback) {
            let _ = kill(os_pid(pid), Signal::SIGKILL);
            return Err(e.into());
        }

        Ok(Self {
            pid,
            spec,
            command,
            registry,
            bus,
            shared,
            poll_interval: config.poll_interval_clamped(),
            kill_on_drop: config.kill_on_drop,
        })
    }

    #[inline]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    #[inline]
    pub fn spec(&self) -> &ProcessSpec {
        &self.spec
    }

    /// The expanded command actually executed.
    #[inline]
    pub fn command(&self) -> &Command {
        &self.command
    }

    /// Current state, after a refresh.
    pub fn state(&self) -> ProcessState {
        self.refresh()
    }

    pub fn is_running(&self) -> bool {
        self.refresh() == ProcessState::Running
    }

    pub fn is_stopped(&self) -> bool {
        self.refresh() == ProcessState::Stopped
    }

    pub fn is_done(&self) -> bool {
        self.refresh().is_done()
    }

    /// Exit code, once observed.
    pub fn exit_code(&self) -> Option<i32> {
        self.result().map(|r| r.exit_code())
    }

    /// The materialized result, once released. Never fails on a bad exit code.
    pub fn result(&self) -> Option<ProcessResult> {
        self.refresh();
        self.shared.life().result.clone()
    }

    /// Waits until released, re-checking at the configured poll interval.
    ///
    /// Returns immediately if the exit was already observed. A code outside the
    /// accepted set becomes [`ProcessError::CommandFailed`] or
    /// [`ProcessError::CommandTimedOut`].
    pub async fn wait(&self) -> Result<ProcessResult, ProcessError> {
        self.wait_every(self.poll_interval).await
    }

    /// [`wait`](Self::wait) with an explicit poll interval.
    pub async fn wait_every(&self, interval: Duration) -> Result<ProcessResult, ProcessError> {
        let interval = interval.max(Duration::from_millis(1));
        loop {
            self.refresh();
            if let Some(outcome) = self.outcome() {
                return outcome;
            }
            self.pump();
            tokio::time::sleep(interval).await;
        }
    }

    /// Delivers `signal` if the child is still live.
    ///
    /// Returns whether delivery reached a live process.
    pub fn signal(&self, signal: Signal) -> bool {
        if self.refresh().is_done() {
            return false;
        }
        match kill(os_pid(self.pid), signal) {
            Ok(()) => {
                debug!(pid = self.pid, signal = signal.as_str(), "signal delivered");
                self.bus.publish(
                    Event::new(EventKind::ProcessSignaled)
                        .with_pid(self.pid)
                        .with_signal(signal),
                );
                self.refresh();
                true
            }
            Err(Errno::ESRCH) => false,
            Err(e) => {
                warn!(pid = self.pid, signal = signal.as_str(), error = %e, "signal delivery failed");
                false
            }
        }
    }

    /// Sends `SIGKILL`.
    pub fn kill(&self) -> bool {
        self.signal(Signal::SIGKILL)
    }

    /// Sends the spec's terminate signal, escalating to `SIGKILL` after `grace`.
    ///
    /// See [`timeout::terminate`].
    pub async fn terminate(&self, grace: Option<Duration>) -> Result<bool, ProcessError> {
        timeout::terminate(self, grace).await
    }

    /// Non-blocking read of every unread stdout byte.
    ///
    /// `Some(empty)` while the pipe is open and quiet; `None` once released and
    /// the buffer is exhausted. A discarded channel (see
    /// [`ProcessSpec::with_no_output`]) returns `None` from the start.
    pub fn read_stdout(&self) -> io::Result<Option<Vec<u8>>> {
        self.read_output(OutputChannel::Stdout)
    }

    /// Non-blocking read of every unread stderr byte. See [`read_stdout`](Self::read_stdout).
    pub fn read_stderr(&self) -> io::Result<Option<Vec<u8>>> {
        self.read_output(OutputChannel::Stderr)
    }

    /// Non-blocking read of every unread byte on `channel`.
    pub fn read_output(&self, channel: OutputChannel) -> io::Result<Option<Vec<u8>>> {
        self.refresh();
        let mut life = self.shared.life();
        match channel {
            OutputChannel::Stdout => life.stdout.read(),
            OutputChannel::Stderr => life.stderr.read(),
        }
    }

    /// Waits until stdout has unread bytes, then returns them.
    ///
    /// Returns `None` once released and the buffer is exhausted. Both pipes
    /// keep being pumped while waiting.
    pub async fn read_stdout_blocking(&self) -> io::Result<Option<Vec<u8>>> {
        self.read_output_blocking(OutputChannel::Stdout).await
    }

    /// Waits until stderr has unread bytes. See [`read_stdout_blocking`](Self::read_stdout_blocking).
    pub async fn read_stderr_blocking(&self) -> io::Result<Option<Vec<u8>>> {
        self.read_output_blocking(OutputChannel::Stderr).await
    }

    /// Blocking form of [`read_output`](Self::read_output), re-checking at the poll interval.
    pub async fn read_output_blocking(
        &self,
        channel: OutputChannel,
    ) -> io::Result<Option<Vec<u8>>> {
        loop {
            match self.read_output(channel)? {
                Some(bytes) if bytes.is_empty() => {}
                other => return Ok(other),
            }
            self.pump();
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Output as it arrives, as `(channel, chunk)` pairs.
    ///
    /// Ends once the child is released and both buffers are exhausted. Chunks
    /// yielded here are consumed like any other read.
    ///
    /// ## Example
    /// ```rust
    /// use futures::StreamExt;
    /// use procvisor::{ManagerConfig, OutputChannel, ProcessManager, ProcessSpec};
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let mgr = ProcessManager::new(ManagerConfig::default());
    /// let handle = mgr.spawn(ProcessSpec::new("echo out; echo err >&2")).unwrap();
    ///
    /// let mut stdout = Vec::new();
    /// let mut output = Box::pin(handle.output());
    /// while let Some(item) = output.next().await {
    ///     let (channel, chunk) = item.unwrap();
    ///     if channel == OutputChannel::Stdout {
    ///         stdout.extend(chunk);
    ///     }
    /// }
    /// assert_eq!(stdout, b"out\n");
    /// # }
    /// ```
    pub fn output(&self) -> impl Stream<Item = io::Result<(OutputChannel, Vec<u8>)>> + '_ {
        output::output_stream(self)
    }

    /// Writes `bytes` to the child's stdin and records them in the input buffer.
    ///
    /// Fails with `BrokenPipe` once stdin is closed or the child is released.
    pub fn write_stdin(&self, bytes: &[u8]) -> io::Result<()> {
        {
            let mut stdin = self.shared.stdin();
            let Some(pipe) = stdin.as_mut() else {
                return Err(io::Error::new(ErrorKind::BrokenPipe, "stdin is closed"));
            };
            pipe.write_all(bytes)?;
            pipe.flush()?;
        }
        self.shared.input.append(bytes)
    }

    /// Closes the child's stdin (the child sees end-of-file).
    pub fn close_stdin(&self) {
        self.shared.stdin().take();
    }

    /// Outcome once released: `Ok` for accepted codes, the classified failure otherwise.
    pub(crate) fn outcome(&self) -> Option<Result<ProcessResult, ProcessError>> {
        let result = self.shared.life().result.clone()?;
        Some(if result.succeeded() {
            Ok(result)
        } else {
            Err(ProcessError::from_result(result))
        })
    }

    pub(crate) fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub(crate) fn publish(&self, event: Event) {
        self.bus.publish(event);
    }

    /// Polls the registry, then syncs `Running`/`Stopped` with its suspended flag.
    fn refresh(&self) -> ProcessState {
        self.registry.poll(self.pid);
        let suspended = self.registry.is_suspended(self.pid);

        let mut life = self.shared.life();
        life.state = match life.state {
            ProcessState::Running if suspended => ProcessState::Stopped,
            ProcessState::Stopped if !suspended => ProcessState::Running,
            state => state,
        };
        life.state
    }

    /// Moves available output into the buffers so the child never blocks on a full pipe.
    fn pump(&self) {
        let mut life = self.shared.life();
        if let Err(e) = life.stdout.pump() {
            debug!(pid = self.pid, error = %e, "stdout pump failed");
        }
        if let Err(e) = life.stderr.pump() {
            debug!(pid = self.pid, error = %e, "stderr pump failed");
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if self.kill_on_drop && !self.refresh().is_done() {
            debug!(pid = self.pid, "handle dropped while child is running; killing");
            let _ = kill(os_pid(self.pid), Signal::SIGKILL);
        }
    }
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.pid)
            .field("command", &self.command)
            .finish_non_exhaustive()
    }
}

impl Lifecycle {
    fn new(
        stdout: Option<ChildStdout>,
        stderr: Option<ChildStderr>,
        out: CaptureBuffer,
        err: CaptureBuffer,
    ) -> io::Result<Self> {
        Ok(Self {
            state: ProcessState::Running,
            stdout: match stdout {
                Some(pipe) => PipeDrain::new(pipe, out)?,
                None => PipeDrain::closed(out),
            },
            stderr: match stderr {
                Some(pipe) => PipeDrain::new(pipe, err)?,
                None => PipeDrain::closed(err),
            },
            result: None,
        })
    }
}

/// Builds the OS command: `sh -c` for scripts, argv otherwise.
fn os_command(command: &Command, spec: &ProcessSpec) -> io::Result<OsCommand> {
    let mut os = match command {
        Command::Shell(script) => {
            let mut os = OsCommand::new(SHELL);
            os.arg("-c").arg(script);
            os
        }
        Command::Argv(args) => {
            let Some((program, rest)) = args.split_first() else {
                return Err(io::Error::new(ErrorKind::InvalidInput, "empty argument vector"));
            };
            let mut os = OsCommand::new(program);
            os.args(rest);
            os
        }
    };

    if let Some(dir) = spec.working_dir() {
        os.current_dir(dir);
    }
    if let Some(envs) = spec.envs() {
        os.env_clear().envs(envs);
    }
    os.stdin(Stdio::piped());
    if spec.discards_output() {
        os.stdout(Stdio::null()).stderr(Stdio::null());
    } else {
        os.stdout(Stdio::piped()).stderr(Stdio::piped());
    }
    Ok(os)
}

/// Kills a child whose setup failed and lets the registry reap it silently.
fn abandon(registry: &ExitRegistry, pid: u32) {
    let _ = kill(os_pid(pid), Signal::SIGKILL);
    registry.adopt(pid);
    if let Err(e) = registry.on_exit(pid, |_| {}) {
        warn!(pid, error = %e, "failed to abandon child");
    }
}

#[inline]
fn os_pid(pid: u32) -> Pid {
    Pid::from_raw(pid as i32)
}
