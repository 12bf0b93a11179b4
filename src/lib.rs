//! # procvisor
//!
//! **Procvisor** spawns and supervises external child processes on Unix.
//!
//! It captures each child's output without loss, observes its exit exactly
//! once (whether the exit is seen by polling or by `SIGCHLD`, in either order),
//! enforces deadlines through `timeout(1)`, and classifies exit codes into
//! domain errors.
//!
//! ## Architecture
//! ```text
//!   ProcessSpec ──► ProcessManager::spawn()
//!                        │
//!                        ├─ ExitRegistry::track()     (before fork: SIGCHLD subscribed on 0→1)
//!                        ├─ fork/exec  [timeout ...] command
//!                        ├─ ExitRegistry::adopt(pid)  (immediate poll)
//!                        ├─ Bus ◄── ProcessStarted
//!                        └─ ExitRegistry::on_exit(pid, completion)
//!                                   │
//!   ┌───────────────────────────────┴─────────────────────────────────────┐
//!   │ ExitRegistry (process-wide, one lock)                               │
//!   │   SIGCHLD listener ─┐                                               │
//!   │   handle.poll()  ───┼─► waitpid(adopted pid) ─► exit code           │
//!   │                     │       pending[pid]   ─► completion(code)      │
//!   │                     │       else           ─► unclaimed[pid] = code │
//!   └─────────────────────┴───────────────────────────────────────────────┘
//!                                   │
//!                         completion(code): drain pipes, close, build
//!                         ProcessResult, Bus ◄── ProcessFinished
//!                                   │
//!   ProcessHandle::wait() ◄─────────┘   (poll loop; accepted code → Ok,
//!                                        otherwise CommandFailed / CommandTimedOut)
//!
//!   Bus ──► manager listener ──► SubscriberSet ──► Subscribe::on_event (per-subscriber queue)
//! ```
//!
//! ## Features
//! | Area              | Description                                               | Key types                                   |
//! |-------------------|-----------------------------------------------------------|---------------------------------------------|
//! | **Spawning**      | Argv or shell commands, cwd, replaced environment         | [`ProcessManager`], [`ProcessSpec`]         |
//! | **Handles**       | State machine, signals, non-blocking output, stdin        | [`ProcessHandle`], [`ProcessState`]         |
//! | **Output**        | Incremental `(channel, chunk)` stream, blocking reads     | [`ProcessHandle::output`], [`OutputChannel`] |
//! | **Deadlines**     | `timeout(1)` wrapping and `SIGKILL` escalation            | [`TimeoutSpec`], [`terminate`]              |
//! | **Exit codes**    | Stable constants and classification                       | [`exit::code`], [`ExitCategory`]            |
//! | **Events**        | Started / finished notifications with spec and result     | [`Event`], [`Subscribe`]                    |
//! | **Errors**        | Typed spawn and completion failures                       | [`ProcessError`], [`RegistryError`]         |
//!
//! ## Optional features
//! - `logging`: exports [`LogWriter`], a subscriber that renders events via `tracing`.
//!
//! ## Example
//! ```rust
//! use procvisor::{Command, ManagerConfig, ProcessError, ProcessManager, ProcessSpec, TimeoutSpec};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = ProcessManager::new(ManagerConfig::default());
//!
//!     let spec = ProcessSpec::new(Command::argv(["sleep", "1"]))
//!         .with_timeout(TimeoutSpec::new(0.05));
//!
//!     match manager.run(spec).await {
//!         Err(ProcessError::CommandTimedOut { result }) => assert_eq!(result.exit_code(), 124),
//!         other => panic!("unexpected: {other:?}"),
//!     }
//!     Ok(())
//! }
//! ```

#[cfg(not(unix))]
compile_error!("procvisor relies on SIGCHLD and waitpid and only supports Unix targets");

mod core;
mod error;
pub mod events;
pub mod exit;
mod process;
pub mod subscribers;

pub use crate::core::{ExitCallback, ExitRegistry, ManagerBuilder, ManagerConfig, ProcessManager};
pub use error::{ProcessError, RegistryError};
pub use events::{Bus, Event, EventKind};
pub use exit::{ClassifiedExit, ExitCategory, is_acceptable, signal_name};
pub use process::{
    CaptureBuffer, Captures, Command, OutputBuffer, OutputChannel, PipeDrain, ProcessHandle,
    ProcessResult, ProcessSpec, ProcessState, TimeoutSpec, terminate, wrapper_prefix,
};
pub use subscribers::{LiveSet, Subscribe, SubscriberSet};

#[cfg(feature = "logging")]
pub use subscribers::LogWriter;

/// Signal type accepted by [`ProcessHandle::signal`] and [`TimeoutSpec`].
pub use nix::sys::signal::Signal;
