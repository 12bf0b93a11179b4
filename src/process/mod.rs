//! Child processes: what to run, the live handle, and what it produced.
//!
//! ## Contents
//! - [`ProcessSpec`], [`Command`], [`TimeoutSpec`]: immutable spawn description
//! - [`ProcessHandle`], [`ProcessState`]: one live child and its state machine
//! - [`PipeDrain`]: non-blocking pipe reader feeding a capture buffer
//! - [`OutputChannel`]: stdout / stderr tag for incremental output
//! - [`CaptureBuffer`], [`OutputBuffer`], [`Captures`]: where output lands
//! - [`ProcessResult`]: the outcome, materialized once per handle
//! - [`wrapper_prefix`], [`terminate`]: `timeout(1)` wrapping and escalation

mod buffer;
mod drain;
mod handle;
mod output;
mod result;
mod spec;
mod timeout;

pub use buffer::{CaptureBuffer, Captures, OutputBuffer};
pub use drain::PipeDrain;
pub use handle::{ProcessHandle, ProcessState};
pub use output::OutputChannel;
pub use result::ProcessResult;
pub use spec::{Command, ProcessSpec, TimeoutSpec};
pub use timeout::{terminate, wrapper_prefix};
