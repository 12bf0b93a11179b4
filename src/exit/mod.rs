//! # Exit codes and classification.
//!
//! - [`code`] stable exit code constants
//! - [`ExitCategory`], [`ClassifiedExit`] semantic classification
//! - [`is_acceptable`] the failure decision against an accepted set

mod classify;
pub mod code;

pub use classify::{ClassifiedExit, ExitCategory, is_acceptable, signal_name};

pub(crate) use classify::exit_code_of;
