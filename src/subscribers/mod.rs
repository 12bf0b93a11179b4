//! # Event subscribers.
//!
//! Provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out and the
//! built-in subscribers.
//!
//! ```text
//! ProcessHandle ── publish(Event) ──► Bus ──► manager listener ──► SubscriberSet
//!                                                                   │
//!                                                     ┌─────────────┼─────────────┐
//!                                                     ▼             ▼             ▼
//!                                                  LiveSet      LogWriter      Custom
//! ```

mod embedded;
mod set;
mod subscribe;

pub use embedded::LiveSet;
#[cfg(feature = "logging")]
pub use embedded::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
