//! # Incremental output.
//!
//! [`output_stream`] turns a handle's two output pipes into one stream of
//! `(channel, chunk)` items, yielded as the child writes them.
//!
//! ```text
//!   loop:
//!     queued chunk?           ─► yield it
//!     both channels finished? ─► end
//!     read stdout, stderr     ─► queue non-empty chunks, drop channels that returned None
//!     nothing queued          ─► sleep(poll_interval)
//! ```
//!
//! ## Rules
//! - Within one channel, chunks arrive in write order. Across channels, stdout
//!   is read before stderr on every round.
//! - The stream ends once the handle is released and both buffers are exhausted.
//! - Bytes yielded here are consumed: later reads and the result's
//!   `read_*_buffer` start after them.
//! - A read error is yielded once, after any chunks already read, and ends
//!   the stream.

use std::collections::VecDeque;
use std::fmt;
use std::io;

use futures::Stream;

use super::ProcessHandle;

/// One of the child's output channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputChannel {
    /// File descriptor 1.
    Stdout,
    /// File descriptor 2.
    Stderr,
}

impl OutputChannel {
    /// The child-side file descriptor number.
    pub fn fd(self) -> i32 {
        match self {
            OutputChannel::Stdout => 1,
            OutputChannel::Stderr => 2,
        }
    }
}

impl fmt::Display for OutputChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputChannel::Stdout => f.write_str("stdout"),
            OutputChannel::Stderr => f.write_str("stderr"),
        }
    }
}

struct Reader<'a> {
    handle: &'a ProcessHandle,
    queued: VecDeque<(OutputChannel, Vec<u8>)>,
    open: Vec<OutputChannel>,
    failed: Option<io::Error>,
}

impl Reader<'_> {
    /// Reads every open channel once. An error closes all channels.
    fn collect(&mut self) {
        for channel in self.open.clone() {
            match self.handle.read_output(channel) {
                Ok(Some(bytes)) if bytes.is_empty() => {}
                Ok(Some(bytes)) => self.queued.push_back((channel, bytes)),
                Ok(None) => self.open.retain(|c| *c != channel),
                Err(e) => {
                    self.open.clear();
                    self.failed = Some(e);
                    return;
                }
            }
        }
    }
}

/// Streams `(channel, chunk)` pairs from `handle` until it is released and drained.
pub(crate) fn output_stream(
    handle: &ProcessHandle,
) -> impl Stream<Item = io::Result<(OutputChannel, Vec<u8>)>> + '_ {
    let reader = Reader {
        handle,
        queued: VecDeque::new(),
        open: vec![OutputChannel::Stdout, OutputChannel::Stderr],
        failed: None,
    };

    futures::stream::unfold(reader, |mut reader| async move {
        loop {
            if let Some(item) = reader.queued.pop_front() {
                return Some((Ok(item), reader));
            }
            if let Some(e) = reader.failed.take() {
                return Some((Err(e), reader));
            }
            if reader.open.is_empty() {
                return None;
            }
            reader.collect();
            if reader.queued.is_empty() && !reader.open.is_empty() {
                tokio::time::sleep(reader.handle.poll_interval()).await;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_fds() {
        assert_eq!(OutputChannel::Stdout.fd(), 1);
        assert_eq!(OutputChannel::Stderr.fd(), 2);
        assert_eq!(OutputChannel::Stderr.to_string(), "stderr");
    }
}
