//! # Non-blocking pipe draining.
//!
//! A [`PipeDrain`] owns the read end of one child output pipe together with the
//! [`CaptureBuffer`] that receives its bytes.
//!
//! ## Rules
//! - The pipe is switched to `O_NONBLOCK` on construction; no read ever blocks.
//! - [`pump`](PipeDrain::pump) moves available bytes into the buffer **without**
//!   consuming them (the caller has not seen them yet).
//! - [`read`](PipeDrain::read) pumps, then hands every unread byte to the caller.
//! - [`drain`](PipeDrain::drain) pumps one last time and closes the pipe. Once a
//!   pipe is closed, its unread data is lost forever, so this must run before
//!   the child is released.
//! - After close, reads replay the buffer and return `None` once it is exhausted.

use std::io::{self, ErrorKind, Read};
use std::os::fd::AsRawFd;

use nix::fcntl::{FcntlArg, OFlag, fcntl};

use super::CaptureBuffer;

const CHUNK: usize = 8 * 1024;

/// Read end of a child pipe plus its capture buffer.
pub struct PipeDrain<R> {
    pipe: Option<R>,
    buffer: CaptureBuffer,
}

impl<R: Read + AsRawFd> PipeDrain<R> {
    /// Takes ownership of `pipe` and switches it to non-blocking mode.
    pub fn new(pipe: R, buffer: CaptureBuffer) -> io::Result<Self> {
        set_nonblocking(&pipe)?;
        Ok(Self {
            pipe: Some(pipe),
            buffer,
        })
    }
}

impl<R: Read> PipeDrain<R> {
    /// A drain with no pipe (channel not captured); reads only replay `buffer`.
    pub fn closed(buffer: CaptureBuffer) -> Self {
        Self { pipe: None, buffer }
    }

    /// True while the OS pipe is still held.
    #[inline]
    pub fn is_open(&self) -> bool {
        self.pipe.is_some()
    }

    /// The capture buffer.
    #[inline]
    pub fn buffer(&self) -> &CaptureBuffer {
        &self.buffer
    }

    /// Copies currently available bytes into the buffer, leaving them unread.
    ///
    /// Returns the number of bytes moved.
    pub fn pump(&mut self) -> io::Result<usize> {
        let Some(pipe) = self.pipe.as_mut() else {
            return Ok(0);
        };
        let bytes = read_available(pipe)?;
        self.buffer.append(&bytes)?;
        Ok(bytes.len())
    }

    /// Returns every unread byte, including anything newly available on the pipe.
    ///
    /// - pipe open: `Some(bytes)`, possibly empty
    /// - pipe closed: `Some(bytes)` while the buffer has unread data, then `None`
    pub fn read(&mut self) -> io::Result<Option<Vec<u8>>> {
        if self.is_open() {
            self.pump()?;
            return self.buffer.read_unread().map(Some);
        }
        if self.buffer.has_unread()? {
            self.buffer.read_unread().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Final pump followed by closing the pipe. Idempotent.
    pub fn drain(&mut self) -> io::Result<usize> {
        let moved = self.pump();
        self.pipe = None;
        moved
    }
}

/// Reads until the pipe would block or reports end-of-file.
fn read_available<R: Read>(pipe: &mut R) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut chunk = [0u8; CHUNK];
    loop {
        match pipe.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => out.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(out)
}

fn set_nonblocking<F: AsRawFd>(fd: &F) -> io::Result<()> {
    let raw = fd.as_raw_fd();
    let flags = OFlag::from_bits_truncate(fcntl(raw, FcntlArg::F_GETFL)?);
    fcntl(raw, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::net::UnixStream;

    fn pair() -> (UnixStream, PipeDrain<UnixStream>, CaptureBuffer) {
        let (writer, reader) = UnixStream::pair().unwrap();
        let buffer = CaptureBuffer::memory();
        let drain = PipeDrain::new(reader, buffer.clone()).unwrap();
        (writer, drain, buffer)
    }

    #[test]
    fn test_read_empty_pipe_does_not_block() {
        let (_writer, mut drain, _) = pair();
        assert_eq!(drain.read().unwrap(), Some(Vec::new()));
    }

    #[test]
    fn test_read_returns_new_bytes_once() {
        let (mut writer, mut drain, _) = pair();
        writer.write_all(b"abc").unwrap();
        assert_eq!(drain.read().unwrap(), Some(b"abc".to_vec()));
        assert_eq!(drain.read().unwrap(), Some(Vec::new()));
    }

    #[test]
    fn test_pump_keeps_bytes_unread() {
        let (mut writer, mut drain, buffer) = pair();
        writer.write_all(b"first").unwrap();
        assert_eq!(drain.pump().unwrap(), 5);
        writer.write_all(b"second").unwrap();
        assert_eq!(drain.read().unwrap(), Some(b"firstsecond".to_vec()));
        assert_eq!(buffer.contents().unwrap(), b"firstsecond");
    }

    #[test]
    fn test_drain_preserves_unread_then_sentinel() {
        let (mut writer, mut drain, _) = pair();
        writer.write_all(b"early").unwrap();
        assert_eq!(drain.read().unwrap(), Some(b"early".to_vec()));
        writer.write_all(b"late").unwrap();
        drop(writer);

        drain.drain().unwrap();
        assert!(!drain.is_open());
        assert_eq!(drain.read().unwrap(), Some(b"late".to_vec()));
        assert_eq!(drain.read().unwrap(), None);
        assert_eq!(drain.read().unwrap(), None);
    }

    #[test]
    fn test_drain_is_idempotent() {
        let (mut writer, mut drain, buffer) = pair();
        writer.write_all(b"x").unwrap();
        assert_eq!(drain.drain().unwrap(), 1);
        assert_eq!(drain.drain().unwrap(), 0);
        assert_eq!(buffer.contents().unwrap(), b"x");
    }

    #[test]
    fn test_closed_drain_replays_buffer() {
        let buffer = CaptureBuffer::memory();
        buffer.append(b"kept").unwrap();
        let mut drain: PipeDrain<UnixStream> = PipeDrain::closed(buffer);
        assert_eq!(drain.read().unwrap(), Some(b"kept".to_vec()));
        assert_eq!(drain.read().unwrap(), None);
    }
}
