//! # Capture buffers.
//!
//! [`OutputBuffer`] is the buffered-stream capability the core needs: write,
//! read-to-end, seek, end-of-data query. Any `Read + Write + Seek + Send` value
//! qualifies (an in-memory `Cursor<Vec<u8>>`, a `File`, ...), so the core never
//! assumes a backing medium.
//!
//! [`CaptureBuffer`] wraps one shared buffer and keeps a single **read cursor**:
//! bytes before the cursor were handed to the caller, bytes after it are
//! unread. Appends always land at the end and never move the cursor.
//!
//! ```text
//!   [ consumed ............ | unread ........ ]
//!                           ^ cursor          ^ end (appends go here)
//! ```

use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Buffered stream used to hold captured output.
pub trait OutputBuffer: Send {
    /// Writes `bytes` at the current position.
    fn write_chunk(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Reads everything from the current position to the end.
    fn read_remaining(&mut self) -> io::Result<Vec<u8>>;

    /// Moves the current position.
    fn seek_to(&mut self, pos: SeekFrom) -> io::Result<u64>;

    /// True when the current position is at the end of the data.
    fn is_at_end(&mut self) -> io::Result<bool>;
}

impl<T: Read + Write + Seek + Send> OutputBuffer for T {
    fn write_chunk(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.write_all(bytes)?;
        self.flush()
    }

    fn read_remaining(&mut self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        self.read_to_end(&mut out)?;
        Ok(out)
    }

    fn seek_to(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.seek(pos)
    }

    fn is_at_end(&mut self) -> io::Result<bool> {
        let pos = self.stream_position()?;
        let end = self.seek(SeekFrom::End(0))?;
        self.seek(SeekFrom::Start(pos))?;
        Ok(pos >= end)
    }
}

/// Shared capture buffer with a read cursor.
///
/// Cloning is cheap and yields a handle to the **same** buffer; the handle and
/// its [`ProcessResult`](crate::ProcessResult) observe one cursor.
#[derive(Clone)]
pub struct CaptureBuffer {
    inner: Arc<Mutex<Box<dyn OutputBuffer>>>,
}

impl CaptureBuffer {
    /// Wraps a caller-supplied buffer.
    pub fn new(buffer: impl OutputBuffer + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(buffer))),
        }
    }

    /// In-memory buffer.
    pub fn memory() -> Self {
        Self::new(Cursor::new(Vec::new()))
    }

    /// Appends `bytes` at the end without moving the read cursor.
    pub fn append(&self, bytes: &[u8]) -> io::Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        let mut buf = self.lock();
        let cursor = buf.seek_to(SeekFrom::Current(0))?;
        buf.seek_to(SeekFrom::End(0))?;
        buf.write_chunk(bytes)?;
        buf.seek_to(SeekFrom::Start(cursor))?;
        Ok(())
    }

    /// Returns every unread byte and advances the cursor to the end.
    pub fn read_unread(&self) -> io::Result<Vec<u8>> {
        self.lock().read_remaining()
    }

    /// True if bytes remain after the cursor.
    pub fn has_unread(&self) -> io::Result<bool> {
        Ok(!self.lock().is_at_end()?)
    }

    /// Returns the whole buffer. The read cursor is left where it was.
    pub fn contents(&self) -> io::Result<Vec<u8>> {
        let mut buf = self.lock();
        let cursor = buf.seek_to(SeekFrom::Current(0))?;
        buf.seek_to(SeekFrom::Start(0))?;
        let all = buf.read_remaining();
        buf.seek_to(SeekFrom::Start(cursor))?;
        all
    }

    /// Moves the read cursor back to the start.
    pub fn rewind(&self) -> io::Result<()> {
        self.lock().seek_to(SeekFrom::Start(0)).map(|_| ())
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn OutputBuffer>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for CaptureBuffer {
    fn default() -> Self {
        Self::memory()
    }
}

impl std::fmt::Debug for CaptureBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureBuffer").finish_non_exhaustive()
    }
}

/// Caller-supplied buffers for one spawn. Unset channels use memory buffers.
#[derive(Default)]
pub struct Captures {
    pub stdin: Option<CaptureBuffer>,
    pub stdout: Option<CaptureBuffer>,
    pub stderr: Option<CaptureBuffer>,
}

impl Captures {
    #[must_use]
    pub fn with_stdout(mut self, buffer: impl OutputBuffer + 'static) -> Self {
        self.stdout = Some(CaptureBuffer::new(buffer));
        self
    }

    #[must_use]
    pub fn with_stderr(mut self, buffer: impl OutputBuffer + 'static) -> Self {
        self.stderr = Some(CaptureBuffer::new(buffer));
        self
    }

    #[must_use]
    pub fn with_stdin(mut self, buffer: impl OutputBuffer + 'static) -> Self {
        self.stdin = Some(CaptureBuffer::new(buffer));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_keeps_cursor() {
        let buf = CaptureBuffer::memory();
        buf.append(b"hello ").unwrap();
        buf.append(b"world").unwrap();
        assert!(buf.has_unread().unwrap());
        assert_eq!(buf.read_unread().unwrap(), b"hello world");
        assert!(!buf.has_unread().unwrap());
        assert!(buf.read_unread().unwrap().is_empty());
    }

    #[test]
    fn test_append_after_partial_read() {
        let buf = CaptureBuffer::memory();
        buf.append(b"one").unwrap();
        assert_eq!(buf.read_unread().unwrap(), b"one");
        buf.append(b"two").unwrap();
        buf.append(b"three").unwrap();
        assert_eq!(buf.read_unread().unwrap(), b"twothree");
    }

    #[test]
    fn test_contents_keeps_cursor() {
        let buf = CaptureBuffer::memory();
        buf.append(b"abc").unwrap();
        assert_eq!(buf.contents().unwrap(), b"abc");
        assert!(buf.has_unread().unwrap());
        let _ = buf.read_unread().unwrap();
        assert_eq!(buf.contents().unwrap(), b"abc");
        assert_eq!(buf.contents().unwrap(), b"abc");
        buf.rewind().unwrap();
        assert_eq!(buf.read_unread().unwrap(), b"abc");
    }

    #[test]
    fn test_clones_share_cursor() {
        let a = CaptureBuffer::memory();
        let b = a.clone();
        a.append(b"xy").unwrap();
        assert_eq!(b.read_unread().unwrap(), b"xy");
        assert!(!a.has_unread().unwrap());
    }

    #[test]
    fn test_file_backed() {
        let file = tempfile::tempfile().unwrap();
        let buf = CaptureBuffer::new(file);
        buf.append(b"on disk").unwrap();
        assert_eq!(buf.read_unread().unwrap(), b"on disk");
        assert_eq!(buf.contents().unwrap(), b"on disk");
    }
}
