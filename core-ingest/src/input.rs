//! # Growable Byte Input
//!
//! Exposes a still-downloading, in-memory byte buffer to the decode library
//! as a seekable, randomly-readable stream.
//!
//! Two pieces:
//! - [`InputBuffer`]: the shared, append-only backing store plus a `closed`
//!   flag set once the upstream pipe will never produce another byte.
//! - [`InputReader`]: a per-decode-session cursor implementing `Read`,
//!   `Seek` and symphonia's [`MediaSource`]. End-relative seeks and the
//!   size query always consult the *live* length, so the decode library can
//!   be pointed at a file that is still growing without reopening anything.
//!
//! A reader returning zero bytes means "no more data *currently*
//! available"; whether that is end-of-stream is decided upstream by
//! checking [`InputBuffer::is_closed`].

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use parking_lot::RwLock;
use symphonia::core::io::MediaSource;

struct BufferInner {
    data: Vec<u8>,
    closed: bool,
}

/// Shared append-only byte buffer fed by the upstream pipe.
///
/// Cloning yields another handle to the same storage. The buffer grows
/// monotonically and never shrinks within a session.
#[derive(Clone)]
pub struct InputBuffer {
    inner: Arc<RwLock<BufferInner>>,
}

impl InputBuffer {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(BufferInner {
                data: Vec::new(),
                closed: false,
            })),
        }
    }

    /// Append a batch of bytes in arrival order.
    pub fn append(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.inner.write().data.extend_from_slice(bytes);
    }

    /// Mark the buffer complete: no more bytes will ever arrive.
    pub fn close(&self) {
        self.inner.write().closed = true;
    }

    /// Current length in bytes. Grows over the session.
    pub fn len(&self) -> usize {
        self.inner.read().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.read().closed
    }

    /// Copy bytes starting at `pos` into `out`, returning the count copied.
    /// Returns 0 when `pos` is at or past the current end.
    fn read_at(&self, pos: usize, out: &mut [u8]) -> usize {
        let inner = self.inner.read();
        if pos >= inner.data.len() {
            return 0;
        }
        let n = out.len().min(inner.data.len() - pos);
        out[..n].copy_from_slice(&inner.data[pos..pos + n]);
        n
    }

    /// Open a fresh cursor at position 0 for a new decode attempt.
    pub fn reader(&self) -> InputReader {
        InputReader {
            buffer: self.clone(),
            pos: 0,
        }
    }
}

impl Default for InputBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Cursor over an [`InputBuffer`], handed to the decode library.
///
/// Invariant: `0 <= pos <= buffer.len()` after every operation.
pub struct InputReader {
    buffer: InputBuffer,
    pos: u64,
}

impl InputReader {
    /// Current cursor position.
    pub fn position(&self) -> u64 {
        self.pos
    }
}

impl Read for InputReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.buffer.read_at(self.pos as usize, buf);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for InputReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        // End-relative addressing uses the current length, which changes as
        // bytes arrive; callers must re-query rather than cache.
        let len = self.buffer.len() as i64;
        let target = match pos {
            SeekFrom::Start(n) => n as i64,
            SeekFrom::Current(delta) => self.pos as i64 + delta,
            SeekFrom::End(delta) => len + delta,
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of buffer",
            ));
        }
        self.pos = (target.min(len)) as u64;
        Ok(self.pos)
    }
}

impl MediaSource for InputReader {
    fn is_seekable(&self) -> bool {
        true
    }

    /// The size query: reports the live length of the growing buffer.
    fn byte_len(&self) -> Option<u64> {
        Some(self.buffer.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_is_bounded_by_available_bytes() {
        let buffer = InputBuffer::new();
        buffer.append(&[1, 2, 3]);

        let mut reader = buffer.reader();
        let mut out = [0u8; 8];
        assert_eq!(reader.read(&mut out).unwrap(), 3);
        assert_eq!(&out[..3], &[1, 2, 3]);

        // Exhausted but not closed: zero bytes, not an error.
        assert_eq!(reader.read(&mut out).unwrap(), 0);
        assert!(!buffer.is_closed());
    }

    #[test]
    fn read_resumes_after_append() {
        let buffer = InputBuffer::new();
        buffer.append(&[1, 2]);

        let mut reader = buffer.reader();
        let mut out = [0u8; 4];
        assert_eq!(reader.read(&mut out).unwrap(), 2);
        assert_eq!(reader.read(&mut out).unwrap(), 0);

        buffer.append(&[3, 4]);
        assert_eq!(reader.read(&mut out).unwrap(), 2);
        assert_eq!(&out[..2], &[3, 4]);
        assert_eq!(reader.position(), 4);
    }

    #[test]
    fn seek_variants() {
        let buffer = InputBuffer::new();
        buffer.append(&[0, 1, 2, 3, 4, 5, 6, 7]);
        let mut reader = buffer.reader();

        assert_eq!(reader.seek(SeekFrom::Start(4)).unwrap(), 4);
        assert_eq!(reader.seek(SeekFrom::Current(-2)).unwrap(), 2);
        assert_eq!(reader.seek(SeekFrom::End(-3)).unwrap(), 5);
        assert!(reader.seek(SeekFrom::Current(-100)).is_err());
    }

    #[test]
    fn end_relative_seek_tracks_growth() {
        let buffer = InputBuffer::new();
        buffer.append(&[0; 10]);
        let mut reader = buffer.reader();

        assert_eq!(reader.seek(SeekFrom::End(0)).unwrap(), 10);
        assert_eq!(reader.byte_len(), Some(10));

        buffer.append(&[0; 5]);
        assert_eq!(reader.seek(SeekFrom::End(0)).unwrap(), 15);
        assert_eq!(reader.byte_len(), Some(15));
    }

    #[test]
    fn seek_clamps_to_current_length() {
        let buffer = InputBuffer::new();
        buffer.append(&[0; 4]);
        let mut reader = buffer.reader();

        assert_eq!(reader.seek(SeekFrom::Start(100)).unwrap(), 4);
        assert_eq!(reader.position(), 4);
    }

    #[test]
    fn independent_cursors_share_storage() {
        let buffer = InputBuffer::new();
        buffer.append(b"abcd");

        let mut first = buffer.reader();
        let mut second = buffer.reader();
        let mut out = [0u8; 2];

        first.read(&mut out).unwrap();
        assert_eq!(first.position(), 2);
        assert_eq!(second.position(), 0);

        second.read(&mut out).unwrap();
        assert_eq!(&out, b"ab");
    }
}
