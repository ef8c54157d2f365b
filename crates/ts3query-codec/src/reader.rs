use std::io::{ErrorKind, Read};

use bytes::{Bytes, BytesMut};

use crate::error::{CodecError, Result};
use crate::line::{decode_line, DEFAULT_MAX_LINE};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete lines from any `Read` stream.
///
/// Bytes past the last complete line stay buffered between calls, so a read
/// that fails with a timeout never loses data.
pub struct LineReader<T> {
    inner: T,
    buf: BytesMut,
    max_line: usize,
}

impl<T: Read> LineReader<T> {
    /// Create a new line reader with the default maximum line length.
    pub fn new(inner: T) -> Self {
        Self::with_max_line(inner, DEFAULT_MAX_LINE)
    }

    /// Create a new line reader with an explicit maximum line length.
    pub fn with_max_line(inner: T, max_line: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            max_line,
        }
    }

    /// Read the next complete line (blocking), delimiter included.
    ///
    /// Returns `Err(CodecError::ConnectionClosed)` when EOF is reached.
    /// Timeouts of the inner stream surface as `CodecError::Io` with kind
    /// `WouldBlock` or `TimedOut`.
    pub fn read_line(&mut self) -> Result<Bytes> {
        loop {
            if let Some(line) = decode_line(&mut self.buf, self.max_line)? {
                return Ok(line);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(CodecError::Io(err)),
            };

            if read == 0 {
                return Err(CodecError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Bytes received but not yet returned as a line.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}
