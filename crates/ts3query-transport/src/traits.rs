use std::fmt;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::debug;

use crate::error::{Result, TransportError};

/// The concrete byte stream underneath a [`Transport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Carrier {
    /// Plain TCP stream.
    Tcp,
    /// Shell channel inside an authenticated SSH session.
    Ssh,
}

impl Carrier {
    /// Number of greeting lines the server query sends on this carrier.
    pub fn greeting_lines(self) -> usize {
        match self {
            Self::Tcp => 2,
            // The shell surfaces extra banner text.
            Self::Ssh => 4,
        }
    }

    /// Carrier name for diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Ssh => "ssh",
        }
    }
}

impl fmt::Display for Carrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A connected, line-oriented byte stream.
///
/// Lines are returned with their `\n\r` delimiter attached. Every read takes
/// a timeout and reports expiry as [`TransportError::Timeout`]; a timed-out
/// read never loses buffered data.
pub trait Transport: Send {
    /// Read the next complete line. `None` waits indefinitely.
    fn read_line(&mut self, timeout: Option<Duration>) -> Result<Bytes>;

    /// Write `line` followed by the delimiter.
    fn write_line(&mut self, line: &[u8]) -> Result<()>;

    /// Close the carrier. Safe to call more than once.
    fn close(&mut self);

    /// Whether [`Transport::close`] ran or the peer hung up.
    fn is_closed(&self) -> bool;

    /// Which carrier this is.
    fn carrier(&self) -> Carrier;

    /// Host name or address the transport connected to, if known.
    fn peer_host(&self) -> Option<&str> {
        None
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read_line(&mut self, timeout: Option<Duration>) -> Result<Bytes> {
        (**self).read_line(timeout)
    }

    fn write_line(&mut self, line: &[u8]) -> Result<()> {
        (**self).write_line(line)
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }

    fn carrier(&self) -> Carrier {
        (**self).carrier()
    }

    fn peer_host(&self) -> Option<&str> {
        (**self).peer_host()
    }
}

/// Read and drop the first `lines` lines, all within `timeout`.
///
/// Returns the discarded lines for diagnostics.
pub fn discard_greeting<T: Transport + ?Sized>(
    transport: &mut T,
    lines: usize,
    timeout: Duration,
) -> Result<Vec<Bytes>> {
    let deadline = Instant::now() + timeout;
    let mut greeting = Vec::with_capacity(lines);

    while greeting.len() < lines {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(TransportError::Timeout(timeout));
        }
        let line = match transport.read_line(Some(remaining)) {
            Ok(line) => line,
            Err(TransportError::Timeout(_)) => return Err(TransportError::Timeout(timeout)),
            Err(err) => return Err(err),
        };
        debug!(
            carrier = %transport.carrier(),
            line = %String::from_utf8_lossy(ts3query_codec::trim_delimiter(&line)),
            "discarding greeting line"
        );
        greeting.push(line);
    }

    Ok(greeting)
}
