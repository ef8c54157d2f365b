use std::io::ErrorKind;
use std::time::Duration;

use ts3query_codec::CodecError;

/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to connect to the specified address.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    /// The address did not resolve to anything usable.
    #[error("failed to resolve {addr}: {source}")]
    Resolve {
        addr: String,
        source: std::io::Error,
    },

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No complete line arrived within the requested bound.
    #[error("timed out after {0:?} waiting for data")]
    Timeout(Duration),

    /// The carrier has been closed, locally or by the peer.
    #[error("transport closed")]
    Closed,

    /// A line exceeded the configured maximum length.
    #[error("line too long ({len} bytes, max {max})")]
    LineTooLong { len: usize, max: usize },

    /// The SSH layer reported an error.
    #[cfg(feature = "ssh")]
    #[error("ssh error: {0}")]
    Ssh(#[from] ssh2::Error),

    /// The server did not accept the supplied credentials.
    #[error("authentication failed for user {username}")]
    Auth { username: String },
}

impl TransportError {
    /// Map a line-codec failure onto the transport taxonomy.
    ///
    /// `timeout` is the bound that was in force for the failed read; it is
    /// reported back in [`TransportError::Timeout`].
    pub fn from_codec(err: CodecError, timeout: Option<Duration>) -> Self {
        match err {
            CodecError::Io(io)
                if matches!(io.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                Self::Timeout(timeout.unwrap_or_default())
            }
            CodecError::Io(io) if is_disconnect(io.kind()) => Self::Closed,
            CodecError::Io(io) => Self::Io(io),
            CodecError::ConnectionClosed => Self::Closed,
            CodecError::LineTooLong { len, max } => Self::LineTooLong { len, max },
            other => Self::Io(std::io::Error::new(ErrorKind::InvalidData, other)),
        }
    }

    /// Whether the error leaves the carrier unusable.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Timeout(_))
    }
}

fn is_disconnect(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::BrokenPipe
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::UnexpectedEof
    )
}

pub type Result<T> = std::result::Result<T, TransportError>;
