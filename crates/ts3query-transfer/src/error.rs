use ts3query_session::QueryError;

/// Errors that can occur while negotiating or running a file transfer.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// The negotiating command failed.
    #[error("transfer negotiation failed: {0}")]
    Session(#[from] QueryError),

    /// The server refused the transfer (`status`/`msg` instead of a key).
    #[error("transfer rejected with status {status}: {msg}")]
    Rejected { status: String, msg: String },

    /// The negotiation response lacks a required field.
    #[error("transfer response is missing `{0}`")]
    MissingField(&'static str),

    /// A negotiation field could not be interpreted.
    #[error("transfer response field `{field}` has invalid value {value:?}")]
    InvalidField { field: &'static str, value: String },

    /// The start offset lies beyond the end of the input.
    #[error("offset {offset} is beyond the input size {size}")]
    InvalidOffset { offset: u64, size: u64 },

    /// A socket or file error interrupted the data phase.
    #[error("transfer failed after {transferred} bytes (from offset {offset}): {source}")]
    Io {
        transferred: u64,
        offset: u64,
        source: std::io::Error,
    },

    /// The data channel closed before the expected number of bytes moved.
    #[error("transfer incomplete: {transferred} of {expected} bytes (from offset {offset})")]
    Incomplete {
        transferred: u64,
        offset: u64,
        expected: u64,
    },
}

impl TransferError {
    /// Absolute position to resume from, for data-phase failures.
    pub fn resume_offset(&self) -> Option<u64> {
        match self {
            Self::Io {
                transferred,
                offset,
                ..
            }
            | Self::Incomplete {
                transferred,
                offset,
                ..
            } => Some(offset + transferred),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransferError>;
