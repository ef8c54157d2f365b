/// Errors that can occur while framing or decoding query data.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// A property key is not valid UTF-8.
    #[error("property key is not valid text: {key_lossy:?}")]
    InvalidKey { key_lossy: String },

    /// A line grew past the configured maximum without a delimiter.
    #[error("line too long ({len} bytes, max {max})")]
    LineTooLong { len: usize, max: usize },

    /// A response did not end with an `error id=.. msg=..` line.
    #[error("response has no outcome line")]
    MissingOutcome,

    /// The outcome line lacks an `id` property.
    #[error("malformed outcome line: {0}")]
    MalformedOutcome(String),

    /// An I/O error occurred while reading or writing lines.
    #[error("line I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended before a complete line was received.
    #[error("connection closed (incomplete line)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, CodecError>;
