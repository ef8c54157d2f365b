use std::sync::Arc;
use std::time::Duration;

use ts3query_codec::CodecError;
use ts3query_transport::TransportError;

/// Errors that can occur in session operations.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// Transport-level error. Fatal to the session.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A response or event could not be decoded.
    #[error("malformed data: {0}")]
    Malformed(Arc<CodecError>),

    /// The server answered with a non-zero outcome id.
    #[error("query failed with id {id}: {msg}")]
    Protocol {
        id: String,
        msg: String,
        extra_msg: Option<String>,
    },

    /// Nothing arrived within the requested bound.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The session has been closed.
    #[error("session closed")]
    Closed,

    /// The query cannot be rendered as a single protocol line.
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

impl From<CodecError> for QueryError {
    fn from(err: CodecError) -> Self {
        Self::Malformed(Arc::new(err))
    }
}

impl QueryError {
    /// Outcome id of a protocol error.
    pub fn protocol_id(&self) -> Option<&str> {
        match self {
            Self::Protocol { id, .. } => Some(id),
            _ => None,
        }
    }

    /// Whether the session is unusable after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Closed)
    }
}

pub type Result<T> = std::result::Result<T, QueryError>;
