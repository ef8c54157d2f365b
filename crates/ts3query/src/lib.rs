//! Client for the TeamSpeak 3 query protocol.
//!
//! One connection carries commands and their responses interleaved with
//! asynchronous events. The [`Session`] keeps the two apart, the
//! [`QueryBuilder`] compiles commands, and [`FileTransfer`] moves files over
//! the separate data channel.
//!
//! # Crate Structure
//!
//! - [`codec`]: escaping, line framing, record and outcome decoding
//! - [`transport`]: plain TCP and (behind `ssh`) encrypted shell carriers
//! - [`session`]: command/response multiplexer and event delivery
//! - [`transfer`]: file transfer negotiation and the raw data channel
//!
//! ```no_run
//! use ts3query::{connect, QueryBuilder};
//!
//! let session = connect("127.0.0.1:10011")?;
//! session.execute(
//!     &QueryBuilder::new("login")
//!         .param("client_login_name", "serveradmin")
//!         .param("client_login_password", "secret"),
//! )?;
//! session.execute(&QueryBuilder::new("use").param("sid", 1))?;
//!
//! let clients = session.execute(&QueryBuilder::new("clientlist").option("uid"))?;
//! for client in clients.items()? {
//!     println!("{:?}", client.get("client_nickname"));
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Re-export codec types.
pub mod codec {
    pub use ts3query_codec::*;
}

/// Re-export transport types.
pub mod transport {
    pub use ts3query_transport::*;
}

/// Re-export session types.
pub mod session {
    pub use ts3query_session::*;
}

/// Re-export file transfer types.
pub mod transfer {
    pub use ts3query_transfer::*;
}

pub use ts3query_codec::{escape, unescape, Outcome, Record};
pub use ts3query_session::{
    connect, connect_with_config, Event, Pipe, QueryBuilder, QueryError, Response, Session,
    SessionConfig, StopSignal,
};
#[cfg(feature = "ssh")]
pub use ts3query_session::connect_ssh;
#[cfg(feature = "ssh")]
pub use ts3query_transport::SshCredentials;
pub use ts3query_transfer::{
    DownloadRequest, FileTransfer, Progress, TransferConfig, TransferError, UploadRequest,
};
pub use ts3query_transport::{Carrier, TransportConfig};
