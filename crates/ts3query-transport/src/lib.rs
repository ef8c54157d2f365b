//! Line transports for the query protocol.
//!
//! A [`Transport`] delivers whole `\n\r`-terminated lines over one of two
//! carriers:
//! - [`TcpCarrier`], the plain stream interface
//! - `SshCarrier` (feature `ssh`), a shell channel in an SSH session
//!
//! Connecting discards the carrier's greeting banner, so the first line a
//! caller reads is real traffic.

pub mod config;
pub mod error;
pub mod tcp;
pub mod traits;

#[cfg(feature = "ssh")]
pub mod ssh;

pub use config::{
    TransportConfig, CLIENT_QUERY_GREETING_LINES, CLIENT_QUERY_PORT, SERVER_QUERY_PORT,
    SERVER_QUERY_SSH_PORT,
};
pub use error::{Result, TransportError};
pub use tcp::TcpCarrier;
pub use traits::{discard_greeting, Carrier, Transport};

#[cfg(feature = "ssh")]
pub use ssh::{SshCarrier, SshCredentials};
