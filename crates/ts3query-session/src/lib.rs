//! Query sessions: command execution, response matching and events.
//!
//! A [`Session`] owns one transport. Commands are built with
//! [`QueryBuilder`], sent with [`Session::execute`], and answered in FIFO
//! order; unsolicited `notify*` lines surface through
//! [`Session::wait_for_event`] or [`Session::run_events`].

pub mod builder;
pub mod connector;
pub mod control;
pub mod error;
pub mod response;
pub mod session;

pub use builder::{ParamValue, Pipe, QueryBuilder};
#[cfg(feature = "ssh")]
pub use connector::connect_ssh;
pub use connector::{connect, connect_with_config};
pub use control::{StopSignal, EVENT_PREFIX, KEEPALIVE_LINE, QUIT_COMMAND};
pub use error::{QueryError, Result};
pub use response::{Event, Parsed, Response, ALREADY_MEMBER_OF_CHANNEL, DATABASE_EMPTY_RESULT};
pub use session::{Session, SessionConfig, SessionState};
