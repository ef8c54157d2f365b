use std::time::Duration;

use ts3query_codec::DEFAULT_MAX_LINE;

/// Default port of the server query over a plain TCP stream.
pub const SERVER_QUERY_PORT: u16 = 10011;
/// Default port of the server query over SSH.
pub const SERVER_QUERY_SSH_PORT: u16 = 10022;
/// Default port of the client query plugin.
pub const CLIENT_QUERY_PORT: u16 = 25639;

/// Greeting length of the client query plugin.
pub const CLIENT_QUERY_GREETING_LINES: usize = 4;

/// Connection parameters shared by every carrier.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Bound on establishing the TCP connection (and the SSH handshake).
    pub connect_timeout: Duration,
    /// Bound on a single write; `None` blocks indefinitely.
    pub write_timeout: Option<Duration>,
    /// Number of banner lines to discard after connecting. `None` uses the
    /// carrier default.
    pub greeting_lines: Option<usize>,
    /// Bound on receiving the whole greeting.
    pub greeting_timeout: Duration,
    /// Largest accepted inbound line, delimiter excluded.
    pub max_line_length: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            write_timeout: Some(Duration::from_secs(10)),
            greeting_lines: None,
            greeting_timeout: Duration::from_secs(10),
            max_line_length: DEFAULT_MAX_LINE,
        }
    }
}

impl TransportConfig {
    /// Configuration for the client query plugin, which greets with four lines.
    pub fn client_query() -> Self {
        Self {
            greeting_lines: Some(CLIENT_QUERY_GREETING_LINES),
            ..Self::default()
        }
    }
}
