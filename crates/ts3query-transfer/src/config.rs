use std::time::Duration;

/// Conventional data-channel block size.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// File transfer settings.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Bytes moved per read/write on the data channel.
    pub block_size: usize,
    /// Host used when the server advertises no usable address. Defaults to
    /// the host the session connected to.
    pub fallback_host: Option<String>,
    pub connect_timeout: Duration,
    /// Bound on each socket read or write. `None` blocks indefinitely.
    pub io_timeout: Option<Duration>,
    /// Bound on the negotiating command. `None` uses the session default.
    pub command_timeout: Option<Duration>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            fallback_host: None,
            connect_timeout: Duration::from_secs(10),
            io_timeout: Some(Duration::from_secs(30)),
            command_timeout: None,
        }
    }
}
