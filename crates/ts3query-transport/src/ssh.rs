use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use ssh2::{Channel, Session, Stream};
use tracing::{debug, info, warn};
use ts3query_codec::{LineReader, LineWriter};

use crate::config::TransportConfig;
use crate::error::{Result, TransportError};
use crate::tcp::{connect_stream, host_of};
use crate::traits::{discard_greeting, Carrier, Transport};

/// Credentials for the SSH query interface.
#[derive(Clone)]
pub struct SshCredentials {
    pub username: String,
    pub password: Option<String>,
    /// Private key file used instead of the password when set.
    pub private_key: Option<PathBuf>,
    pub passphrase: Option<String>,
}

impl SshCredentials {
    /// Password authentication.
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Some(password.into()),
            private_key: None,
            passphrase: None,
        }
    }

    /// Public key authentication from a key file.
    pub fn key_file(username: impl Into<String>, private_key: impl Into<PathBuf>) -> Self {
        Self {
            username: username.into(),
            password: None,
            private_key: Some(private_key.into()),
            passphrase: None,
        }
    }
}

impl std::fmt::Debug for SshCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshCredentials")
            .field("username", &self.username)
            .field("password", &self.password.as_deref().map(redacted))
            .field("private_key", &self.private_key)
            .field("passphrase", &self.passphrase.as_deref().map(redacted))
            .finish()
    }
}

fn redacted(secret: &str) -> String {
    format!("<redacted:{} bytes>", secret.len())
}

/// Shell channel inside an authenticated SSH session.
///
/// The channel carries the same line protocol as the TCP carrier; reads
/// drain the channel's buffer up to the delimiter.
pub struct SshCarrier {
    session: Session,
    channel: Channel,
    reader: LineReader<Stream>,
    writer: LineWriter<Stream>,
    peer_host: String,
    write_timeout: Option<Duration>,
    timeouts: TimeoutCache,
    closed: bool,
}

/// The libssh2 session has a single blocking timeout shared by reads and
/// writes; remembers the one last applied.
#[derive(Debug, Clone, Copy)]
struct TimeoutCache {
    applied: Option<Duration>,
}

impl TimeoutCache {
    fn new(applied: Option<Duration>) -> Self {
        Self { applied }
    }

    /// Milliseconds to pass to `set_timeout`, or `None` if `wanted` is
    /// already in effect.
    fn update(&mut self, wanted: Option<Duration>) -> Option<u32> {
        if self.applied == wanted {
            return None;
        }
        self.applied = wanted;
        Some(millis(wanted))
    }
}

impl SshCarrier {
    /// Connect, authenticate, open a shell and discard the greeting.
    pub fn connect(
        addr: &str,
        credentials: &SshCredentials,
        config: &TransportConfig,
    ) -> Result<Self> {
        let tcp = connect_stream(addr, config.connect_timeout)?;

        let mut session = Session::new()?;
        session.set_tcp_stream(tcp);
        session.set_timeout(millis(Some(config.connect_timeout)));
        session.handshake()?;
        debug!(addr, "ssh handshake complete");

        authenticate(&session, credentials)?;

        let mut channel = session.channel_session()?;
        channel.shell()?;

        let mut carrier = Self {
            reader: LineReader::with_max_line(channel.stream(0), config.max_line_length),
            writer: LineWriter::new(channel.stream(0)),
            session,
            channel,
            peer_host: host_of(addr).to_string(),
            write_timeout: config.write_timeout,
            timeouts: TimeoutCache::new(Some(config.connect_timeout)),
            closed: false,
        };

        let lines = config
            .greeting_lines
            .unwrap_or_else(|| Carrier::Ssh.greeting_lines());
        if let Err(err) = discard_greeting(&mut carrier, lines, config.greeting_timeout) {
            carrier.close();
            return Err(err);
        }

        info!(addr, user = %credentials.username, "connected to query interface over ssh");
        Ok(carrier)
    }

    fn apply_timeout(&mut self, timeout: Option<Duration>) {
        if let Some(ms) = self.timeouts.update(timeout) {
            self.session.set_timeout(ms);
        }
    }
}

fn authenticate(session: &Session, credentials: &SshCredentials) -> Result<()> {
    let username = credentials.username.as_str();
    let attempt = if let Some(key) = &credentials.private_key {
        session.userauth_pubkey_file(username, None, key, credentials.passphrase.as_deref())
    } else if let Some(password) = &credentials.password {
        session.userauth_password(username, password)
    } else {
        return Err(TransportError::Auth {
            username: username.to_string(),
        });
    };

    if let Err(err) = attempt {
        warn!(user = username, %err, "ssh authentication rejected");
        return Err(TransportError::Auth {
            username: username.to_string(),
        });
    }
    if !session.authenticated() {
        return Err(TransportError::Auth {
            username: username.to_string(),
        });
    }
    Ok(())
}

/// libssh2 expresses "no timeout" as zero.
fn millis(timeout: Option<Duration>) -> u32 {
    match timeout {
        Some(d) => u32::try_from(d.as_millis()).unwrap_or(u32::MAX).max(1),
        None => 0,
    }
}

impl Transport for SshCarrier {
    fn read_line(&mut self, timeout: Option<Duration>) -> Result<Bytes> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.apply_timeout(timeout);

        match self.reader.read_line() {
            Ok(line) => Ok(line),
            Err(err) => {
                let err = TransportError::from_codec(err, timeout);
                if matches!(err, TransportError::Closed) {
                    debug!("ssh channel reached eof");
                    self.closed = true;
                }
                Err(err)
            }
        }
    }

    fn write_line(&mut self, line: &[u8]) -> Result<()> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let timeout = self.write_timeout;
        self.apply_timeout(timeout);
        self.writer
            .send(line)
            .map_err(|err| TransportError::from_codec(err, timeout))
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.channel.send_eof();
        let _ = self.channel.close();
        let _ = self
            .session
            .disconnect(None, "closing query session", None);
        debug!(peer = %self.peer_host, "ssh carrier closed");
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn carrier(&self) -> Carrier {
        Carrier::Ssh
    }

    fn peer_host(&self) -> Option<&str> {
        Some(&self.peer_host)
    }
}

impl std::fmt::Debug for SshCarrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshCarrier")
            .field("peer_host", &self.peer_host)
            .field("closed", &self.closed)
            .finish()
    }
}
