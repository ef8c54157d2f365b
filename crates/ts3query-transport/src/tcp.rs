use std::io;
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info};
use ts3query_codec::{LineReader, LineWriter};

use crate::config::TransportConfig;
use crate::error::{Result, TransportError};
use crate::traits::{discard_greeting, Carrier, Transport};

const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Plain TCP carrier (the "raw" or telnet-style query interface).
pub struct TcpCarrier {
    reader: LineReader<TcpStream>,
    writer: LineWriter<TcpStream>,
    peer_host: Option<String>,
    read_timeout: Option<Duration>,
    closed: bool,
}

impl TcpCarrier {
    /// Connect to `addr` (`host:port`) and discard the greeting.
    pub fn connect(addr: &str, config: &TransportConfig) -> Result<Self> {
        let stream = connect_stream(addr, config.connect_timeout)?;
        let mut carrier = Self::from_stream(stream, config)?;
        carrier.peer_host = Some(host_of(addr).to_string());

        let lines = config
            .greeting_lines
            .unwrap_or_else(|| Carrier::Tcp.greeting_lines());
        if let Err(err) = discard_greeting(&mut carrier, lines, config.greeting_timeout) {
            carrier.close();
            return Err(err);
        }

        info!(addr, "connected to query interface over tcp");
        Ok(carrier)
    }

    /// Wrap an already connected stream. No greeting is consumed.
    pub fn from_stream(stream: TcpStream, config: &TransportConfig) -> Result<Self> {
        stream.set_nodelay(true)?;
        stream.set_write_timeout(config.write_timeout)?;
        let peer_host = stream.peer_addr().ok().map(|addr| addr.ip().to_string());
        let read_half = stream.try_clone()?;

        Ok(Self {
            reader: LineReader::with_max_line(read_half, config.max_line_length),
            writer: LineWriter::new(stream),
            peer_host,
            read_timeout: None,
            closed: false,
        })
    }

    /// Address of the remote end.
    pub fn peer_addr(&self) -> Result<SocketAddr> {
        Ok(self.writer.get_ref().peer_addr()?)
    }

    fn apply_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        // Zero is rejected by the OS as a socket timeout.
        let timeout = timeout.map(|d| d.max(MIN_READ_TIMEOUT));
        if self.read_timeout != timeout {
            self.reader.get_ref().set_read_timeout(timeout)?;
            self.read_timeout = timeout;
        }
        Ok(())
    }
}

impl Transport for TcpCarrier {
    fn read_line(&mut self, timeout: Option<Duration>) -> Result<Bytes> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.apply_read_timeout(timeout)?;

        match self.reader.read_line() {
            Ok(line) => Ok(line),
            Err(err) => {
                let err = TransportError::from_codec(err, timeout);
                if matches!(err, TransportError::Closed) {
                    debug!("peer closed the query stream");
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
        self.writer
            .send(line)
            .map_err(|err| TransportError::from_codec(err, None))
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.writer.get_ref().shutdown(Shutdown::Both);
        debug!(peer = ?self.peer_host, "tcp carrier closed");
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn carrier(&self) -> Carrier {
        Carrier::Tcp
    }

    fn peer_host(&self) -> Option<&str> {
        self.peer_host.as_deref()
    }
}

impl std::fmt::Debug for TcpCarrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpCarrier")
            .field("peer_host", &self.peer_host)
            .field("closed", &self.closed)
            .finish()
    }
}

/// Resolve `addr` and connect to the first address that answers.
pub fn connect_stream(addr: &str, timeout: Duration) -> Result<TcpStream> {
    let candidates: Vec<SocketAddr> = addr
        .to_socket_addrs()
        .map_err(|source| TransportError::Resolve {
            addr: addr.to_string(),
            source,
        })?
        .collect();

    let mut last_err = io::Error::new(io::ErrorKind::NotFound, "no addresses resolved");
    for candidate in candidates {
        match TcpStream::connect_timeout(&candidate, timeout) {
            Ok(stream) => {
                debug!(%candidate, "tcp connection established");
                return Ok(stream);
            }
            Err(err) => {
                debug!(%candidate, %err, "tcp connect attempt failed");
                last_err = err;
            }
        }
    }

    Err(TransportError::Connect {
        addr: addr.to_string(),
        source: last_err,
    })
}

/// Host part of a `host:port` string; brackets around IPv6 literals are removed.
pub fn host_of(addr: &str) -> &str {
    if let Some(rest) = addr.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            return &rest[..end];
        }
    }
    match addr.rsplit_once(':') {
        Some((host, _port)) if !host.contains(':') => host,
        Some(_) => addr,
        None => addr,
    }
}
