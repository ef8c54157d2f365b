use std::fmt;
use std::str::FromStr;

use ts3query_codec::Record;
use ts3query_session::Response;

use crate::error::{Result, TransferError};

/// Address the server advertises when it listens on every interface.
pub const UNSPECIFIED_ADDRESS: &str = "0.0.0.0";
/// Host used when neither the server nor the caller supplies one.
pub const DEFAULT_FALLBACK_HOST: &str = "localhost";

/// Opaque key authorizing one transfer on the data channel.
#[derive(Clone, PartialEq, Eq)]
pub struct TransferKey(String);

impl TransferKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Raw bytes sent as the first bytes of the data channel.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for TransferKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<redacted:{} bytes>", self.0.len())
    }
}

/// Negotiated parameters of one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferDescriptor {
    /// Id chosen by the client (`clientftfid`).
    pub client_id: u64,
    /// Id chosen by the server (`serverftfid`).
    pub server_id: u64,
    pub host: String,
    pub port: u16,
    pub key: TransferKey,
    /// Byte position the data phase starts at.
    pub offset: u64,
    /// Full size of the file, when known. Zero or `None` disables the
    /// completeness check.
    pub total_size: Option<u64>,
}

impl TransferDescriptor {
    /// Build from an `ftinitdownload` response.
    ///
    /// The server does not echo the seek position, so the requested one is
    /// used as the offset.
    pub fn from_download(
        response: &Response,
        seek_position: u64,
        fallback_host: Option<&str>,
    ) -> Result<Self> {
        let item = first_item(response)?;
        check_rejection(item)?;
        let total_size = parse_field::<u64>(item, "size")?;
        Self::from_item(item, seek_position, Some(total_size), fallback_host)
    }

    /// Build from an `ftinitupload` response; the server picks the offset.
    pub fn from_upload(
        response: &Response,
        size: u64,
        fallback_host: Option<&str>,
    ) -> Result<Self> {
        let item = first_item(response)?;
        check_rejection(item)?;
        let offset = match item.get("seekpos") {
            Some(_) => parse_field::<u64>(item, "seekpos")?,
            None => 0,
        };
        Self::from_item(item, offset, Some(size), fallback_host)
    }

    fn from_item(
        item: &Record,
        offset: u64,
        total_size: Option<u64>,
        fallback_host: Option<&str>,
    ) -> Result<Self> {
        Ok(Self {
            client_id: parse_field(item, "clientftfid")?,
            server_id: parse_field(item, "serverftfid")?,
            host: resolve_host(item.get("ip"), fallback_host),
            port: parse_field(item, "port")?,
            key: TransferKey::new(require(item, "ftkey")?),
            offset,
            total_size,
        })
    }

    /// Bytes the data phase is expected to move, when known.
    pub fn expected_bytes(&self) -> Option<u64> {
        self.total_size
            .filter(|total| *total > 0)
            .map(|total| total.saturating_sub(self.offset))
    }
}

/// Pick the data-channel host from the comma-separated `ip` field.
///
/// Only the first entry is considered; when it is missing, empty or
/// `0.0.0.0` the fallback (or `localhost`) is used.
///
/// ```
/// use ts3query_transfer::resolve_host;
///
/// assert_eq!(resolve_host(Some("91.1.2.3,"), None), "91.1.2.3");
/// assert_eq!(resolve_host(Some("0.0.0.0,91.1.2.3"), None), "localhost");
/// assert_eq!(resolve_host(Some("0.0.0.0,91.1.2.3"), Some("ts.example.org")), "ts.example.org");
/// ```
pub fn resolve_host(ip_field: Option<&str>, fallback: Option<&str>) -> String {
    let first = ip_field
        .and_then(|ips| ips.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty() && *ip != UNSPECIFIED_ADDRESS);
    match first {
        Some(ip) => ip.to_string(),
        None => fallback.unwrap_or(DEFAULT_FALLBACK_HOST).to_string(),
    }
}

fn first_item(response: &Response) -> Result<&Record> {
    response
        .first()
        .ok_or(TransferError::MissingField("clientftfid"))
}

fn check_rejection(item: &Record) -> Result<()> {
    if item.contains_key("ftkey") {
        return Ok(());
    }
    match item.get("status") {
        Some(status) => Err(TransferError::Rejected {
            status: status.to_string(),
            msg: item.get("msg").unwrap_or_default().to_string(),
        }),
        None => Err(TransferError::MissingField("ftkey")),
    }
}

fn require<'a>(item: &'a Record, field: &'static str) -> Result<&'a str> {
    item.get(field).ok_or(TransferError::MissingField(field))
}

fn parse_field<T: FromStr>(item: &Record, field: &'static str) -> Result<T> {
    let value = require(item, field)?;
    value.trim().parse().map_err(|_| TransferError::InvalidField {
        field,
        value: value.to_string(),
    })
}
