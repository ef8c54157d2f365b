//! The raw data channel: key first, then unframed file bytes.

use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};

use tracing::{debug, info};

use crate::config::TransferConfig;
use crate::descriptor::TransferDescriptor;
use crate::error::{Result, TransferError};

/// Progress of a running transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Absolute byte position: the start offset plus bytes moved so far.
    pub position: u64,
    pub block_size: usize,
    pub total_size: Option<u64>,
}

/// Receive a file into `output`.
///
/// `progress` is called once before the first block and after every block.
/// Returns the number of bytes received by this call; for a resumed
/// transfer that is the remainder after `desc.offset`.
pub fn download<W, F>(
    desc: &TransferDescriptor,
    output: &mut W,
    config: &TransferConfig,
    mut progress: F,
) -> Result<u64>
where
    W: Write + ?Sized,
    F: FnMut(&Progress),
{
    let offset = desc.offset;
    let block_size = config.block_size.max(1);
    let mut stream = open(desc, config)?;

    let report = |transferred: u64| Progress {
        position: offset + transferred,
        block_size,
        total_size: desc.total_size,
    };
    let io_err = |transferred: u64, source: io::Error| TransferError::Io {
        transferred,
        offset,
        source,
    };

    let mut buf = vec![0u8; block_size];
    let mut transferred = 0u64;
    progress(&report(transferred));

    loop {
        let read = match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(io_err(transferred, err)),
        };
        output
            .write_all(&buf[..read])
            .map_err(|err| io_err(transferred, err))?;
        transferred += read as u64;
        progress(&report(transferred));
    }
    output.flush().map_err(|err| io_err(transferred, err))?;

    check_complete(desc, transferred)?;
    info!(
        client_id = desc.client_id,
        transferred, offset, "download finished"
    );
    Ok(transferred)
}

/// Send `input` from `desc.offset` to its end.
///
/// The total size is taken from `input` itself. Returns the number of bytes
/// sent by this call.
pub fn upload<R, F>(
    desc: &TransferDescriptor,
    input: &mut R,
    config: &TransferConfig,
    mut progress: F,
) -> Result<u64>
where
    R: Read + Seek + ?Sized,
    F: FnMut(&Progress),
{
    let offset = desc.offset;
    let block_size = config.block_size.max(1);
    let io_err = |transferred: u64, source: io::Error| TransferError::Io {
        transferred,
        offset,
        source,
    };

    let size = input.seek(SeekFrom::End(0)).map_err(|err| io_err(0, err))?;
    if offset > size {
        return Err(TransferError::InvalidOffset { offset, size });
    }
    input
        .seek(SeekFrom::Start(offset))
        .map_err(|err| io_err(0, err))?;

    let mut stream = open(desc, config)?;
    let report = |transferred: u64| Progress {
        position: offset + transferred,
        block_size,
        total_size: Some(size),
    };

    let mut buf = vec![0u8; block_size];
    let mut transferred = 0u64;
    progress(&report(transferred));

    loop {
        let read = match input.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(io_err(transferred, err)),
        };
        stream
            .write_all(&buf[..read])
            .map_err(|err| io_err(transferred, err))?;
        transferred += read as u64;
        progress(&report(transferred));
    }
    stream.flush().map_err(|err| io_err(transferred, err))?;
    let _ = stream.shutdown(Shutdown::Write);

    if offset + transferred < size {
        return Err(TransferError::Incomplete {
            transferred,
            offset,
            expected: size - offset,
        });
    }
    info!(
        client_id = desc.client_id,
        transferred, offset, "upload finished"
    );
    Ok(transferred)
}

fn check_complete(desc: &TransferDescriptor, transferred: u64) -> Result<()> {
    match desc.expected_bytes() {
        Some(expected) if transferred < expected => Err(TransferError::Incomplete {
            transferred,
            offset: desc.offset,
            expected,
        }),
        _ => Ok(()),
    }
}

/// Connect to the data channel and authenticate with the raw key.
fn open(desc: &TransferDescriptor, config: &TransferConfig) -> Result<TcpStream> {
    let io_err = |source: io::Error| TransferError::Io {
        transferred: 0,
        offset: desc.offset,
        source,
    };

    let addrs: Vec<SocketAddr> = (desc.host.as_str(), desc.port)
        .to_socket_addrs()
        .map_err(io_err)?
        .collect();

    let mut last_err = io::Error::new(ErrorKind::NotFound, "no addresses resolved");
    let mut connected = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, config.connect_timeout) {
            Ok(stream) => {
                connected = Some(stream);
                break;
            }
            Err(err) => last_err = err,
        }
    }
    let mut stream = connected.ok_or_else(|| io_err(last_err))?;

    stream.set_read_timeout(config.io_timeout).map_err(io_err)?;
    stream.set_write_timeout(config.io_timeout).map_err(io_err)?;
    stream.write_all(desc.key.as_bytes()).map_err(io_err)?;
    debug!(
        client_id = desc.client_id,
        host = %desc.host,
        port = desc.port,
        offset = desc.offset,
        "data channel open"
    );
    Ok(stream)
}
