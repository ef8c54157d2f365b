use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info};
use ts3query_session::{QueryBuilder, Session};

use crate::config::TransferConfig;
use crate::data::{self, Progress};
use crate::descriptor::TransferDescriptor;
use crate::error::{Result, TransferError};

/// Parameters of `ftinitdownload`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    /// Path inside the channel's file area, e.g. `/icons/logo.png`.
    pub name: String,
    pub channel_id: u64,
    pub channel_password: String,
    pub seek_position: u64,
}

impl DownloadRequest {
    pub fn new(channel_id: u64, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            channel_id,
            channel_password: String::new(),
            seek_position: 0,
        }
    }

    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.channel_password = password.into();
        self
    }

    /// Resume from `position` instead of the start of the file.
    #[must_use]
    pub fn with_seek_position(mut self, position: u64) -> Self {
        self.seek_position = position;
        self
    }
}

/// Parameters of `ftinitupload`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub name: String,
    pub channel_id: u64,
    pub channel_password: String,
    pub overwrite: bool,
    /// Ask the server to continue a previous partial upload.
    pub resume: bool,
}

impl UploadRequest {
    pub fn new(channel_id: u64, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            channel_id,
            channel_password: String::new(),
            overwrite: true,
            resume: false,
        }
    }

    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.channel_password = password.into();
        self
    }

    #[must_use]
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    #[must_use]
    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }
}

/// Negotiates transfers over a session and runs their data phase.
///
/// Each engine owns its transfer id counter. Negotiation goes through the
/// session; the data phase uses its own socket, so several transfers can run
/// side by side with ordinary commands.
pub struct FileTransfer<'a> {
    session: &'a Session,
    config: TransferConfig,
    next_id: AtomicU64,
}

impl<'a> FileTransfer<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self::with_config(session, TransferConfig::default())
    }

    pub fn with_config(session: &'a Session, config: TransferConfig) -> Self {
        Self {
            session,
            config,
            next_id: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Allocate a client transfer id, unique within this engine.
    pub fn next_transfer_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Issue `ftinitdownload` and return the negotiated descriptor.
    pub fn init_download(&self, request: &DownloadRequest) -> Result<TransferDescriptor> {
        let client_id = self.next_transfer_id();
        let query = QueryBuilder::new("ftinitdownload")
            .param("clientftfid", client_id)
            .param("name", &request.name)
            .param("cid", request.channel_id)
            .param("cpw", &request.channel_password)
            .param("seekpos", request.seek_position);

        debug!(client_id, name = %request.name, cid = request.channel_id, "negotiating download");
        let response = self.run(&query)?;
        TransferDescriptor::from_download(
            &response,
            request.seek_position,
            self.fallback_host(),
        )
    }

    /// Issue `ftinitupload` for `size` bytes and return the descriptor.
    pub fn init_upload(&self, request: &UploadRequest, size: u64) -> Result<TransferDescriptor> {
        let client_id = self.next_transfer_id();
        let query = QueryBuilder::new("ftinitupload")
            .param("clientftfid", client_id)
            .param("name", &request.name)
            .param("cid", request.channel_id)
            .param("cpw", &request.channel_password)
            .param("size", size)
            .param("overwrite", request.overwrite)
            .param("resume", request.resume);

        debug!(client_id, name = %request.name, cid = request.channel_id, size, "negotiating upload");
        let response = self.run(&query)?;
        TransferDescriptor::from_upload(&response, size, self.fallback_host())
    }

    /// Negotiate and download into `output`. Returns bytes received.
    pub fn download<W, F>(&self, request: &DownloadRequest, output: &mut W, progress: F) -> Result<u64>
    where
        W: Write + ?Sized,
        F: FnMut(&Progress),
    {
        let desc = self.init_download(request)?;
        info!(
            client_id = desc.client_id,
            host = %desc.host,
            port = desc.port,
            offset = desc.offset,
            "starting download"
        );
        data::download(&desc, output, &self.config, progress)
    }

    /// Negotiate and upload `input` in full (or from the offset the server
    /// asks for when resuming). Returns bytes sent.
    pub fn upload<R, F>(&self, request: &UploadRequest, input: &mut R, progress: F) -> Result<u64>
    where
        R: Read + Seek + ?Sized,
        F: FnMut(&Progress),
    {
        let size = input
            .seek(SeekFrom::End(0))
            .map_err(|source| TransferError::Io {
                transferred: 0,
                offset: 0,
                source,
            })?;
        let desc = self.init_upload(request, size)?;
        info!(
            client_id = desc.client_id,
            host = %desc.host,
            port = desc.port,
            offset = desc.offset,
            size,
            "starting upload"
        );
        data::upload(&desc, input, &self.config, progress)
    }

    fn run(&self, query: &QueryBuilder) -> Result<ts3query_session::Response> {
        let timeout = self
            .config
            .command_timeout
            .or(self.session.config().command_timeout);
        Ok(self.session.execute_timeout(query, timeout)?)
    }

    fn fallback_host(&self) -> Option<&str> {
        self.config
            .fallback_host
            .as_deref()
            .or_else(|| self.session.peer_host())
    }
}
