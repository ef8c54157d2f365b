//! File transfers for the query protocol.
//!
//! A transfer has two phases. [`FileTransfer`] negotiates it over a query
//! [`Session`](ts3query_session::Session) (`ftinitdownload` /
//! `ftinitupload`), yielding a [`TransferDescriptor`]. The data phase in
//! [`data`] then opens a separate socket, sends the key and streams raw
//! bytes. Failures carry the byte count reached so a caller can resume.

pub mod config;
pub mod data;
pub mod descriptor;
pub mod engine;
pub mod error;

pub use config::{TransferConfig, DEFAULT_BLOCK_SIZE};
pub use data::{download, upload, Progress};
pub use descriptor::{
    resolve_host, TransferDescriptor, TransferKey, DEFAULT_FALLBACK_HOST, UNSPECIFIED_ADDRESS,
};
pub use engine::{DownloadRequest, FileTransfer, UploadRequest};
pub use error::{Result, TransferError};
