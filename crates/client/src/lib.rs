//! Encrypted upload and download flows.
//!
//! [`UploadSequencer`] and [`DownloadSequencer`] each drive one transfer
//! over a [`TransportSession`](nofile_connection::TransportSession);
//! [`TransferManager`] queues uploads and runs them one at a time.

pub mod config;
pub mod download;
pub mod error;
pub mod events;
pub mod links;
pub mod manager;
pub mod upload;

#[cfg(test)]
mod testing;

pub use config::ClientConfig;
pub use download::{DownloadSequencer, DownloadSpec, DownloadedFile};
pub use error::TransferError;
pub use events::{EVENT_BUFFER, EventSink, TransferEvent, TransferId};
pub use links::{FinishedUpload, ShareLinks};
pub use manager::{TransferController, TransferManager, UploadOutcome};
pub use upload::{UploadJob, UploadSequencer};
