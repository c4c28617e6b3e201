//! Transfer error types.

use nofile_connection::{FailureKind, RetryNotice, TransportError};
use nofile_protocol::{EnvelopeError, Notice};
use nofile_transfer::{ChunkError, CodecError, KeyError};

/// Errors produced while running a transfer.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("channel open failed: {0}")]
    ChannelOpen(String),

    #[error("channel closed unexpectedly: {0}")]
    ChannelClosedUnexpectedly(String),

    #[error("unable to reach the transfer channel: {last_failure}")]
    ChannelExhausted { last_failure: String },

    #[error("chunk {chunk} failed authentication")]
    Authentication { chunk: u32 },

    #[error("{0}")]
    ServerRejection(String),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("a password is required to download this file")]
    PasswordRequired,

    #[error("cancelled")]
    Cancelled,

    #[error("frame error: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("key error: {0}")]
    Key(#[from] KeyError),

    #[error("chunk error: {0}")]
    Chunk(#[from] ChunkError),

    #[error("cipher error: {0}")]
    Codec(CodecError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl TransferError {
    /// Classifies a channel fault the failover policy is about to retry.
    pub fn from_retry(notice: &RetryNotice) -> Self {
        match notice.kind {
            FailureKind::Open => Self::ChannelOpen(notice.reason.clone()),
            FailureKind::Lost => Self::ChannelClosedUnexpectedly(notice.reason.clone()),
        }
    }

    /// Codec failures on a specific chunk. A tag mismatch is reported as
    /// [`TransferError::Authentication`].
    pub fn from_codec(chunk: u32, err: CodecError) -> Self {
        match err {
            CodecError::Authentication => Self::Authentication { chunk },
            other => Self::Codec(other),
        }
    }

    /// Transport faults the failover policy recovers from on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ChannelOpen(_) | Self::ChannelClosedUnexpectedly(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Collapses the error to a UI message. Cancellation is silent.
    pub fn notice(&self) -> Option<Notice> {
        match self {
            Self::Cancelled => None,
            Self::PasswordRequired => Some(Notice::warning(self.to_string())),
            Self::ServerRejection(msg) => Some(Notice::danger(msg.clone())),
            other => Some(Notice::danger(other.to_string())),
        }
    }
}

impl From<TransportError> for TransferError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Exhausted { last_failure } => Self::ChannelExhausted { last_failure },
            TransportError::ProtocolViolation { .. } => Self::ProtocolViolation(err.to_string()),
            // A session only closes under us when the transfer is being torn down.
            TransportError::Cancelled | TransportError::Closed => Self::Cancelled,
            TransportError::NoCandidates => Self::Config(err.to_string()),
        }
    }
}
