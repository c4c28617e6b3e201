//! Wire protocol for encrypted chunked transfers.
//!
//! Every message on the channel is a text frame. Chunk-carrying frames
//! are two JSON records (metadata, cipher payload) joined by
//! [`FRAME_DELIMITER`](constants::FRAME_DELIMITER); control frames are a
//! single JSON record.

pub mod constants;
pub mod envelope;
pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use constants::FRAME_DELIMITER;
pub use envelope::{ChunkPayload, EnvelopeError, decode_frame, encode_frame};
pub use messages::{
    DownloadChunkMeta, DownloadRequest, DownloadResponse, EndedRequest, UploadAck,
    UploadChunkMeta,
};
pub use types::{Notice, Severity, TransferState};
