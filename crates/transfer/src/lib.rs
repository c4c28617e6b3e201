//! Chunk-level cryptography and file slicing.
//!
//! A transfer splits a file into fixed-size chunks, seals each one with
//! AES-256-GCM under a per-transfer key and a nonce derived from the
//! chunk index, and never holds more than one plaintext chunk at a time.

mod chunked;
pub mod codec;
pub mod key;
mod validation;

pub use chunked::{ChunkPlan, ChunkSource};
pub use codec::{
    CodecError, NONCE_PREFIX_LEN, SealedChunk, decrypt_chunk, derive_nonce, encrypt_chunk,
    split_nonce,
};
pub use key::{KeyError, SecretKey, TransferKey, key_from_link, strip_fragment};
pub use validation::sanitize_file_name;

pub use nofile_protocol::constants::DEFAULT_CHUNK_SIZE;

/// Errors produced while reading chunks from a source.
#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("chunk {index} out of range (total {total})")]
    OutOfRange { index: u32, total: u32 },

    #[error("file too large: {0} chunks exceed the index space")]
    TooManyChunks(u64),

    #[error("invalid file name: {0}")]
    InvalidName(String),
}
