//! AES-256-GCM chunk codec.
//!
//! # Nonce strategy
//!
//! Each transfer has one random 96-bit base nonce. The nonce for chunk `i`
//! keeps the first 8 bytes of the base and overwrites the last 4 with `i`
//! as a big-endian `u32`. Chunk indices are unique within a transfer, so no
//! nonce repeats under the same key.
//!
//! The codec holds no state between calls. Callers supply the index, which
//! is why one transfer must never seal chunks concurrently.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};

use nofile_protocol::constants::{NONCE_LEN, TAG_LEN};

use crate::key::{SecretKey, TransferKey};

/// Errors from the chunk codec.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The tag did not verify: wrong key, corrupted or tampered chunk.
    #[error("chunk authentication failed")]
    Authentication,

    #[error("invalid nonce length: {0} bytes")]
    InvalidNonce(usize),

    #[error("ciphertext shorter than the authentication tag ({0} bytes)")]
    Truncated(usize),

    #[error("encryption failed")]
    Encrypt,
}

/// Output of [`encrypt_chunk`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedChunk {
    pub nonce: [u8; NONCE_LEN],
    /// Ciphertext followed by the 16-byte tag.
    pub ciphertext: Vec<u8>,
}

/// Derives the nonce for chunk `index` from the transfer's base nonce.
pub fn derive_nonce(base: &[u8; NONCE_LEN], index: u32) -> [u8; NONCE_LEN] {
    let mut nonce = *base;
    nonce[NONCE_PREFIX_LEN..].copy_from_slice(&index.to_be_bytes());
    nonce
}

/// Bytes of the base nonce shared by every chunk of a transfer.
pub const NONCE_PREFIX_LEN: usize = NONCE_LEN - 4;

/// Splits a received nonce into its per-transfer prefix and the chunk
/// index it was sealed for.
pub fn split_nonce(nonce: &[u8]) -> Result<([u8; NONCE_PREFIX_LEN], u32), CodecError> {
    let nonce: &[u8; NONCE_LEN] = nonce
        .try_into()
        .map_err(|_| CodecError::InvalidNonce(nonce.len()))?;
    let mut prefix = [0u8; NONCE_PREFIX_LEN];
    prefix.copy_from_slice(&nonce[..NONCE_PREFIX_LEN]);
    let mut index = [0u8; 4];
    index.copy_from_slice(&nonce[NONCE_PREFIX_LEN..]);
    Ok((prefix, u32::from_be_bytes(index)))
}

fn cipher(key: &SecretKey) -> Aes256Gcm {
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()))
}

/// Seals one chunk's plaintext.
pub fn encrypt_chunk(
    key: &TransferKey,
    index: u32,
    plaintext: &[u8],
) -> Result<SealedChunk, CodecError> {
    let nonce = derive_nonce(key.base_nonce(), index);
    let ciphertext = cipher(key.secret())
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| CodecError::Encrypt)?;
    Ok(SealedChunk { nonce, ciphertext })
}

/// Opens one chunk. Never returns plaintext unless the tag verifies.
pub fn decrypt_chunk(
    key: &SecretKey,
    nonce: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CodecError> {
    if nonce.len() != NONCE_LEN {
        return Err(CodecError::InvalidNonce(nonce.len()));
    }
    if ciphertext.len() < TAG_LEN {
        return Err(CodecError::Truncated(ciphertext.len()));
    }
    cipher(key)
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CodecError::Authentication)
}
