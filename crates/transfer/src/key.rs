//! Per-transfer key material and its link-fragment encoding.
//!
//! The secret key travels only in the fragment of a share link
//! (`https://host/r/abc#<key>`), which browsers and this client never send
//! to the server. The base nonce stays with the sender; receivers read each
//! chunk's nonce from its payload.

use rand::Rng;

use nofile_protocol::constants::{KEY_LEN, NONCE_LEN};
use nofile_protocol::envelope::{decode_base64_url, encode_base64_url};

/// Errors while decoding key material.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("link is missing the encryption key fragment")]
    MissingFragment,

    #[error("encryption key is not valid base64")]
    InvalidEncoding,

    #[error("encryption key must be {KEY_LEN} bytes, got {0}")]
    InvalidLength(usize),
}

/// A 256-bit AES key.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey([u8; KEY_LEN]);

impl SecretKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Decodes the URL-safe base64 form found in link fragments.
    pub fn from_encoded(text: &str) -> Result<Self, KeyError> {
        let raw = decode_base64_url(text.trim()).map_err(|_| KeyError::InvalidEncoding)?;
        let bytes: [u8; KEY_LEN] = raw
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidLength(raw.len()))?;
        Ok(Self(bytes))
    }

    /// URL-safe base64 without padding.
    pub fn encode(&self) -> String {
        encode_base64_url(&self.0)
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

/// Key plus base nonce for one upload.
///
/// Generated once per transfer and never reused.
#[derive(Clone)]
pub struct TransferKey {
    secret: SecretKey,
    base_nonce: [u8; NONCE_LEN],
}

impl TransferKey {
    /// Draws a fresh key and base nonce from the thread CSPRNG.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut key = [0u8; KEY_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        rng.fill(&mut key);
        rng.fill(&mut nonce);
        Self::from_parts(key, nonce)
    }

    pub fn from_parts(key: [u8; KEY_LEN], base_nonce: [u8; NONCE_LEN]) -> Self {
        Self {
            secret: SecretKey(key),
            base_nonce,
        }
    }

    pub fn secret(&self) -> &SecretKey {
        &self.secret
    }

    pub fn base_nonce(&self) -> &[u8; NONCE_LEN] {
        &self.base_nonce
    }

    /// The fragment to append to share links.
    pub fn encoded_key(&self) -> String {
        self.secret.encode()
    }
}

impl std::fmt::Debug for TransferKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferKey").finish_non_exhaustive()
    }
}

/// Extracts the key from a share link's fragment.
///
/// The fragment may carry extra `&`-separated parameters after the key.
pub fn key_from_link(link: &str) -> Result<SecretKey, KeyError> {
    let fragment = link
        .split_once('#')
        .map(|(_, f)| f)
        .ok_or(KeyError::MissingFragment)?;
    let encoded = fragment.split('&').next().unwrap_or_default();
    if encoded.is_empty() {
        return Err(KeyError::MissingFragment);
    }
    SecretKey::from_encoded(encoded)
}

/// Returns the link without its fragment, i.e. what may be shown or sent
/// to the server.
pub fn strip_fragment(link: &str) -> &str {
    link.split_once('#').map_or(link, |(head, _)| head)
}
