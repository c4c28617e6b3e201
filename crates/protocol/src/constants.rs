use std::time::Duration;

/// Token joining the metadata record and the cipher payload of a frame.
///
/// Part of the wire format: both peers split on the first occurrence.
pub const FRAME_DELIMITER: &str = "XXMOJOXX";

/// Algorithm tag carried in every cipher payload.
pub const CIPHER_ALG: &str = "AES-GCM";

/// Plaintext bytes per chunk (750 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 750 * 1024;

/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;

/// GCM nonce length in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// GCM authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Maximum inbound message size accepted from the channel (64 MiB).
pub const WS_MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Open attempts per candidate endpoint before failing over.
pub const MAX_CHANNEL_ATTEMPTS: u32 = 5;

/// First retry delay; doubles per attempt.
pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Retry delay ceiling.
pub const RETRY_MAX_DELAY: Duration = Duration::from_millis(4000);

/// How long an open channel may stay silent while a request is
/// outstanding before it is treated as dead.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Content type used when the sender did not declare one.
pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// File name used when the sender did not declare one.
pub const FALLBACK_FILE_NAME: &str = "download";
