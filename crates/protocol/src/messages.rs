use serde::{Deserialize, Serialize};

use crate::envelope::{ChunkPayload, EnvelopeError, decode_frame};

// ---------------------------------------------------------------------------
// Upload direction
// ---------------------------------------------------------------------------

/// Metadata half of an upload chunk frame.
///
/// Sent with every chunk so the remote can create the artifact on the
/// first one without a separate init exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadChunkMeta {
    /// Total chunk count.
    pub total: u32,
    /// Index of the chunk carried by this frame.
    pub part: u32,
    /// Plaintext file size in bytes.
    pub size: u64,
    pub name: String,
    #[serde(rename = "type")]
    pub content_type: String,
    /// Retention in days, 0 = unlimited.
    pub delay: u32,
    /// Burn-after-read.
    pub del_at_first_view: bool,
    #[serde(default)]
    pub zipped: bool,
    /// Server-assigned short id, `null` until the first ack.
    pub id: Option<String>,
    /// Client-side transfer id echoed back in acks.
    pub i: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_pwd: Option<String>,
}

/// Remote acknowledgement of one upload chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadAck {
    #[serde(default)]
    pub success: bool,
    /// Transfer id this ack belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub i: Option<u64>,
    /// Index of the acknowledged chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub j: Option<u32>,
    /// Total chunk count as seen by the remote.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short: Option<String>,
    /// Modification token authorising deletion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl UploadAck {
    /// Builds a successful ack. Used by in-process peers and tests.
    pub fn accepted(transfer_id: u64, chunk: u32, parts: u32) -> Self {
        Self {
            success: true,
            i: Some(transfer_id),
            j: Some(chunk),
            parts: Some(parts),
            ..Self::default()
        }
    }

    /// Builds a rejection ack.
    pub fn rejected(transfer_id: u64, msg: impl Into<String>) -> Self {
        Self {
            success: false,
            i: Some(transfer_id),
            msg: Some(msg.into()),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Download direction
// ---------------------------------------------------------------------------

/// Asks the remote for one chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub part: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_pwd: Option<String>,
}

/// Tells the remote the transfer is over.
///
/// Sent after the last download chunk; the remote applies burn-after-read
/// on receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndedRequest {
    pub ended: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_pwd: Option<String>,
}

impl EndedRequest {
    pub fn new(file_pwd: Option<String>) -> Self {
        Self {
            ended: true,
            file_pwd,
        }
    }
}

/// Metadata half of a download response frame.
///
/// A record carrying `msg` is a rejection and has no payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DownloadChunkMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

/// A parsed download response frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadResponse {
    pub meta: DownloadChunkMeta,
    pub payload: Option<ChunkPayload>,
}

impl DownloadResponse {
    pub fn parse(text: &str) -> Result<Self, EnvelopeError> {
        let (meta, payload) = decode_frame(text)?;
        Ok(Self { meta, payload })
    }

    /// Server-reported rejection text, if this frame is one.
    pub fn rejection(&self) -> Option<&str> {
        self.meta.msg.as_deref()
    }
}
