//! Share links for a finished upload.

use serde::Serialize;

/// Links handed to the user once an upload completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShareLinks {
    /// Download page without the key.
    pub download: String,
    /// Download page with the key in the fragment.
    pub download_with_key: String,
    /// Deletion link carrying the modification token.
    pub delete: String,
}

impl ShareLinks {
    pub fn build(base_url: &str, action_url: &str, short: &str, token: &str, key: &str) -> Self {
        let download = join(base_url, &format!("r/{short}"));
        Self {
            download_with_key: format!("{download}#{key}"),
            download,
            delete: join(action_url, &format!("d/{short}/{token}")),
        }
    }
}

/// Outcome of a completed upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinishedUpload {
    pub name: String,
    pub size: u64,
    /// Server-assigned file id.
    pub short: String,
    /// Modification token.
    pub token: String,
    pub links: ShareLinks,
    pub created_at: Option<i64>,
    /// Retention in days as accepted by the server.
    pub delay: u32,
    pub burn: bool,
}

fn join(base: &str, path: &str) -> String {
    if base.ends_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}
