//! Client configuration.

use nofile_connection::{TransportConfig, build_candidates};
use nofile_protocol::constants::DEFAULT_CHUNK_SIZE;

/// Where the service lives and how transfers are cut up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Channel endpoint, absolute or relative to `base_url`.
    pub ws_url: String,
    /// Public site root; share links are built on it.
    pub base_url: String,
    /// Root for action links (deletion). Falls back to `base_url`.
    pub action_url: Option<String>,
    pub chunk_size: usize,
    /// Forces burn-after-read on every upload.
    pub force_burn: bool,
    pub transport: TransportConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ws_url: "/upload/".into(),
            base_url: "http://127.0.0.1:8080/".into(),
            action_url: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            force_burn: false,
            transport: TransportConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Channel endpoints in failover order.
    pub fn candidates(&self) -> Vec<String> {
        build_candidates(&self.ws_url, Some(&self.base_url))
    }

    pub fn action_base(&self) -> &str {
        self.action_url.as_deref().unwrap_or(&self.base_url)
    }
}
