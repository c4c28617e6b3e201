//! Client configuration file.
//!
//! Stored as TOML:
//! - Linux: `~/.config/nofile/client.toml`
//! - Windows: `%APPDATA%/nofile/client.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use nofile_client::ClientConfig;
use nofile_connection::TransportConfig;
use nofile_protocol::constants::{
    DEFAULT_CHUNK_SIZE, DEFAULT_IDLE_TIMEOUT, MAX_CHANNEL_ATTEMPTS, RETRY_BASE_DELAY,
    RETRY_MAX_DELAY,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Channel endpoint, absolute or a path on `base_url`.
    #[serde(default = "default_ws_url")]
    pub ws_url: String,

    /// Public site root used for share links.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Root for deletion links; `base_url` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,

    /// Plaintext bytes per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Burn-after-read on every upload.
    #[serde(default)]
    pub force_burn: bool,

    /// Retention in days when `--delay` is not given, 0 = unlimited.
    #[serde(default)]
    pub default_delay: u32,

    /// Opens per endpoint before moving to the next one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Seconds of silence tolerated while waiting for a response.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

fn default_ws_url() -> String {
    "/upload/".into()
}

fn default_base_url() -> String {
    "http://127.0.0.1:8080/".into()
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_max_attempts() -> u32 {
    MAX_CHANNEL_ATTEMPTS
}

fn default_base_delay_ms() -> u64 {
    RETRY_BASE_DELAY.as_millis() as u64
}

fn default_max_delay_ms() -> u64 {
    RETRY_MAX_DELAY.as_millis() as u64
}

fn default_idle_timeout_secs() -> u64 {
    DEFAULT_IDLE_TIMEOUT.as_secs()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            base_url: default_base_url(),
            action_url: None,
            chunk_size: default_chunk_size(),
            force_burn: false,
            default_delay: 0,
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

impl Config {
    /// Loads configuration from `path` (or the platform default), creating
    /// it with defaults if not found.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => config_path()?,
        };

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)?;
            tracing::debug!(path = %path.display(), "configuration loaded");
            Ok(config)
        } else {
            let config = Config::default();
            config.save(&path)?;
            Ok(config)
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            ws_url: self.ws_url.clone(),
            base_url: self.base_url.clone(),
            action_url: self.action_url.clone(),
            chunk_size: self.chunk_size,
            force_burn: self.force_burn,
            transport: TransportConfig {
                max_attempts: self.max_attempts.max(1),
                base_delay: Duration::from_millis(self.base_delay_ms),
                max_delay: Duration::from_millis(self.max_delay_ms),
                idle_timeout: Duration::from_secs(self.idle_timeout_secs),
                ..TransportConfig::default()
            },
        }
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("nofile").join("client.toml"))
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME")?;
        Ok(PathBuf::from(home)
            .join(".config")
            .join("nofile")
            .join("client.toml"))
    }
}
