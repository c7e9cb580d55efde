//! Configuration management

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::warn;

use crate::fetcher::HttpOptions;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Connection timeout in seconds, none by default
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
    /// Whole-request timeout in seconds, none by default
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_max_body_mb")]
    pub max_body_mb: u64,
    /// Overrides where playlists, favorites and settings are stored
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_user_agent() -> String { format!("IPTVPlaylists/{}", env!("CARGO_PKG_VERSION")) }
fn default_max_body_mb() -> u64 { 64 }
fn default_log_filter() -> String { "info".to_string() }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            connect_timeout_secs: None,
            timeout_secs: None,
            max_body_mb: default_max_body_mb(),
            data_dir: None,
            log_filter: default_log_filter(),
        }
    }
}

impl AppConfig {
    pub fn config_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("iptv_playlists");
        path.push("config.json");
        path
    }

    /// Load from the default location, falling back to defaults
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &std::path::Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => return Self::default(),
        };

        match serde_json::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                warn!("Ignoring unreadable config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn http_options(&self) -> HttpOptions {
        HttpOptions {
            user_agent: self.user_agent.clone(),
            connect_timeout_secs: self.connect_timeout_secs,
            timeout_secs: self.timeout_secs,
            max_body_bytes: self.max_body_mb.saturating_mul(1024 * 1024),
        }
    }
}
