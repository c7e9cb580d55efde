//! Data models for playlists and channels

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Category assigned when a channel carries no group
pub const DEFAULT_CATEGORY: &str = "Uncategorized";

/// One playable entry of a playlist (persisted to JSON)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub url: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tvg_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tvg_name: Option<String>,
}

/// A user-added M3U source and its most recently parsed channels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Playlist {
    pub id: String,
    pub name: String,
    pub url: String,
    pub channels: Vec<Channel>,
    pub last_updated: DateTime<Utc>,
    /// XMLTV guide location advertised in the `#EXTM3U` header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epg_url: Option<String>,
}

/// Fresh opaque identifier for channels and playlists
pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}
