//! Playlist download over HTTP/HTTPS
//!
//! [`PlaylistSource`] is the network retrieval primitive; [`fetch_playlist`]
//! runs it through the parser and produces a complete [`Playlist`].

use std::io::Read;
use std::time::Duration;

use chrono::Utc;
use flate2::read::GzDecoder;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{PlaylistError, Result};
use crate::m3u_parser::parse_m3u_document;
use crate::models::{generate_id, Playlist};

pub const DEFAULT_PLAYLIST_NAME: &str = "My Playlist";

/// Retrieves a playlist document as text
pub trait PlaylistSource: Send + Sync {
    fn fetch_text(&self, url: &str) -> Result<String>;
}

/// HTTP client settings
#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub user_agent: String,
    pub connect_timeout_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
    /// Largest response body accepted, in bytes
    pub max_body_bytes: u64,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            user_agent: format!("IPTVPlaylists/{}", env!("CARGO_PKG_VERSION")),
            connect_timeout_secs: None,
            timeout_secs: None,
            max_body_bytes: 64 * 1024 * 1024,
        }
    }
}

/// [`PlaylistSource`] backed by a ureq agent
pub struct HttpSource {
    agent: ureq::Agent,
    options: HttpOptions,
}

impl HttpSource {
    pub fn new(options: HttpOptions) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(options.timeout_secs.map(Duration::from_secs))
            .timeout_connect(options.connect_timeout_secs.map(Duration::from_secs))
            .http_status_as_error(false)
            .build()
            .new_agent();

        Self { agent, options }
    }
}

impl Default for HttpSource {
    fn default() -> Self {
        Self::new(HttpOptions::default())
    }
}

impl PlaylistSource for HttpSource {
    fn fetch_text(&self, url: &str) -> Result<String> {
        let mut response = self
            .agent
            .get(url)
            .header("User-Agent", &self.options.user_agent)
            .call()
            .map_err(|e| match e {
                ureq::Error::StatusCode(code) => PlaylistError::http_status(code, ""),
                other => PlaylistError::network(other.to_string()),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PlaylistError::http_status(
                status.as_u16(),
                status.canonical_reason().unwrap_or(""),
            ));
        }

        let bytes = response
            .body_mut()
            .with_config()
            .limit(self.options.max_body_bytes)
            .read_to_vec()
            .map_err(|e| PlaylistError::network(format!("Read failed: {}", e)))?;

        info!(url, bytes = bytes.len(), "downloaded playlist");
        decode_body(bytes)
    }
}

/// Decode a response body - auto-detects gzip compression
pub fn decode_body(bytes: Vec<u8>) -> Result<String> {
    // Gzip magic bytes (1f 8b)
    let bytes = if bytes.starts_with(&[0x1f, 0x8b]) {
        let mut decoded = Vec::new();
        GzDecoder::new(bytes.as_slice())
            .read_to_end(&mut decoded)
            .map_err(|e| PlaylistError::network(format!("Decompress failed: {}", e)))?;
        debug!(compressed = bytes.len(), decoded = decoded.len(), "inflated gzip playlist");
        decoded
    } else {
        bytes
    };

    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    };

    if let Some(stripped) = text.strip_prefix('\u{feff}') {
        return Ok(stripped.to_string());
    }
    Ok(text)
}

/// Download and parse a playlist into a fresh [`Playlist`] record
pub fn fetch_playlist(source: &dyn PlaylistSource, url: &str, name: Option<&str>) -> Result<Playlist> {
    let content = source
        .fetch_text(url)
        .inspect_err(|e| warn!(url, error = %e, "playlist download failed"))?;
    let document = parse_m3u_document(&content)
        .inspect_err(|e| warn!(url, error = %e, "playlist is not an M3U document"))?;

    let name = match name.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => derive_playlist_name(url),
    };

    info!(url, name = %name, channels = document.channels.len(), "fetched playlist");

    Ok(Playlist {
        id: generate_id(),
        name,
        url: url.to_string(),
        channels: document.channels,
        last_updated: Utc::now(),
        epg_url: document.epg_url,
    })
}

/// Display name from the URL's file name, its host, or a generic default
pub fn derive_playlist_name(url: &str) -> String {
    name_from_url(url).unwrap_or_else(|| DEFAULT_PLAYLIST_NAME.to_string())
}

fn name_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;

    let filename = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("");
    let filename = urlencoding::decode(filename)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| filename.to_string());

    let name = strip_playlist_extension(&filename)
        .replace(['_', '-'], " ")
        .trim()
        .to_string();
    if !name.is_empty() {
        return Some(name);
    }

    parsed.host_str().filter(|host| !host.is_empty()).map(str::to_string)
}

fn strip_playlist_extension(filename: &str) -> &str {
    let lower = filename.to_ascii_lowercase();
    for ext in [".m3u8", ".m3u"] {
        if lower.ends_with(ext) {
            return &filename[..filename.len() - ext.len()];
        }
    }
    filename
}
