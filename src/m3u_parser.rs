//! M3U playlist parser
//!
//! Turns the line-oriented `#EXTM3U` format into channel records. A single
//! pending channel is opened by each `#EXTINF:` line and closed by the next
//! stream URL; metadata with no URL before the next `#EXTINF:` is dropped.

use tracing::debug;

use crate::error::{PlaylistError, Result};
use crate::models::{generate_id, Channel, DEFAULT_CATEGORY};

const HEADER_MARKER: &str = "#EXTM3U";
const EXTINF_PREFIX: &str = "#EXTINF:";
const EXTGRP_PREFIX: &str = "#EXTGRP:";

/// Parsed playlist document
#[derive(Debug, Clone, Default)]
pub struct M3uDocument {
    pub channels: Vec<Channel>,
    pub epg_url: Option<String>, // From x-tvg-url / url-tvg in header
}

/// Parse M3U content and extract channels
pub fn parse_m3u(content: &str) -> Result<Vec<Channel>> {
    parse_m3u_document(content).map(|doc| doc.channels)
}

/// Parse M3U content, keeping header metadata
pub fn parse_m3u_document(content: &str) -> Result<M3uDocument> {
    let mut lines = content.lines().map(str::trim).skip_while(|l| l.is_empty());

    let header = lines.next().ok_or(PlaylistError::Format)?;
    let marker_pos = header.find(HEADER_MARKER).ok_or(PlaylistError::Format)?;

    let header_attrs = extract_attrs(&header[marker_pos + HEADER_MARKER.len()..]);
    let epg_url = lookup(&header_attrs, "x-tvg-url").or_else(|| lookup(&header_attrs, "url-tvg"));

    let mut channels = Vec::new();
    let mut pending: Option<PendingChannel> = None;
    let mut dropped = 0usize;

    for line in lines {
        if let Some(info) = line.strip_prefix(EXTINF_PREFIX) {
            if pending.replace(PendingChannel::from_extinf(info)).is_some() {
                dropped += 1;
            }
        } else if let Some(group) = line.strip_prefix(EXTGRP_PREFIX) {
            if let Some(channel) = pending.as_mut() {
                channel.category = Some(category_or_default(group.trim()));
            }
        } else if !line.is_empty() && !line.starts_with('#') {
            // This is a URL line
            if let Some(channel) = pending.take() {
                channels.push(channel.finish(line));
            }
        }
    }

    if pending.is_some() {
        dropped += 1;
    }

    debug!(channels = channels.len(), dropped, "parsed M3U document");

    Ok(M3uDocument { channels, epg_url })
}

/// Metadata collected from an `#EXTINF:` line, waiting for its URL
#[derive(Debug, Default)]
struct PendingChannel {
    name: String,
    category: Option<String>,
    logo: Option<String>,
    tvg_id: Option<String>,
    tvg_name: Option<String>,
}

impl PendingChannel {
    fn from_extinf(info: &str) -> Self {
        let mut channel = PendingChannel::default();

        // Channel name is everything after the last comma outside a quoted value
        let attr_part = match name_separator(info) {
            Some(comma_pos) => {
                channel.name = info[comma_pos + 1..].trim().to_string();
                &info[..comma_pos]
            }
            None => info,
        };

        for (key, value) in extract_attrs(attr_part) {
            match key.as_str() {
                "tvg-logo" | "logo" => channel.logo = Some(value),
                "group-title" => channel.category = Some(category_or_default(&value)),
                "tvg-id" => channel.tvg_id = Some(value),
                "tvg-name" => channel.tvg_name = Some(value),
                _ => {}
            }
        }

        channel
    }

    fn finish(self, url: &str) -> Channel {
        Channel {
            id: generate_id(),
            name: self.name,
            url: url.to_string(),
            category: self.category.unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            logo: self.logo,
            tvg_id: self.tvg_id,
            tvg_name: self.tvg_name,
        }
    }
}

/// Byte offset of the last comma outside a quoted attribute value. A value
/// left unterminated falls back to the last comma on the line.
fn name_separator(info: &str) -> Option<usize> {
    let mut separator = None;
    let mut in_value = false;
    let mut prev = '\0';
    let mut chars = info.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        if in_value {
            if c == '\\' && matches!(chars.peek(), Some(&(_, '"'))) {
                chars.next();
            } else if c == '"' {
                in_value = false;
            }
        } else if c == '"' && prev == '=' {
            in_value = true;
        } else if c == ',' {
            separator = Some(pos);
        }
        prev = c;
    }

    if in_value {
        info.rfind(',')
    } else {
        separator
    }
}

fn category_or_default(value: &str) -> String {
    if value.is_empty() {
        DEFAULT_CATEGORY.to_string()
    } else {
        value.to_string()
    }
}

fn lookup(attrs: &[(String, String)], key: &str) -> Option<String> {
    attrs.iter().rev().find(|(k, _)| k == key).map(|(_, v)| v.clone())
}

/// Extract `key=value` attributes in source order - handles quoted and unquoted
/// values. Keys are lowercased.
fn extract_attrs(info: &str) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    let mut chars = info.chars().peekable();

    // Skip the duration number at the start (e.g., "-1")
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() || c == '-' || c == '.' {
            chars.next();
        } else {
            break;
        }
    }

    loop {
        // Skip whitespace and commas
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() || c == ',' {
                chars.next();
            } else {
                break;
            }
        }
        if chars.peek().is_none() {
            break;
        }

        // Collect key until '='
        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c == ',' || c.is_whitespace() {
                break;
            }
            key.push(c);
            chars.next();
        }

        if chars.peek() != Some(&'=') {
            // Bare token, not an attribute
            continue;
        }
        chars.next(); // consume '='

        // Stray quotes before a key show up in real-world playlists
        let key = key.trim_matches('"').to_ascii_lowercase();

        let value = match chars.peek() {
            Some(&'"') => {
                chars.next(); // consume opening quote
                let mut value = String::new();
                while let Some(c) = chars.next() {
                    if c == '"' {
                        break;
                    }
                    // Handle escaped quotes
                    if c == '\\' && chars.peek() == Some(&'"') {
                        value.push('"');
                        chars.next();
                        continue;
                    }
                    value.push(c);
                }
                value
            }
            _ => {
                // Unquoted value - read until space or comma
                let mut value = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || c == ',' {
                        break;
                    }
                    value.push(c);
                    chars.next();
                }
                value
            }
        };

        if !key.is_empty() {
            attrs.push((key, value));
        }
    }

    attrs
}
