//! IPTV playlist ingestion
//!
//! Fetches M3U/M3U8 playlists, parses them into channels and keeps the
//! collection persisted, along with favorites, watch history and the
//! automatic update schedule.

pub mod catalog;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod library;
pub mod m3u_parser;
pub mod models;
pub mod repository;
pub mod scheduler;
pub mod storage;

#[cfg(test)]
mod test_support;

pub use error::{PlaylistError, Result, StorageError};
pub use models::{Channel, Playlist};
pub use repository::PlaylistRepository;
