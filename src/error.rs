//! Error types for playlist ingestion and persistence

use thiserror::Error;

/// Errors surfaced by the parser, the fetcher and the stores.
#[derive(Error, Debug)]
pub enum PlaylistError {
    /// The document's first non-empty line lacks the `#EXTM3U` marker
    #[error("Invalid M3U format: missing #EXTM3U header")]
    Format,

    /// Transport failure (`status` is `None`) or a non-success HTTP status
    #[error("{}", network_message(.status, .message))]
    Network { status: Option<u16>, message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl PlaylistError {
    pub fn network(message: impl Into<String>) -> Self {
        PlaylistError::Network { status: None, message: message.into() }
    }

    pub fn http_status(status: u16, message: impl Into<String>) -> Self {
        PlaylistError::Network { status: Some(status), message: message.into() }
    }

    /// HTTP status carried by a network error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            PlaylistError::Network { status, .. } => *status,
            _ => None,
        }
    }
}

fn network_message(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("Failed to fetch playlist: {} {}", code, message).trim_end().to_string(),
        None => format!("Request failed: {}", message),
    }
}

/// Errors from the key-value persistence layer
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O failure on key '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PlaylistError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_error_display() {
        let err = PlaylistError::http_status(404, "Not Found");
        assert_eq!(err.to_string(), "Failed to fetch playlist: 404 Not Found");
        assert_eq!(err.status(), Some(404));

        let err = PlaylistError::network("connection refused");
        assert_eq!(err.to_string(), "Request failed: connection refused");
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_storage_error_converts() {
        let json_err = serde_json::from_str::<Vec<String>>("not json").unwrap_err();
        let err: PlaylistError = StorageError::from(json_err).into();
        assert!(matches!(err, PlaylistError::Storage(StorageError::Serialization(_))));
    }
}
