//! Error types for the playback session core.
//!
//! `PlaybackError` lives in `airwave-proto` because it travels inside the
//! session snapshot; it is re-exported here so callers have one place to
//! look.

use thiserror::Error;

pub use airwave_proto::protocol::PlaybackError;

/// Catalog query failure.  Callers show zero results and let the listener
/// resubmit; nothing retries automatically.
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("catalog request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("catalog returned HTTP {0}")]
    Status(reqwest::StatusCode),
}

/// Key-value persistence failure.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not encode value: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum FavoritesError {
    #[error("You can only have up to {limit} favorite stations.")]
    CapacityExceeded { limit: usize },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Failure talking to the audio backend process.
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("mpv binary not found (set MPV_PATH or install mpv)")]
    BinaryNotFound,

    #[error("mpv IPC socket did not appear")]
    SocketTimeout,

    #[error("mpv IPC: {0}")]
    Ipc(String),

    #[error("mpv rejected command: {0}")]
    Rejected(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<OutputError> for PlaybackError {
    fn from(e: OutputError) -> Self {
        PlaybackError::Output(e.to_string())
    }
}
