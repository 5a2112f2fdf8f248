use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::station::Station;

/// Current protocol version.  Bump this when the wire format changes in a
/// breaking way.  Clients check this on connect and can refuse to talk to an
/// incompatible daemon.
pub const PROTOCOL_VERSION: u32 = 1;

/// Messages sent from a client to the daemon.  Each variant is one
/// user-facing control.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "cmd")]
pub enum Command {
    /// Play the playlist entry at `idx`.
    PlayStation { idx: usize },
    PlayFavorite { id: String },
    PlayPopular { idx: usize },
    TogglePlay,
    Next,
    Prev,
    Random,
    Volume { value: f32 },
    /// Add a station to favorites; `None` means the active station.
    AddFavorite {
        #[serde(default)]
        id: Option<String>,
    },
    RemoveFavorite { id: String },
    Search { text: String },
    SelectGenre { tag: String },
    RefreshPopular,
    GetState,
}

/// Messages sent from the daemon to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "broadcast")]
pub enum Broadcast {
    /// Sent immediately on connect: protocol version + full state snapshot.
    Hello {
        protocol_version: u32,
        rev: u64,
        state: SessionState,
    },
    State {
        data: SessionState,
    },
    /// Non-fatal, user-facing notice (e.g. favorites are full).
    Notice {
        message: String,
    },
    Log {
        message: String,
    },
}

/// Transport state of the playback engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    #[default]
    Idle, // no station selected yet
    Loading, // source set, play requested, awaiting confirmation
    Playing,
    Paused,
    Failed, // last play attempt for the active station failed
}

/// Why audio could not be started for the active station.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "detail")]
pub enum PlaybackError {
    #[error("stream format not supported: {0}")]
    Unsupported(String),
    #[error("stream unreachable: {0}")]
    Unreachable(String),
    #[error("no audio after {0}s")]
    TimedOut(u64),
    #[error("audio output error: {0}")]
    Output(String),
}

impl PlaybackError {
    /// Message suitable for showing to the listener.
    pub fn user_message(&self) -> &'static str {
        "Unable to play this station. Please try another."
    }
}

/// A catalog query: exactly one of a free-text name or a genre tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "by", content = "value", rename_all = "lowercase")]
pub enum CatalogQuery {
    Name(String),
    Tag(String),
}

/// Full session snapshot.  `rev` is a monotonically increasing counter
/// incremented every time the state changes, so clients can detect missed
/// updates.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionState {
    #[serde(default)]
    pub rev: u64,
    pub playlist: Vec<Station>,
    /// Cursor into `playlist`; meaningless while the playlist is empty.
    pub current_index: usize,
    pub active_station: Option<Station>,
    pub intended_playing: bool,
    pub loading: bool,
    pub volume: f32,
    pub status: PlaybackStatus,
    pub last_error: Option<PlaybackError>,
    /// Listener-facing text for `last_error`.
    #[serde(default)]
    pub error_message: Option<String>,
    pub favorites: Vec<Station>,
    pub popular: Vec<Station>,
    pub query: Option<CatalogQuery>,
    pub catalog_loading: bool,
    pub catalog_error: Option<String>,
}

/// Wrapper for socket communication
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Command(Command),
    Broadcast(Broadcast),
}

impl Message {
    /// Length-prefixed (u32 big-endian) JSON frame.
    pub fn encode(&self) -> anyhow::Result<Vec<u8>> {
        let json = serde_json::to_vec(self)?;
        let len = json.len() as u32;
        let mut result = Vec::with_capacity(4 + json.len());
        result.extend_from_slice(&len.to_be_bytes());
        result.extend_from_slice(&json);
        Ok(result)
    }

    pub fn decode(data: &[u8]) -> anyhow::Result<(Self, usize)> {
        if data.len() < 4 {
            anyhow::bail!("Insufficient data for length header");
        }
        let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if data.len() < 4 + len {
            anyhow::bail!("Insufficient data for message");
        }
        let msg: Self = serde_json::from_slice(&data[4..4 + len])?;
        Ok((msg, 4 + len))
    }
}
