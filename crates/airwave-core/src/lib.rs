//! Playback session core for the airwave radio player.
//!
//! `SessionController` is the entry point: it composes the station catalog
//! client, the favorites store, the playlist and the playback engine, and
//! publishes `SessionState` snapshots as they change.

pub mod audio;
pub mod catalog;
pub mod controller;
pub mod engine;
pub mod error;
pub mod favorites;
pub mod mpv;
pub mod playlist;

pub use audio::AudioOutput;
pub use catalog::{RadioBrowserCatalog, StationCatalog};
pub use controller::{ControllerOptions, Processed, SessionController};
pub use engine::{EngineOptions, PlaybackEngine, Resolution};
pub use favorites::{FavoritesStore, JsonFileStore, KeyValueStore, MemoryStore};
pub use mpv::MpvOutput;
pub use playlist::Playlist;
