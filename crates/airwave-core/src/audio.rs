//! The audio output capability driven by the playback engine.

use async_trait::async_trait;

use crate::error::PlaybackError;

/// A single audio sink with one current source.
///
/// Only `PlaybackEngine` talks to an output.  `play()` resolves once audio is
/// actually flowing (or has definitely failed); every other operation is
/// expected to complete promptly.
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Point the output at a stream without starting it.
    async fn set_source(&self, url: &str) -> Result<(), PlaybackError>;

    /// Start the current source and wait until audio flows.
    async fn play(&self) -> Result<(), PlaybackError>;

    async fn pause(&self) -> Result<(), PlaybackError>;

    /// `volume` is already clamped to 0.0..=1.0.
    async fn set_volume(&self, volume: f32) -> Result<(), PlaybackError>;

    /// Drop the current source, if any.
    async fn release(&self) -> Result<(), PlaybackError>;
}
