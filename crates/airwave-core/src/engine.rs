//! PlaybackEngine: owns the active station, the play/pause intent and the
//! lifecycle of the single audio source.
//!
//! Starting audio is asynchronous.  Every play attempt is spawned as its own
//! task and tagged with `(attempt number, station id)`; its result comes back
//! to the owner as a `PlayOutcome` over a channel and is applied with
//! `on_play_resolved`.  Only the most recently issued attempt may mutate the
//! session.  Anything older resolves as `Resolution::Superseded` and changes
//! nothing, so a slow stream for station A can never overwrite the state of
//! station B.
//!
//! ```text
//!   Idle ──select──▶ Loading ──ok──▶ Playing
//!                      │  ▲             │
//!                    fail │ toggle     toggle
//!                      ▼  │             ▼
//!                    Failed ◀──────── Paused
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use airwave_proto::config::PlaybackConfig;
use airwave_proto::protocol::PlaybackStatus;
use airwave_proto::station::Station;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::audio::AudioOutput;
use crate::error::PlaybackError;

/// Identity of one play attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayTag {
    pub attempt: u64,
    pub station_id: String,
}

/// What the attempt task observed.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptResult {
    Played,
    Failed(PlaybackError),
    /// Superseded before the output was ever asked to play.
    Skipped,
}

#[derive(Debug, Clone)]
pub struct PlayOutcome {
    pub tag: PlayTag,
    pub result: AttemptResult,
}

/// How a `PlayOutcome` was applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Started,
    Failed(PlaybackError),
    /// A newer attempt or station replaced this one; nothing changed.
    Superseded,
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub initial_volume: f32,
    pub restart_grace: Duration,
    pub play_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from(&PlaybackConfig::default())
    }
}

impl From<&PlaybackConfig> for EngineOptions {
    fn from(config: &PlaybackConfig) -> Self {
        Self {
            initial_volume: config.default_volume,
            restart_grace: config.restart_grace(),
            play_timeout: config.play_timeout(),
        }
    }
}

/// Mutable playback state.
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    pub active_station: Option<Station>,
    /// What the listener asked for, independent of whether audio flows.
    pub intended_playing: bool,
    /// True only while a play attempt is outstanding.
    pub loading: bool,
    pub volume: f32,
    pub status: PlaybackStatus,
    pub last_error: Option<PlaybackError>,
}

impl PlaybackSession {
    fn new(volume: f32) -> Self {
        Self {
            active_station: None,
            intended_playing: false,
            loading: false,
            volume: clamp_volume(volume).unwrap_or(1.0),
            status: PlaybackStatus::Idle,
            last_error: None,
        }
    }
}

fn clamp_volume(value: f32) -> Option<f32> {
    value.is_finite().then(|| value.clamp(0.0, 1.0))
}

pub struct PlaybackEngine {
    output: Arc<dyn AudioOutput>,
    session: PlaybackSession,
    options: EngineOptions,
    /// Whether the output currently holds a source we set.
    source_set: bool,
    attempt_seq: u64,
    current: Option<PlayTag>,
    /// Attempt number attempt tasks check before touching the output; 0 when
    /// no attempt is live.
    live_attempt: Arc<AtomicU64>,
    outcome_tx: mpsc::UnboundedSender<PlayOutcome>,
}

impl PlaybackEngine {
    pub fn new(
        output: Arc<dyn AudioOutput>,
        options: EngineOptions,
        outcome_tx: mpsc::UnboundedSender<PlayOutcome>,
    ) -> Self {
        Self {
            output,
            session: PlaybackSession::new(options.initial_volume),
            options,
            source_set: false,
            attempt_seq: 0,
            current: None,
            live_attempt: Arc::new(AtomicU64::new(0)),
            outcome_tx,
        }
    }

    pub fn session(&self) -> &PlaybackSession {
        &self.session
    }

    pub fn active_station(&self) -> Option<&Station> {
        self.session.active_station.as_ref()
    }

    /// Make `station` the active one and start it.  Any previous source is
    /// released first and any outstanding attempt is superseded.
    pub async fn select_station(&mut self, station: Station) {
        info!("PlaybackEngine: selecting '{}' ({})", station.name, station.id);

        self.supersede();
        self.teardown().await;

        self.session.active_station = Some(station.clone());
        self.session.intended_playing = true;
        self.session.last_error = None;

        if self.load_source(&station).await {
            self.issue_play();
        }
    }

    /// Flip the play/pause intent.  Without an active station this is a
    /// no-op and returns false.
    pub async fn toggle_play(&mut self) -> bool {
        let Some(station) = self.session.active_station.clone() else {
            debug!("PlaybackEngine: toggle with no active station");
            return false;
        };

        self.session.intended_playing = !self.session.intended_playing;
        if self.session.intended_playing {
            info!("PlaybackEngine: resume '{}'", station.name);
            self.session.last_error = None;
            if self.source_set || self.load_source(&station).await {
                self.issue_play();
            }
        } else {
            info!("PlaybackEngine: pause '{}'", station.name);
            self.supersede();
            self.session.loading = false;
            self.session.status = PlaybackStatus::Paused;
            if let Err(e) = self.output.pause().await {
                warn!("PlaybackEngine: pause failed: {}", e);
            }
        }
        true
    }

    /// Clamp and apply a volume.  Non-finite input is ignored.  Returns the
    /// volume now in effect.
    pub async fn set_volume(&mut self, value: f32) -> f32 {
        let Some(volume) = clamp_volume(value) else {
            warn!("PlaybackEngine: ignoring volume {}", value);
            return self.session.volume;
        };

        self.session.volume = volume;
        if self.source_set {
            if let Err(e) = self.output.set_volume(volume).await {
                warn!("PlaybackEngine: set_volume failed: {}", e);
            }
        }
        volume
    }

    /// Apply the result of a play attempt.
    pub async fn on_play_resolved(&mut self, outcome: PlayOutcome) -> Resolution {
        let is_current = self.current.as_ref() == Some(&outcome.tag)
            && self.session.active_station.as_ref().map(|s| s.id.as_str())
                == Some(outcome.tag.station_id.as_str());

        if !is_current {
            debug!(
                "PlaybackEngine: discarding attempt {} for {} ({:?})",
                outcome.tag.attempt, outcome.tag.station_id, outcome.result
            );
            // A late start must not override an explicit pause.
            if outcome.result == AttemptResult::Played
                && self.source_set
                && !self.session.intended_playing
            {
                if let Err(e) = self.output.pause().await {
                    warn!("PlaybackEngine: re-pause failed: {}", e);
                }
            }
            return Resolution::Superseded;
        }

        self.current = None;
        self.live_attempt.store(0, Ordering::SeqCst);
        self.session.loading = false;

        match outcome.result {
            AttemptResult::Played => {
                info!("PlaybackEngine: playing {}", outcome.tag.station_id);
                self.session.status = PlaybackStatus::Playing;
                Resolution::Started
            }
            AttemptResult::Failed(e) => {
                warn!("PlaybackEngine: {} failed: {}", outcome.tag.station_id, e);
                self.fail(e.clone());
                Resolution::Failed(e)
            }
            AttemptResult::Skipped => Resolution::Superseded,
        }
    }

    /// Pause and release the output regardless of state.  Must run on every
    /// exit path of the owner.
    pub async fn shutdown(&mut self) {
        info!("PlaybackEngine: shutting down");
        self.supersede();
        self.teardown().await;
        self.session.loading = false;
        self.session.intended_playing = false;
        if self.session.active_station.is_some() {
            self.session.status = PlaybackStatus::Paused;
        }
    }

    // ── internals ─────────────────────────────────────────────────────────────

    async fn load_source(&mut self, station: &Station) -> bool {
        if let Err(e) = self.output.set_source(&station.stream_url).await {
            warn!(
                "PlaybackEngine: cannot load '{}' ({}): {}",
                station.name, station.stream_url, e
            );
            self.fail(e);
            return false;
        }
        self.source_set = true;
        if let Err(e) = self.output.set_volume(self.session.volume).await {
            warn!("PlaybackEngine: set_volume failed: {}", e);
        }
        true
    }

    fn issue_play(&mut self) {
        let Some(station_id) = self.session.active_station.as_ref().map(|s| s.id.clone()) else {
            return;
        };

        self.attempt_seq += 1;
        let tag = PlayTag {
            attempt: self.attempt_seq,
            station_id,
        };
        self.live_attempt.store(tag.attempt, Ordering::SeqCst);
        self.current = Some(tag.clone());
        self.session.loading = true;
        self.session.status = PlaybackStatus::Loading;
        debug!(
            "PlaybackEngine: issuing attempt {} for {}",
            tag.attempt, tag.station_id
        );

        let output = Arc::clone(&self.output);
        let live_attempt = Arc::clone(&self.live_attempt);
        let outcome_tx = self.outcome_tx.clone();
        let grace = self.options.restart_grace;
        let timeout = self.options.play_timeout;

        tokio::spawn(async move {
            if !grace.is_zero() {
                tokio::time::sleep(grace).await;
            }
            let result = if live_attempt.load(Ordering::SeqCst) != tag.attempt {
                AttemptResult::Skipped
            } else {
                match tokio::time::timeout(timeout, output.play()).await {
                    Ok(Ok(())) => AttemptResult::Played,
                    Ok(Err(e)) => AttemptResult::Failed(e),
                    Err(_) => AttemptResult::Failed(PlaybackError::TimedOut(timeout.as_secs())),
                }
            };
            // The owner may already be gone during shutdown.
            let _ = outcome_tx.send(PlayOutcome { tag, result });
        });
    }

    /// Forget the outstanding attempt so its result resolves as superseded.
    fn supersede(&mut self) {
        if let Some(tag) = self.current.take() {
            debug!("PlaybackEngine: superseding attempt {}", tag.attempt);
        }
        self.live_attempt.store(0, Ordering::SeqCst);
    }

    async fn teardown(&mut self) {
        if let Err(e) = self.output.pause().await {
            debug!("PlaybackEngine: teardown pause: {}", e);
        }
        if let Err(e) = self.output.release().await {
            warn!("PlaybackEngine: teardown release: {}", e);
        }
        self.source_set = false;
    }

    /// The output dropped the source on error, so a retry must load it again.
    fn fail(&mut self, error: PlaybackError) {
        self.source_set = false;
        self.current = None;
        self.live_attempt.store(0, Ordering::SeqCst);
        self.session.loading = false;
        self.session.intended_playing = false;
        self.session.status = PlaybackStatus::Failed;
        self.session.last_error = Some(error);
    }
}
