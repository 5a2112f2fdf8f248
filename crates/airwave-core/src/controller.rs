//! SessionController: single-owner event loop for all session state.
//!
//! The controller owns the `PlaybackEngine`, the `Playlist`, the
//! `FavoritesStore` and the popular list exclusively.  Clients never touch
//! them; they send `Command`s into `run()` (or call the methods directly when
//! embedding).  Work that has to wait on the network or on the audio output
//! runs in spawned tasks that report back over channels:
//!
//! ```text
//!   commands ──▶ ┌──────────────────┐ ──▶ watch<SessionState>   (snapshots)
//!   play_rx  ──▶ │ SessionController │ ──▶ broadcast<String>     (notices)
//!   catalog_rx ▶ └──────────────────┘
//! ```
//!
//! Every catalog and popular query carries a sequence number and every play
//! attempt carries a `PlayTag`; only the most recently issued request of each
//! kind may mutate state.
//!
//! After each change the controller bumps `rev` and publishes a fresh
//! snapshot.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use airwave_proto::config::Config;
use airwave_proto::protocol::{CatalogQuery, Command, SessionState};
use airwave_proto::station::Station;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use crate::audio::AudioOutput;
use crate::catalog::StationCatalog;
use crate::engine::{EngineOptions, PlayOutcome, PlaybackEngine, PlaybackSession, Resolution};
use crate::error::{FavoritesError, NetworkError};
use crate::favorites::{AddOutcome, FavoritesStore};
use crate::playlist::Playlist;

pub const FETCH_ERROR_MESSAGE: &str = "Failed to fetch stations. Please try again.";
pub const SEARCH_ERROR_MESSAGE: &str = "Failed to search stations. Please try again.";

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub engine: EngineOptions,
    pub language: String,
    pub popular_limit: usize,
    /// Zero disables the periodic refresh.
    pub popular_refresh: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ControllerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            engine: EngineOptions::from(&config.playback),
            language: config.catalog.language.clone(),
            popular_limit: config.catalog.popular_limit,
            popular_refresh: config.catalog.popular_refresh(),
        }
    }
}

/// Result of a spawned catalog query.
#[derive(Debug)]
enum CatalogOutcome {
    Search {
        seq: u64,
        query: CatalogQuery,
        result: Result<Vec<Station>, NetworkError>,
    },
    Popular {
        seq: u64,
        result: Result<Vec<Station>, NetworkError>,
    },
}

/// What `process_next` handled.
#[derive(Debug, Clone, PartialEq)]
pub enum Processed {
    Play(Resolution),
    /// `current` is false when the result was stale and discarded.
    Search { current: bool },
    Popular { current: bool },
}

pub struct SessionController {
    engine: PlaybackEngine,
    catalog: Arc<dyn StationCatalog>,
    favorites: FavoritesStore,
    playlist: Playlist,
    popular: Vec<Station>,
    query: Option<CatalogQuery>,
    query_seq: u64,
    popular_seq: u64,
    catalog_loading: bool,
    catalog_error: Option<String>,
    rev: u64,
    options: ControllerOptions,
    play_rx: mpsc::UnboundedReceiver<PlayOutcome>,
    catalog_tx: mpsc::UnboundedSender<CatalogOutcome>,
    catalog_rx: mpsc::UnboundedReceiver<CatalogOutcome>,
    state_tx: watch::Sender<SessionState>,
    notice_tx: broadcast::Sender<String>,
}

impl SessionController {
    pub fn new(
        output: Arc<dyn AudioOutput>,
        catalog: Arc<dyn StationCatalog>,
        favorites: FavoritesStore,
        options: ControllerOptions,
    ) -> Self {
        let (play_tx, play_rx) = mpsc::unbounded_channel();
        let (catalog_tx, catalog_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(SessionState::default());
        let (notice_tx, _) = broadcast::channel(32);

        let controller = Self {
            engine: PlaybackEngine::new(output, options.engine.clone(), play_tx),
            catalog,
            favorites,
            playlist: Playlist::default(),
            popular: Vec::new(),
            query: None,
            query_seq: 0,
            popular_seq: 0,
            catalog_loading: false,
            catalog_error: None,
            rev: 0,
            options,
            play_rx,
            catalog_tx,
            catalog_rx,
            state_tx,
            notice_tx,
        };
        controller.state_tx.send_replace(controller.snapshot());
        controller
    }

    // ── observation ───────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> SessionState {
        let session = self.engine.session();
        SessionState {
            rev: self.rev,
            playlist: self.playlist.stations().to_vec(),
            current_index: self.playlist.current_index(),
            active_station: session.active_station.clone(),
            intended_playing: session.intended_playing,
            loading: session.loading,
            volume: session.volume,
            status: session.status,
            last_error: session.last_error.clone(),
            error_message: session
                .last_error
                .as_ref()
                .map(|e| e.user_message().to_string()),
            favorites: self.favorites.stations().to_vec(),
            popular: self.popular.clone(),
            query: self.query.clone(),
            catalog_loading: self.catalog_loading,
            catalog_error: self.catalog_error.clone(),
        }
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<String> {
        self.notice_tx.subscribe()
    }

    pub fn session(&self) -> &PlaybackSession {
        self.engine.session()
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    pub fn favorites(&self) -> &FavoritesStore {
        &self.favorites
    }

    pub fn popular(&self) -> &[Station] {
        &self.popular
    }

    pub fn catalog_error(&self) -> Option<&str> {
        self.catalog_error.as_deref()
    }

    fn publish(&mut self) {
        self.rev += 1;
        let snapshot = self.snapshot();
        self.state_tx.send_replace(snapshot);
    }

    fn notify(&self, message: impl Into<String>) {
        let message = message.into();
        info!("SessionController: notice: {}", message);
        // No subscribers is fine.
        let _ = self.notice_tx.send(message);
    }

    // ── commands ──────────────────────────────────────────────────────────────

    pub async fn handle_command(&mut self, cmd: Command) {
        debug!("SessionController: command {:?}", cmd);
        match cmd {
            Command::PlayStation { idx } => self.select_playlist(idx).await,
            Command::PlayFavorite { id } => self.select_favorite(&id).await,
            Command::PlayPopular { idx } => self.select_popular(idx).await,
            Command::TogglePlay => self.toggle_play().await,
            Command::Next => self.next().await,
            Command::Prev => self.previous().await,
            Command::Random => self.random().await,
            Command::Volume { value } => self.set_volume(value).await,
            Command::AddFavorite { id } => self.add_favorite_by_id(id.as_deref()),
            Command::RemoveFavorite { id } => self.remove_favorite(&id),
            Command::Search { text } => self.search(&text),
            Command::SelectGenre { tag } => self.select_genre(&tag),
            Command::RefreshPopular => self.refresh_popular(),
            Command::GetState => self.publish(),
        }
    }

    pub async fn select_playlist(&mut self, idx: usize) {
        let Some(station) = self.playlist.select(idx).cloned() else {
            warn!(
                "SessionController: playlist index {} out of range ({})",
                idx,
                self.playlist.len()
            );
            return;
        };
        self.play(station).await;
    }

    pub async fn select_favorite(&mut self, station_id: &str) {
        match self.favorites.get(station_id).cloned() {
            Some(station) => self.select_station(station).await,
            None => warn!("SessionController: no favorite with id {}", station_id),
        }
    }

    pub async fn select_popular(&mut self, idx: usize) {
        match self.popular.get(idx).cloned() {
            Some(station) => self.select_station(station).await,
            None => warn!("SessionController: popular index {} out of range", idx),
        }
    }

    /// Play a station picked from anywhere.  If it is also in the playlist
    /// the cursor follows it.
    pub async fn select_station(&mut self, station: Station) {
        if let Some(idx) = self.playlist.position(&station.id) {
            self.playlist.select(idx);
        }
        self.play(station).await;
    }

    pub async fn toggle_play(&mut self) {
        if self.engine.toggle_play().await {
            self.publish();
        }
    }

    pub async fn next(&mut self) {
        match self.playlist.next().cloned() {
            Some(station) => self.play(station).await,
            None => debug!("SessionController: next on empty playlist"),
        }
    }

    pub async fn previous(&mut self) {
        match self.playlist.previous().cloned() {
            Some(station) => self.play(station).await,
            None => debug!("SessionController: previous on empty playlist"),
        }
    }

    pub async fn random(&mut self) {
        match self.playlist.random().cloned() {
            Some(station) => self.play(station).await,
            None => debug!("SessionController: random on empty playlist"),
        }
    }

    pub async fn set_volume(&mut self, value: f32) {
        self.engine.set_volume(value).await;
        self.publish();
    }

    async fn play(&mut self, station: Station) {
        self.engine.select_station(station).await;
        self.publish();
    }

    // ── favorites ─────────────────────────────────────────────────────────────

    /// Add `station_id`, or the active station when `None`.  The station is
    /// looked up among the active station, the playlist and the popular list.
    pub fn add_favorite_by_id(&mut self, station_id: Option<&str>) {
        let station = match station_id {
            None => self.engine.active_station().cloned(),
            Some(id) => self
                .engine
                .active_station()
                .filter(|s| s.id == id)
                .or_else(|| self.playlist.stations().iter().find(|s| s.id == id))
                .or_else(|| self.popular.iter().find(|s| s.id == id))
                .cloned(),
        };
        match station {
            Some(station) => self.add_favorite(station),
            None => warn!(
                "SessionController: add favorite: unknown station {:?}",
                station_id
            ),
        }
    }

    pub fn add_favorite(&mut self, station: Station) {
        match self.favorites.add(station) {
            Ok(AddOutcome::Added) => self.publish(),
            Ok(AddOutcome::AlreadyPresent) => debug!("SessionController: already a favorite"),
            Err(e @ FavoritesError::CapacityExceeded { .. }) => self.notify(e.to_string()),
            Err(FavoritesError::Storage(e)) => {
                warn!("SessionController: could not save favorites: {}", e);
                self.notify("Could not save favorites.");
            }
        }
    }

    pub fn remove_favorite(&mut self, station_id: &str) {
        match self.favorites.remove(station_id) {
            Ok(true) => self.publish(),
            Ok(false) => debug!("SessionController: {} was not a favorite", station_id),
            Err(e) => {
                warn!("SessionController: could not save favorites: {}", e);
                self.notify("Could not save favorites.");
            }
        }
    }

    // ── catalog queries ───────────────────────────────────────────────────────

    /// Free-text search.  Blank input is ignored.
    pub fn search(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            debug!("SessionController: ignoring empty search");
            return;
        }
        self.issue_query(CatalogQuery::Name(text.to_string()));
    }

    /// Genre browse by tag.  Blank input is ignored.
    pub fn select_genre(&mut self, tag: &str) {
        let tag = tag.trim();
        if tag.is_empty() {
            debug!("SessionController: ignoring empty genre");
            return;
        }
        self.issue_query(CatalogQuery::Tag(tag.to_lowercase()));
    }

    fn issue_query(&mut self, query: CatalogQuery) {
        self.query_seq += 1;
        let seq = self.query_seq;
        info!("SessionController: query #{} {:?}", seq, query);

        self.playlist.clear();
        self.query = Some(query.clone());
        self.catalog_loading = true;
        self.catalog_error = None;
        self.publish();

        let catalog = Arc::clone(&self.catalog);
        let tx = self.catalog_tx.clone();
        tokio::spawn(async move {
            let result = catalog.search(&query).await;
            let _ = tx.send(CatalogOutcome::Search { seq, query, result });
        });
    }

    pub fn refresh_popular(&mut self) {
        self.popular_seq += 1;
        let seq = self.popular_seq;
        debug!("SessionController: popular refresh #{}", seq);

        let catalog = Arc::clone(&self.catalog);
        let tx = self.catalog_tx.clone();
        let limit = self.options.popular_limit;
        let language = self.options.language.clone();
        tokio::spawn(async move {
            let result = catalog.top_popular(limit, &language).await;
            let _ = tx.send(CatalogOutcome::Popular { seq, result });
        });
    }

    fn on_catalog_outcome(&mut self, outcome: CatalogOutcome) -> Processed {
        match outcome {
            CatalogOutcome::Search { seq, query, result } => {
                if seq != self.query_seq {
                    debug!(
                        "SessionController: discarding stale query #{} (latest #{})",
                        seq, self.query_seq
                    );
                    return Processed::Search { current: false };
                }
                self.catalog_loading = false;
                match result {
                    Ok(stations) => {
                        info!(
                            "SessionController: query #{} → {} stations",
                            seq,
                            stations.len()
                        );
                        self.playlist.replace(stations);
                    }
                    Err(e) => {
                        warn!("SessionController: query #{} failed: {}", seq, e);
                        self.playlist.clear();
                        self.catalog_error = Some(
                            match query {
                                CatalogQuery::Name(_) => SEARCH_ERROR_MESSAGE,
                                CatalogQuery::Tag(_) => FETCH_ERROR_MESSAGE,
                            }
                            .to_string(),
                        );
                    }
                }
                self.publish();
                Processed::Search { current: true }
            }
            CatalogOutcome::Popular { seq, result } => {
                if seq != self.popular_seq {
                    return Processed::Popular { current: false };
                }
                match result {
                    Ok(stations) => {
                        debug!("SessionController: {} popular stations", stations.len());
                        self.popular = stations;
                        self.publish();
                    }
                    Err(e) => warn!(
                        "SessionController: popular refresh failed, keeping previous list: {}",
                        e
                    ),
                }
                Processed::Popular { current: true }
            }
        }
    }

    async fn on_play_outcome(&mut self, outcome: PlayOutcome) -> Processed {
        let resolution = self.engine.on_play_resolved(outcome).await;
        if resolution != Resolution::Superseded {
            self.publish();
        }
        Processed::Play(resolution)
    }

    /// Wait for the next background result and apply it.  Pends until one
    /// arrives; the controller holds a sender for both result channels, so
    /// neither closes while it is alive.
    pub async fn process_next(&mut self) -> Processed {
        tokio::select! {
            Some(outcome) = self.play_rx.recv() => self.on_play_outcome(outcome).await,
            Some(outcome) = self.catalog_rx.recv() => self.on_catalog_outcome(outcome),
        }
    }

    // ── event loop ────────────────────────────────────────────────────────────

    /// Run until `shutdown` resolves or the command channel closes.  The
    /// audio output is torn down on every exit path.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        shutdown: impl Future<Output = ()>,
    ) {
        info!("SessionController: starting event loop");
        tokio::pin!(shutdown);

        let refresh_enabled = !self.options.popular_refresh.is_zero();
        let mut popular_tick = tokio::time::interval(if refresh_enabled {
            self.options.popular_refresh
        } else {
            Duration::from_secs(3600)
        });
        popular_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        if !refresh_enabled {
            self.refresh_popular();
        }

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("SessionController: shutdown requested");
                    break;
                }
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => {
                        info!("SessionController: command channel closed, shutting down");
                        break;
                    }
                },
                _ = popular_tick.tick(), if refresh_enabled => self.refresh_popular(),
                Some(outcome) = self.play_rx.recv() => {
                    self.on_play_outcome(outcome).await;
                }
                Some(outcome) = self.catalog_rx.recv() => {
                    self.on_catalog_outcome(outcome);
                }
            }
        }

        self.engine.shutdown().await;
        self.publish();
        info!("SessionController: stopped");
    }
}
