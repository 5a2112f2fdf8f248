//! Test doubles whose async operations are resolved explicitly by the test.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use airwave_core::error::{NetworkError, PlaybackError};
use airwave_core::{AudioOutput, StationCatalog};
use airwave_proto::protocol::CatalogQuery;
use airwave_proto::station::Station;
use async_trait::async_trait;
use tokio::sync::{oneshot, Notify};

pub fn station(id: &str) -> Station {
    Station {
        id: id.to_string(),
        name: format!("Station {id}"),
        stream_url: format!("http://stream.example/{id}"),
        codec: Some("MP3".to_string()),
        favicon_url: Some(format!("http://img.example/{id}.png")),
        ..Station::default()
    }
}

// ── ScriptedOutput ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    SetSource(String),
    Play,
    Pause,
    SetVolume(f32),
    Release,
}

type PlayReply = oneshot::Sender<Result<(), PlaybackError>>;

/// Records every call.  Each `play()` parks until the test resolves it.
#[derive(Default)]
pub struct ScriptedOutput {
    calls: Mutex<Vec<Call>>,
    plays: Mutex<Vec<Option<PlayReply>>>,
    play_started: Notify,
    fail_next_source: AtomicBool,
}

impl ScriptedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn play_count(&self) -> usize {
        self.plays.lock().unwrap().len()
    }

    pub fn fail_next_source(&self) {
        self.fail_next_source.store(true, Ordering::SeqCst);
    }

    /// Wait until at least `n` `play()` calls are parked or resolved.
    pub async fn wait_for_plays(&self, n: usize) {
        loop {
            let notified = self.play_started.notified();
            if self.play_count() >= n {
                return;
            }
            notified.await;
        }
    }

    /// Resolve the `n`th `play()` call (0-based).
    pub fn resolve_play(&self, n: usize, result: Result<(), PlaybackError>) {
        let reply = self.plays.lock().unwrap()[n]
            .take()
            .expect("play already resolved");
        let _ = reply.send(result);
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl AudioOutput for ScriptedOutput {
    async fn set_source(&self, url: &str) -> Result<(), PlaybackError> {
        self.record(Call::SetSource(url.to_string()));
        if self.fail_next_source.swap(false, Ordering::SeqCst) {
            return Err(PlaybackError::Unsupported(url.to_string()));
        }
        Ok(())
    }

    async fn play(&self) -> Result<(), PlaybackError> {
        self.record(Call::Play);
        let (tx, rx) = oneshot::channel();
        self.plays.lock().unwrap().push(Some(tx));
        self.play_started.notify_waiters();
        rx.await
            .unwrap_or_else(|_| Err(PlaybackError::Output("test dropped play".to_string())))
    }

    async fn pause(&self) -> Result<(), PlaybackError> {
        self.record(Call::Pause);
        Ok(())
    }

    async fn set_volume(&self, volume: f32) -> Result<(), PlaybackError> {
        self.record(Call::SetVolume(volume));
        Ok(())
    }

    async fn release(&self) -> Result<(), PlaybackError> {
        self.record(Call::Release);
        Ok(())
    }
}

// ── ScriptedCatalog ───────────────────────────────────────────────────────────

type SearchReply = oneshot::Sender<Result<Vec<Station>, NetworkError>>;

/// Searches park until resolved; the popular list answers immediately from
/// whatever was last configured (`None` answers with an error).
#[derive(Default)]
pub struct ScriptedCatalog {
    searches: Mutex<Vec<(CatalogQuery, Option<SearchReply>)>>,
    search_started: Notify,
    popular: Mutex<Option<Vec<Station>>>,
}

impl ScriptedCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_popular(&self, stations: Option<Vec<Station>>) {
        *self.popular.lock().unwrap() = stations;
    }

    pub fn queries(&self) -> Vec<CatalogQuery> {
        self.searches
            .lock()
            .unwrap()
            .iter()
            .map(|(q, _)| q.clone())
            .collect()
    }

    pub async fn wait_for_searches(&self, n: usize) {
        loop {
            let notified = self.search_started.notified();
            if self.searches.lock().unwrap().len() >= n {
                return;
            }
            notified.await;
        }
    }

    pub fn resolve_search(&self, n: usize, result: Result<Vec<Station>, NetworkError>) {
        let reply = self.searches.lock().unwrap()[n]
            .1
            .take()
            .expect("search already resolved");
        let _ = reply.send(result);
    }
}

pub fn server_error() -> NetworkError {
    NetworkError::Status(reqwest::StatusCode::INTERNAL_SERVER_ERROR)
}

#[async_trait]
impl StationCatalog for ScriptedCatalog {
    async fn search(&self, query: &CatalogQuery) -> Result<Vec<Station>, NetworkError> {
        let (tx, rx) = oneshot::channel();
        self.searches
            .lock()
            .unwrap()
            .push((query.clone(), Some(tx)));
        self.search_started.notify_waiters();
        rx.await.unwrap_or_else(|_| Err(server_error()))
    }

    async fn top_popular(
        &self,
        _limit: usize,
        _language: &str,
    ) -> Result<Vec<Station>, NetworkError> {
        self.popular.lock().unwrap().clone().ok_or_else(server_error)
    }
}
