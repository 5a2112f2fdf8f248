//! Favorites: a bounded, deduplicated station list persisted as a whole on
//! every mutation.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use airwave_proto::station::Station;
use tracing::{debug, info, warn};

use crate::error::{FavoritesError, StorageError};

/// Storage key the favorites list lives under.
pub const FAVORITES_KEY: &str = "favorites";

pub const FAVORITES_CAPACITY: usize = 10;

/// Minimal persistence contract: whole values in, whole values out.
pub trait KeyValueStore: Send + Sync {
    /// `Ok(None)` when nothing was ever saved under `key`.
    fn load(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn save(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// One `<key>.json` file per key inside a directory.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for JsonFileStore {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        match std::fs::read_to_string(self.path(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.dir)?;
        // Write-then-rename so a crash never leaves a half-written file.
        let path = self.path(key);
        let tmp = self.dir.join(format!("{key}.json.tmp"));
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// Process-local store, for embedding and tests.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(key: &str, value: impl Into<String>) -> Self {
        let store = Self::new();
        store
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.into());
        store
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }
}

impl KeyValueStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.get(key))
    }

    fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    AlreadyPresent,
}

/// The listener's favorite stations, in insertion order.
///
/// The persisted copy is the source of truth: a mutation that cannot be
/// persisted is rolled back before the error is returned.
pub struct FavoritesStore {
    store: Arc<dyn KeyValueStore>,
    stations: Vec<Station>,
}

impl FavoritesStore {
    /// Load the persisted list.  Missing or malformed data yields an empty
    /// list; favorites are best-effort and never fail startup.
    pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let stations = match store.load(FAVORITES_KEY) {
            Ok(Some(content)) => match serde_json::from_str::<Vec<Station>>(&content) {
                Ok(stations) => normalize(stations),
                Err(e) => {
                    warn!("Favorites: ignoring malformed stored list: {}", e);
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Favorites: could not read stored list: {}", e);
                Vec::new()
            }
        };
        info!("Favorites: loaded {} stations", stations.len());
        Self { store, stations }
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn contains(&self, station_id: &str) -> bool {
        self.stations.iter().any(|s| s.id == station_id)
    }

    pub fn get(&self, station_id: &str) -> Option<&Station> {
        self.stations.iter().find(|s| s.id == station_id)
    }

    pub fn add(&mut self, station: Station) -> Result<AddOutcome, FavoritesError> {
        if self.contains(&station.id) {
            return Ok(AddOutcome::AlreadyPresent);
        }
        if self.stations.len() >= FAVORITES_CAPACITY {
            return Err(FavoritesError::CapacityExceeded {
                limit: FAVORITES_CAPACITY,
            });
        }

        debug!("Favorites: adding '{}'", station.name);
        self.stations.push(station);
        if let Err(e) = self.persist() {
            self.stations.pop();
            return Err(e.into());
        }
        Ok(AddOutcome::Added)
    }

    /// Returns whether anything was removed.
    pub fn remove(&mut self, station_id: &str) -> Result<bool, FavoritesError> {
        let Some(idx) = self.stations.iter().position(|s| s.id == station_id) else {
            return Ok(false);
        };

        let removed = self.stations.remove(idx);
        debug!("Favorites: removing '{}'", removed.name);
        if let Err(e) = self.persist() {
            self.stations.insert(idx, removed);
            return Err(e.into());
        }
        Ok(true)
    }

    fn persist(&self) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(&self.stations)?;
        self.store.save(FAVORITES_KEY, &json)
    }
}

/// Drop duplicates and unplayable entries, then cap at capacity.
fn normalize(stations: Vec<Station>) -> Vec<Station> {
    let mut seen = HashSet::new();
    stations
        .into_iter()
        .filter(|s| s.is_playable() && seen.insert(s.id.clone()))
        .take(FAVORITES_CAPACITY)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station(id: &str) -> Station {
        Station {
            id: id.to_string(),
            name: format!("Station {id}"),
            stream_url: format!("http://stream.example/{id}"),
            codec: Some("MP3".to_string()),
            ..Station::default()
        }
    }

    fn empty_store() -> (Arc<MemoryStore>, FavoritesStore) {
        let backing = Arc::new(MemoryStore::new());
        let favorites = FavoritesStore::load(backing.clone());
        (backing, favorites)
    }

    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn load(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into())
        }

        fn save(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into())
        }
    }

    #[test]
    fn test_add_is_idempotent() {
        let (_, mut favorites) = empty_store();
        assert_eq!(favorites.add(station("a")).unwrap(), AddOutcome::Added);
        assert_eq!(
            favorites.add(station("a")).unwrap(),
            AddOutcome::AlreadyPresent
        );
        assert_eq!(favorites.len(), 1);
    }

    #[test]
    fn test_eleventh_station_exceeds_capacity() {
        let (backing, mut favorites) = empty_store();
        for i in 0..FAVORITES_CAPACITY {
            favorites.add(station(&format!("s{i}"))).unwrap();
        }
        let before = backing.get(FAVORITES_KEY);

        let err = favorites.add(station("one-too-many")).unwrap_err();
        assert!(matches!(err, FavoritesError::CapacityExceeded { limit: 10 }));
        assert_eq!(favorites.len(), FAVORITES_CAPACITY);
        assert!(!favorites.contains("one-too-many"));
        assert_eq!(backing.get(FAVORITES_KEY), before);

        // An existing id is still a no-op, not a capacity error.
        assert_eq!(
            favorites.add(station("s3")).unwrap(),
            AddOutcome::AlreadyPresent
        );
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let (backing, mut favorites) = empty_store();
        assert!(!favorites.remove("missing").unwrap());
        assert!(backing.get(FAVORITES_KEY).is_none());

        favorites.add(station("a")).unwrap();
        assert!(favorites.remove("a").unwrap());
        assert!(!favorites.contains("a"));
        assert_eq!(backing.get(FAVORITES_KEY).unwrap().trim(), "[]");
    }

    #[test]
    fn test_every_mutation_persists_full_list() {
        let (backing, mut favorites) = empty_store();
        favorites.add(station("a")).unwrap();
        favorites.add(station("b")).unwrap();
        favorites.remove("a").unwrap();
        favorites.add(station("c")).unwrap();

        let reloaded = FavoritesStore::load(backing);
        let ids: Vec<&str> = reloaded.stations().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn test_malformed_value_loads_empty() {
        let backing = Arc::new(MemoryStore::with_value(FAVORITES_KEY, "{not json"));
        assert!(FavoritesStore::load(backing).is_empty());

        let backing = Arc::new(MemoryStore::with_value(FAVORITES_KEY, r#"{"id":"x"}"#));
        assert!(FavoritesStore::load(backing).is_empty());
    }

    #[test]
    fn test_load_normalizes_stored_list() {
        let mut stored: Vec<Station> = (0..12).map(|i| station(&format!("s{i}"))).collect();
        stored.insert(1, station("s0"));
        stored.insert(
            2,
            Station {
                codec: None,
                ..station("silent")
            },
        );
        let backing = Arc::new(MemoryStore::with_value(
            FAVORITES_KEY,
            serde_json::to_string(&stored).unwrap(),
        ));

        let favorites = FavoritesStore::load(backing);
        assert_eq!(favorites.len(), FAVORITES_CAPACITY);
        assert!(!favorites.contains("silent"));
        assert_eq!(favorites.stations()[1].id, "s1");
    }

    #[test]
    fn test_failed_persist_rolls_back() {
        let mut favorites = FavoritesStore::load(Arc::new(BrokenStore));
        assert!(favorites.is_empty());

        let err = favorites.add(station("a")).unwrap_err();
        assert!(matches!(err, FavoritesError::Storage(_)));
        assert!(favorites.is_empty());
    }

    #[test]
    fn test_json_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonFileStore::new(dir.path().join("nested")));
        assert!(store.load(FAVORITES_KEY).unwrap().is_none());

        let mut favorites = FavoritesStore::load(store.clone());
        favorites.add(station("a")).unwrap();

        assert!(dir.path().join("nested").join("favorites.json").exists());
        assert!(!dir.path().join("nested").join("favorites.json.tmp").exists());
        assert!(FavoritesStore::load(store).contains("a"));
    }
}
