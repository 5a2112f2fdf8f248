use airwave_proto::station::Station;
use rand::Rng;

/// The browsable station list with a wrapping cursor.
///
/// `current_index` is always a valid index while the list is non-empty and
/// is reset to 0 whenever the list is replaced.
#[derive(Debug, Clone, Default)]
pub struct Playlist {
    stations: Vec<Station>,
    current_index: usize,
}

impl Playlist {
    pub fn new(stations: Vec<Station>) -> Self {
        Self {
            stations,
            current_index: 0,
        }
    }

    /// Swap in a new list wholesale; never merges.
    pub fn replace(&mut self, stations: Vec<Station>) {
        self.stations = stations;
        self.current_index = 0;
    }

    pub fn clear(&mut self) {
        self.replace(Vec::new());
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

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current(&self) -> Option<&Station> {
        self.stations.get(self.current_index)
    }

    pub fn position(&self, station_id: &str) -> Option<usize> {
        self.stations.iter().position(|s| s.id == station_id)
    }

    /// Move the cursor to `idx`.  Out-of-range indices leave it unchanged.
    pub fn select(&mut self, idx: usize) -> Option<&Station> {
        if idx >= self.stations.len() {
            return None;
        }
        self.current_index = idx;
        self.stations.get(idx)
    }

    pub fn next(&mut self) -> Option<&Station> {
        let len = self.stations.len();
        if len == 0 {
            return None;
        }
        self.current_index = (self.current_index + 1) % len;
        self.stations.get(self.current_index)
    }

    pub fn previous(&mut self) -> Option<&Station> {
        let len = self.stations.len();
        if len == 0 {
            return None;
        }
        self.current_index = if self.current_index == 0 {
            len - 1
        } else {
            self.current_index - 1
        };
        self.stations.get(self.current_index)
    }

    pub fn random(&mut self) -> Option<&Station> {
        let len = self.stations.len();
        if len == 0 {
            return None;
        }
        self.current_index = rand::thread_rng().gen_range(0..len);
        self.stations.get(self.current_index)
    }
}
