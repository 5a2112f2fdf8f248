use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// One playable stream from the station directory.
///
/// Stations are value objects: two records with the same `id` are the same
/// station, whatever their metadata says.  The serialized form (camelCase
/// field names) is also the persisted favorites schema.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Station {
    /// Directory identifier, stable across queries.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub language: String,
    /// Genre tags, in directory order.
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub bitrate_kbps: u32,
    /// Resolved, directly fetchable audio URL.
    #[serde(default)]
    pub stream_url: String,
    #[serde(default)]
    pub favicon_url: Option<String>,
    #[serde(default)]
    pub codec: Option<String>,
}

impl Station {
    /// A station is playable when its stream URL uses an HTTP scheme and it
    /// carries a codec hint.
    pub fn is_playable(&self) -> bool {
        has_http_scheme(&self.stream_url)
            && self
                .codec
                .as_deref()
                .is_some_and(|codec| !codec.trim().is_empty())
    }

    pub fn has_favicon(&self) -> bool {
        self.favicon_url
            .as_deref()
            .is_some_and(|url| !url.trim().is_empty())
    }
}

impl PartialEq for Station {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Station {}

impl Hash for Station {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

fn has_http_scheme(url: &str) -> bool {
    let lower = url.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Drop every unplayable station, keeping the order of the rest.
pub fn filter_playable(stations: Vec<Station>) -> Vec<Station> {
    stations.into_iter().filter(Station::is_playable).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station(id: &str, url: &str, codec: Option<&str>) -> Station {
        Station {
            id: id.to_string(),
            name: format!("Station {id}"),
            stream_url: url.to_string(),
            codec: codec.map(str::to_string),
            ..Station::default()
        }
    }

    #[test]
    fn test_filter_playable_keeps_order() {
        let stations = vec![
            station("a", "http://a.example/stream", Some("MP3")),
            station("b", "ftp://b.example/stream", Some("MP3")),
            station("c", "https://c.example/stream", Some("AAC")),
            station("d", "https://d.example/stream", Some("")),
            station("e", "", Some("MP3")),
            station("f", "HTTPS://F.EXAMPLE/stream", Some("OGG")),
            station("g", "http://g.example/stream", None),
        ];

        let ids: Vec<String> = filter_playable(stations)
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["a", "c", "f"]);
    }

    #[test]
    fn test_whitespace_codec_is_unplayable() {
        assert!(!station("x", "http://x.example", Some("   ")).is_playable());
    }

    #[test]
    fn test_equality_is_by_id() {
        let a = station("same", "http://one.example", Some("MP3"));
        let mut b = station("same", "http://two.example", None);
        b.name = "Renamed".to_string();
        assert_eq!(a, b);
        assert_ne!(a, station("other", "http://one.example", Some("MP3")));
    }

    #[test]
    fn test_persisted_schema_is_camel_case() {
        let s = Station {
            bitrate_kbps: 128,
            favicon_url: Some("http://img.example/logo.png".to_string()),
            ..station("id-1", "http://a.example/stream", Some("MP3"))
        };
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["bitrateKbps"], 128);
        assert_eq!(json["streamUrl"], "http://a.example/stream");
        assert_eq!(json["faviconUrl"], "http://img.example/logo.png");
    }
}
