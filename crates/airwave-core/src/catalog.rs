//! Station directory client.
//!
//! `StationCatalog` is the query contract the session controller depends on;
//! `RadioBrowserCatalog` implements it against the Radio Browser HTTP API
//! (<https://www.radio-browser.info/>).

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use airwave_proto::config::CatalogConfig;
use airwave_proto::protocol::CatalogQuery;
use airwave_proto::station::{filter_playable, Station};

use crate::error::NetworkError;

/// A searchable directory of stations.
///
/// Implementations only ever return playable stations.
#[async_trait]
pub trait StationCatalog: Send + Sync {
    /// Stations matching `query`, most popular first.
    async fn search(&self, query: &CatalogQuery) -> Result<Vec<Station>, NetworkError>;

    /// A short, favicon-bearing "popular now" list.
    async fn top_popular(&self, limit: usize, language: &str)
        -> Result<Vec<Station>, NetworkError>;
}

// ── API response types ────────────────────────────────────────────────────────

/// One directory record.  Any field may be missing or `null`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RbStation {
    stationuuid: Option<String>,
    name: Option<String>,
    url_resolved: Option<String>,
    favicon: Option<String>,
    tags: Option<String>,
    country: Option<String>,
    language: Option<String>,
    codec: Option<String>,
    bitrate: Option<u32>,
}

fn non_empty(s: Option<String>) -> Option<String> {
    let trimmed = s?.trim().to_string();
    (!trimmed.is_empty()).then_some(trimmed)
}

impl From<RbStation> for Station {
    fn from(rb: RbStation) -> Self {
        let tags = rb
            .tags
            .unwrap_or_default()
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        Station {
            id: rb.stationuuid.unwrap_or_default(),
            name: non_empty(rb.name).unwrap_or_default(),
            country: rb.country.unwrap_or_default(),
            language: rb.language.unwrap_or_default(),
            tags,
            bitrate_kbps: rb.bitrate.unwrap_or_default(),
            stream_url: non_empty(rb.url_resolved).unwrap_or_default(),
            favicon_url: non_empty(rb.favicon),
            codec: non_empty(rb.codec),
        }
    }
}

// ── RadioBrowserCatalog ───────────────────────────────────────────────────────

pub struct RadioBrowserCatalog {
    client: reqwest::Client,
    base_url: String,
    language: String,
    search_limit: usize,
    popular_display: usize,
}

impl RadioBrowserCatalog {
    pub fn new(config: &CatalogConfig) -> Result<Self, NetworkError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("airwave/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            language: config.language.clone(),
            search_limit: config.search_limit,
            popular_display: config.popular_display,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// GET `path` and decode the station array.  Any non-2xx status is an
    /// error.
    async fn fetch(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<Station>, NetworkError> {
        let url = self.url(path);
        debug!("Catalog: GET {} {:?}", url, params);

        let response = self.client.get(&url).query(params).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NetworkError::Status(status));
        }

        let records: Vec<RbStation> = response.json().await?;
        Ok(records
            .into_iter()
            .map(Station::from)
            .filter(|s| !s.id.is_empty())
            .collect())
    }

    fn ranked_params(&self, limit: usize, language: &str) -> Vec<(&'static str, String)> {
        vec![
            ("limit", limit.to_string()),
            ("order", "clickcount".to_string()),
            ("reverse", "true".to_string()),
            ("language", language.to_string()),
        ]
    }
}

#[async_trait]
impl StationCatalog for RadioBrowserCatalog {
    async fn search(&self, query: &CatalogQuery) -> Result<Vec<Station>, NetworkError> {
        let mut params = self.ranked_params(self.search_limit, &self.language);
        match query {
            CatalogQuery::Name(name) => params.push(("name", name.clone())),
            CatalogQuery::Tag(tag) => params.push(("tag", tag.clone())),
        }

        let stations = self.fetch("/json/stations/search", &params).await?;
        let total = stations.len();
        let playable = filter_playable(stations);
        debug!(
            "Catalog: {:?} → {} stations ({} unplayable dropped)",
            query,
            playable.len(),
            total - playable.len()
        );
        Ok(playable)
    }

    async fn top_popular(
        &self,
        limit: usize,
        language: &str,
    ) -> Result<Vec<Station>, NetworkError> {
        let params = self.ranked_params(limit, language);
        let stations = self.fetch("/json/stations", &params).await?;
        Ok(filter_playable(stations)
            .into_iter()
            .filter(Station::has_favicon)
            .take(self.popular_display)
            .collect())
    }
}
