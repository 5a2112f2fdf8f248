use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub socket: SocketConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Directory holding persisted key-value data (favorites).
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_socket_port")]
    pub port: u16,
}

/// Station directory (Radio Browser) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Language every query is scoped to.
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
    /// How many stations the popular query asks the directory for.
    #[serde(default = "default_popular_limit")]
    pub popular_limit: usize,
    /// How many favicon-bearing popular stations are kept.
    #[serde(default = "default_popular_display")]
    pub popular_display: usize,
    #[serde(default = "default_popular_refresh_secs")]
    pub popular_refresh_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    #[serde(default = "default_volume")]
    pub default_volume: f32,
    /// Delay between issuing a play attempt and calling the output.
    #[serde(default = "default_restart_grace_ms")]
    pub restart_grace_ms: u64,
    /// A play attempt that has not produced audio after this long fails.
    #[serde(default = "default_play_timeout_secs")]
    pub play_timeout_secs: u64,
}

impl CatalogConfig {
    pub fn popular_refresh(&self) -> Duration {
        Duration::from_secs(self.popular_refresh_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl PlaybackConfig {
    pub fn restart_grace(&self) -> Duration {
        Duration::from_millis(self.restart_grace_ms)
    }

    pub fn play_timeout(&self) -> Duration {
        Duration::from_secs(self.play_timeout_secs)
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            bind_address: default_bind_address(),
            port: default_http_port(),
        }
    }
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_socket_port(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            language: default_language(),
            search_limit: default_search_limit(),
            popular_limit: default_popular_limit(),
            popular_display: default_popular_display(),
            popular_refresh_secs: default_popular_refresh_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            default_volume: default_volume(),
            restart_grace_ms: default_restart_grace_ms(),
            play_timeout_secs: default_play_timeout_secs(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    platform::data_dir()
}

fn default_http_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_http_port() -> u16 {
    8990
}

fn default_socket_port() -> u16 {
    platform::DAEMON_TCP_PORT
}

fn default_base_url() -> String {
    "https://de1.api.radio-browser.info".to_string()
}

fn default_language() -> String {
    "english".to_string()
}

fn default_search_limit() -> usize {
    30
}

fn default_popular_limit() -> usize {
    10
}

fn default_popular_display() -> usize {
    3
}

fn default_popular_refresh_secs() -> u64 {
    5 * 60
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_volume() -> f32 {
    1.0
}

fn default_restart_grace_ms() -> u64 {
    100
}

fn default_play_timeout_secs() -> u64 {
    15
}

impl Config {
    /// Load `config.toml`, writing the defaults out on first run.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}
