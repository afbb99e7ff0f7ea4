use std::net::SocketAddr;
use std::path::PathBuf;

use tracing::trace;

/// Storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database (default for most deployments)
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./inventory.db")
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    /// Bind address for the hub API server
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Storage configuration (optional - defaults to SQLite)
    pub storage: Option<StorageConfig>,

    #[serde(default)]
    pub geo: GeoConfig,

    #[serde(default)]
    pub stream: StreamConfig,

    /// Viewer tokens mapping bearer tokens to account identities.
    ///
    /// A live-view connection presenting one of these tokens streams the
    /// authorized snapshot; everything else is served the guest view.
    #[serde(default)]
    pub viewers: Vec<ViewerToken>,

    /// Trust `X-Real-IP` / `X-Forwarded-For` from the reverse proxy when
    /// resolving origin addresses.
    #[serde(default)]
    pub trust_proxy_headers: bool,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ViewerToken {
    pub token: String,
    pub account_id: u64,
}

/// Tuning for the geo/ASN enrichment fallback service.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct GeoConfig {
    /// Base URL of the external lookup service
    #[serde(default = "default_geo_api_base")]
    pub api_base: String,

    /// Cache entries older than this are treated as absent
    #[serde(default = "default_geo_cache_ttl_hours")]
    pub cache_ttl_hours: u64,

    /// Minimum interval between outbound lookup calls, across all callers
    #[serde(default = "default_geo_min_interval_secs")]
    pub min_request_interval_secs: u64,

    /// How often the background sweeper purges expired entries
    #[serde(default = "default_geo_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            api_base: default_geo_api_base(),
            cache_ttl_hours: default_geo_cache_ttl_hours(),
            min_request_interval_secs: default_geo_min_interval_secs(),
            sweep_interval_secs: default_geo_sweep_interval_secs(),
        }
    }
}

fn default_geo_api_base() -> String {
    String::from("http://ip-api.com/json")
}

fn default_geo_cache_ttl_hours() -> u64 {
    24
}

fn default_geo_min_interval_secs() -> u64 {
    2
}

fn default_geo_sweep_interval_secs() -> u64 {
    60 * 60
}

/// Tuning for the per-connection live-view push loop.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct StreamConfig {
    /// Seconds between pushed snapshots
    #[serde(default = "default_stream_interval_secs")]
    pub interval_secs: u64,

    /// A protocol ping is sent every Nth iteration
    #[serde(default = "default_ping_every")]
    pub ping_every: u64,

    /// Consecutive snapshot failures after which the session is closed
    #[serde(default = "default_max_snapshot_failures")]
    pub max_snapshot_failures: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_stream_interval_secs(),
            ping_every: default_ping_every(),
            max_snapshot_failures: default_max_snapshot_failures(),
        }
    }
}

fn default_stream_interval_secs() -> u64 {
    2
}

fn default_ping_every() -> u64 {
    4
}

fn default_max_snapshot_failures() -> u32 {
    5
}

fn default_bind_addr() -> SocketAddr {
    "127.0.0.1:8080".parse().unwrap()
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|_| anyhow::anyhow!("Invalid configuration file provided!"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
