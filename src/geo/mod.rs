//! Geo/ASN enrichment
//!
//! Maps a network address to a country code and a network-organization
//! name. The bundled offline database is the primary source; addresses it
//! cannot resolve fall back to a rate-limited external lookup service whose
//! results are kept in a time-boxed cache.
//!
//! The dual-source design trades lookup latency against freshness: the
//! offline table answers instantly but may be stale or incomplete, the
//! external service is current but throttled. Hosts rarely change network
//! location, so the cache amortizes the slow path well.

pub mod cache;
pub mod offline;
pub mod remote;

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::config::GeoConfig;
pub use cache::{CacheStats, GeoCache};
pub use offline::{OfflineDb, OfflineRecord};
pub use remote::{RemoteLookup, RemoteRecord};

/// Entries older than this are treated as absent.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Minimum interval between outbound lookup calls, across all callers.
pub const DEFAULT_MIN_REQUEST_INTERVAL: Duration = Duration::from_secs(2);

/// Result type alias for enrichment lookups
pub type GeoResult<T> = Result<T, GeoError>;

/// Errors from the enrichment fallback path.
///
/// All of these are transient from the hub's point of view: nothing is
/// cached, and the caller decides whether to retry. Authentication and
/// provisioning never depend on enrichment having succeeded.
#[derive(Debug)]
pub enum GeoError {
    /// External service unreachable (transport error)
    Unreachable(String),

    /// External service answered with a non-success HTTP status
    Status(u16),

    /// External service answered but reported a failed lookup
    Lookup(String),

    /// Response body could not be decoded
    Decode(String),
}

impl fmt::Display for GeoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeoError::Unreachable(msg) => write!(f, "lookup service unreachable: {}", msg),
            GeoError::Status(code) => write!(f, "lookup service returned status code {}", code),
            GeoError::Lookup(msg) => write!(f, "lookup failed: {}", msg),
            GeoError::Decode(msg) => write!(f, "failed to decode lookup response: {}", msg),
        }
    }
}

impl std::error::Error for GeoError {}

/// Resolved enrichment for one address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub country_code: String,
    pub organization: String,
}

/// Dual-source resolver: offline database first, cached external fallback
/// second. Cheap to clone and share across tasks.
#[derive(Clone)]
pub struct GeoResolver {
    offline: Arc<OfflineDb>,
    cache: Arc<GeoCache>,
    remote: Arc<RemoteLookup>,
}

impl GeoResolver {
    pub fn new(
        api_base: impl Into<String>,
        cache_ttl: Duration,
        min_request_interval: Duration,
    ) -> Self {
        Self {
            offline: Arc::new(OfflineDb::bundled()),
            cache: Arc::new(GeoCache::new(cache_ttl)),
            remote: Arc::new(RemoteLookup::new(api_base, min_request_interval)),
        }
    }

    pub fn from_config(config: &GeoConfig) -> Self {
        Self::new(
            config.api_base.clone(),
            Duration::from_secs(config.cache_ttl_hours * 60 * 60),
            Duration::from_secs(config.min_request_interval_secs),
        )
    }

    /// Resolve an address to (country code, organization).
    ///
    /// The offline database answers without any network traffic. Only on a
    /// miss does the cached, rate-limited external path run; its failures
    /// propagate to the caller and are never cached.
    pub async fn resolve(&self, ip: IpAddr) -> GeoResult<Resolution> {
        if let Some(record) = self.offline.lookup(ip) {
            trace!("offline hit for {ip}");
            return Ok(Resolution {
                country_code: record.country_code,
                organization: record.organization,
            });
        }

        let address = ip.to_string();

        if let Some((country_code, organization)) = self.cache.get(&address).await {
            trace!("cache hit for {address}");
            return Ok(Resolution {
                country_code,
                organization,
            });
        }

        let record = self.remote.query(ip).await?;

        self.cache
            .insert(
                address,
                record.country_code.clone(),
                record.organization.clone(),
            )
            .await;

        Ok(Resolution {
            country_code: record.country_code,
            organization: record.organization,
        })
    }

    /// Purge expired cache entries. Returns the number removed.
    pub async fn sweep(&self) -> usize {
        self.cache.sweep().await
    }

    /// Cache statistics without eviction.
    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }
}

/// Periodic background eviction so the cache cannot grow without bound.
pub fn spawn_sweeper(resolver: GeoResolver, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            let removed = resolver.sweep().await;
            if removed > 0 {
                debug!("geo cache sweep removed {removed} expired entries");
            }
        }
    })
}
