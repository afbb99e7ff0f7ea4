//! External lookup service client
//!
//! Fallback path for addresses the bundled database cannot resolve. All
//! outbound calls go through one global rate limiter so the service never
//! sees bursts, no matter how many callers pile up.

use std::net::IpAddr;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use super::{GeoError, GeoResult};

/// Response shape of the lookup service.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    pub status: String,

    #[serde(default)]
    pub country_code: String,

    /// Compound field: "AS15169 Google LLC"
    #[serde(default, rename = "as")]
    pub autonomous_system: String,

    #[serde(default)]
    pub org: String,

    #[serde(default)]
    pub query: String,
}

/// Global outbound-call throttle.
///
/// The lock is held across the enforced sleep, which serializes fallback
/// lookups system-wide; cache reads use a different lock and are never
/// blocked by a sleeping caller.
pub struct RateLimiter {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    /// Wait until the minimum inter-call interval has elapsed, then claim
    /// the slot.
    pub async fn acquire(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }

        *last = Some(Instant::now());
    }
}

/// Both values one external call yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRecord {
    pub country_code: String,
    pub organization: String,
}

/// Rate-limited client for the external lookup service.
pub struct RemoteLookup {
    client: reqwest::Client,
    base_url: String,
    limiter: RateLimiter,
}

impl RemoteLookup {
    pub fn new(base_url: impl Into<String>, min_interval: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: base_url.into(),
            limiter: RateLimiter::new(min_interval),
        }
    }

    /// Resolve an address over the network.
    ///
    /// Returns country code and organization from a single round trip.
    /// Failures are surfaced to the caller and must not be cached.
    pub async fn query(&self, ip: IpAddr) -> GeoResult<RemoteRecord> {
        self.limiter.acquire().await;

        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), ip);
        debug!("external geo lookup: {url}");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| GeoError::Unreachable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GeoError::Status(response.status().as_u16()));
        }

        let body: ApiResponse = response
            .json()
            .await
            .map_err(|e| GeoError::Decode(e.to_string()))?;

        if body.status != "success" {
            return Err(GeoError::Lookup(format!(
                "service returned status '{}' for {ip}",
                body.status
            )));
        }

        Ok(RemoteRecord {
            country_code: body.country_code.to_lowercase(),
            organization: organization_from(&body.autonomous_system, &body.org),
        })
    }
}

/// Extract the organization name from the compound "network-id name" field,
/// falling back to the plain organization field when it is empty.
fn organization_from(autonomous_system: &str, org: &str) -> String {
    if !autonomous_system.is_empty() {
        return match autonomous_system.split_once(' ') {
            Some((_, name)) => name.to_string(),
            None => autonomous_system.to_string(),
        };
    }

    org.to_string()
}
