//! In-memory live inventory
//!
//! The dashboard's working view of the fleet: one record per monitored
//! host, keyed by client UUID, combining the persisted row with volatile
//! state (operational metrics, enrichment metadata, liveness). Warmed from
//! storage at startup, updated by provisioning, the metrics-ingestion path
//! and the geo enrichment attacher.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::HostMetrics;
use crate::storage::HostRow;

/// Addresses a host reports or was observed from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostAddrs {
    pub ipv4: Option<String>,
    pub ipv6: Option<String>,
}

impl HostAddrs {
    /// Formatted address: both families joined with a slash when present.
    pub fn join(&self) -> String {
        match (&self.ipv4, &self.ipv6) {
            (Some(v4), Some(v6)) => format!("{v4}/{v6}"),
            (Some(v4), None) => v4.clone(),
            (None, Some(v6)) => v6.clone(),
            (None, None) => String::new(),
        }
    }
}

/// Geo/ASN enrichment attached to a host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeoInfo {
    pub addrs: HostAddrs,
    pub country_code: String,
    pub organization: String,
}

/// Static system description reported by a host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostSystemInfo {
    pub platform: String,
    pub platform_version: String,
    pub arch: String,
    pub cpu_models: Vec<String>,
    pub mem_total: u64,
    pub disk_total: u64,
    pub virtualization: Option<String>,
    pub boot_time: u64,
}

impl HostSystemInfo {
    /// Redacted copy served to guest viewers: platform and architecture
    /// stay, capacity and hardware details are blanked.
    pub fn filter(&self) -> Self {
        Self {
            platform: self.platform.clone(),
            platform_version: self.platform_version.clone(),
            arch: self.arch.clone(),
            cpu_models: Vec::new(),
            mem_total: 0,
            disk_total: 0,
            virtualization: None,
            boot_time: 0,
        }
    }
}

/// One live inventory record.
#[derive(Debug, Clone)]
pub struct LiveHost {
    pub id: u64,
    pub uuid: String,
    pub name: String,
    pub user_id: u64,
    pub display_index: i64,
    pub public_note: String,
    pub hide_from_guests: bool,
    pub system: HostSystemInfo,
    pub state: Option<HostMetrics>,
    pub geo: Option<GeoInfo>,
    pub last_active: Option<DateTime<Utc>>,
}

impl LiveHost {
    fn from_row(row: HostRow) -> Self {
        Self {
            id: row.id,
            uuid: row.uuid,
            name: row.name,
            user_id: row.user_id,
            display_index: row.display_index,
            public_note: row.public_note,
            hide_from_guests: row.hide_from_guests,
            system: HostSystemInfo::default(),
            state: None,
            geo: None,
            last_active: row.last_active,
        }
    }
}

/// Lock-protected registry of live host records.
#[derive(Debug, Default)]
pub struct InventoryState {
    hosts: RwLock<HashMap<String, LiveHost>>,
}

impl InventoryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Startup fill from storage.
    pub async fn warm(&self, rows: Vec<HostRow>) {
        let mut hosts = self.hosts.write().await;
        *hosts = rows
            .into_iter()
            .map(|row| (row.uuid.clone(), LiveHost::from_row(row)))
            .collect();
        debug!("inventory warmed with {} hosts", hosts.len());
    }

    /// Initialize the live record for a freshly provisioned host.
    pub async fn register(&self, row: HostRow) {
        let mut hosts = self.hosts.write().await;
        hosts.insert(row.uuid.clone(), LiveHost::from_row(row));
    }

    /// Liveness refresh on subsequent authentications.
    pub async fn touch(&self, uuid: &str) {
        let mut hosts = self.hosts.write().await;
        if let Some(host) = hosts.get_mut(uuid) {
            host.last_active = Some(Utc::now());
        }
    }

    /// Update a host's operational state (metrics-ingestion path).
    pub async fn update_state(&self, uuid: &str, state: HostMetrics) {
        let mut hosts = self.hosts.write().await;
        if let Some(host) = hosts.get_mut(uuid) {
            host.state = Some(state);
            host.last_active = Some(Utc::now());
        }
    }

    /// Attach resolved enrichment metadata to a host.
    pub async fn attach_geo(&self, uuid: &str, geo: GeoInfo) {
        let mut hosts = self.hosts.write().await;
        if let Some(host) = hosts.get_mut(uuid) {
            host.geo = Some(geo);
        }
    }

    /// Whether a host already carries enrichment metadata.
    pub async fn has_geo(&self, uuid: &str) -> bool {
        self.hosts
            .read()
            .await
            .get(uuid)
            .is_some_and(|host| host.geo.is_some())
    }

    pub async fn len(&self) -> usize {
        self.hosts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.hosts.read().await.is_empty()
    }

    /// Privilege-filtered ordered view for the snapshot builder.
    ///
    /// Ordering: display index descending, then identity ascending. Guests
    /// never see hosts flagged `hide_from_guests`.
    pub async fn sorted_view(&self, include_hidden: bool) -> Vec<LiveHost> {
        let hosts = self.hosts.read().await;
        let mut view: Vec<LiveHost> = hosts
            .values()
            .filter(|host| include_hidden || !host.hide_from_guests)
            .cloned()
            .collect();
        view.sort_by(|a, b| {
            b.display_index
                .cmp(&a.display_index)
                .then(a.id.cmp(&b.id))
        });
        view
    }
}
