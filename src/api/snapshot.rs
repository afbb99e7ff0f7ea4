//! Fleet snapshot computation with per-privilege-class coalescing
//!
//! Every streaming connection wants the same serialized snapshot, so
//! concurrent requests are collapsed into one computation per privilege
//! class. The class split is a hard invariant, not an optimization: a
//! coalesced guest request must never receive fields only authorized
//! viewers may see, so the two classes have independent coalescing keys.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::Serialize;

use crate::HostMetrics;
use crate::inventory::{HostSystemInfo, InventoryState, LiveHost};

use super::sessions::SessionRegistry;

/// Privilege class of a viewer, the coalescing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewerClass {
    /// Authenticated viewer: full addresses, public notes, hidden hosts
    Authorized,

    /// Anonymous viewer: redacted snapshot
    Guest,
}

impl ViewerClass {
    pub fn is_authorized(self) -> bool {
        matches!(self, ViewerClass::Authorized)
    }
}

/// One host as it appears in a stream frame.
#[derive(Debug, Clone, Serialize)]
pub struct StreamHost {
    pub id: u64,
    pub name: String,
    pub public_note: String,
    pub display_index: i64,
    pub system: HostSystemInfo,
    pub state: Option<HostMetrics>,
    pub country_code: String,
    pub ip_address: String,
    pub organization: String,
    pub last_active: Option<DateTime<Utc>>,
}

/// One pushed frame: snapshot time, online-viewer count, host list.
#[derive(Debug, Clone, Serialize)]
pub struct StreamFrame {
    /// Wall-clock snapshot time, Unix milliseconds
    pub now: i64,

    pub online: usize,

    pub hosts: Vec<StreamHost>,
}

type SharedComputation<T> = Shared<BoxFuture<'static, Result<T, Arc<anyhow::Error>>>>;

/// Request coalescing: at most one in-flight computation per key.
///
/// Concurrent callers for the same key await the in-flight computation and
/// all receive its result; the leader clears the slot once it completes.
pub struct RequestGroup<K, T>
where
    K: Eq + std::hash::Hash + Clone,
    T: Clone,
{
    inflight: Mutex<HashMap<K, SharedComputation<T>>>,
}

impl<K, T> RequestGroup<K, T>
where
    K: Eq + std::hash::Hash + Clone,
    T: Clone + 'static,
{
    pub fn new() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub async fn run<F>(&self, key: K, make: F) -> Result<T, Arc<anyhow::Error>>
    where
        F: FnOnce() -> BoxFuture<'static, anyhow::Result<T>>,
    {
        let (computation, leader) = {
            let mut inflight = self.inflight.lock().unwrap();
            match inflight.get(&key) {
                Some(existing) => (existing.clone(), false),
                None => {
                    let computation = make().map(|result| result.map_err(Arc::new)).boxed().shared();
                    inflight.insert(key.clone(), computation.clone());
                    (computation, true)
                }
            }
        };

        let result = computation.await;

        if leader {
            self.inflight.lock().unwrap().remove(&key);
        }

        result
    }
}

impl<K, T> Default for RequestGroup<K, T>
where
    K: Eq + std::hash::Hash + Clone,
    T: Clone + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Builds and coalesces serialized fleet snapshots.
pub struct SnapshotBroker {
    inventory: Arc<InventoryState>,
    sessions: Arc<SessionRegistry>,
    group: RequestGroup<ViewerClass, Arc<String>>,
}

impl SnapshotBroker {
    pub fn new(inventory: Arc<InventoryState>, sessions: Arc<SessionRegistry>) -> Self {
        Self {
            inventory,
            sessions,
            group: RequestGroup::new(),
        }
    }

    /// The current serialized snapshot for a privilege class.
    ///
    /// All connections requesting the same class while a computation is in
    /// flight share that computation's output bytes.
    pub async fn serialized(&self, class: ViewerClass) -> Result<Arc<String>, Arc<anyhow::Error>> {
        let inventory = self.inventory.clone();
        let sessions = self.sessions.clone();

        self.group
            .run(class, move || {
                async move {
                    let frame = build_frame(&inventory, &sessions, class).await;
                    let text = serde_json::to_string(&frame)?;
                    Ok(Arc::new(text))
                }
                .boxed()
            })
            .await
    }
}

async fn build_frame(
    inventory: &InventoryState,
    sessions: &SessionRegistry,
    class: ViewerClass,
) -> StreamFrame {
    let authorized = class.is_authorized();
    let view = inventory.sorted_view(authorized).await;

    let hosts = view.into_iter().map(|host| stream_host(host, authorized)).collect();

    StreamFrame {
        now: Utc::now().timestamp_millis(),
        online: sessions.count().await,
        hosts,
    }
}

fn stream_host(host: LiveHost, authorized: bool) -> StreamHost {
    let (country_code, ip_address, organization) = match &host.geo {
        Some(geo) => (
            geo.country_code.clone(),
            geo.addrs.join(),
            geo.organization.clone(),
        ),
        None => (String::new(), String::new(), String::new()),
    };

    StreamHost {
        id: host.id,
        name: host.name,
        public_note: if authorized {
            host.public_note
        } else {
            String::new()
        },
        display_index: host.display_index,
        system: if authorized {
            host.system
        } else {
            host.system.filter()
        },
        state: host.state,
        country_code,
        ip_address: if authorized { ip_address } else { String::new() },
        organization,
        last_active: host.last_active,
    }
}
