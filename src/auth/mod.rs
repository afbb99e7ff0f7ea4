//! Agent authentication and auto-provisioning
//!
//! Every RPC call from an agent carries call-scoped key-value metadata; the
//! transport (out of scope here) delivers it as a [`CallContext`]. The
//! gateway validates the shared secret, resolves or creates the inventory
//! record for the client's UUID, and returns the stable numeric host
//! identity all subsequent calls on that channel use.
//!
//! Steady-state traffic takes a pure fast path: one shared-lock cache read,
//! no database access. Only a previously-unseen UUID pays the provisioning
//! cost.

pub mod error;
pub mod names;

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub use error::AuthError;

use crate::geo::GeoResolver;
use crate::identity::IdentityCache;
use crate::inventory::{GeoInfo, HostAddrs, InventoryState};
use crate::storage::{BlockReason, GroupRow, NewHost, Role, Storage, StorageError};

/// Metadata key: shared secret (required).
pub const META_CLIENT_SECRET: &str = "client_secret";

/// Metadata key: client-supplied UUID (required, 1-64 chars).
pub const META_CLIENT_UUID: &str = "client_uuid";

/// Metadata key: optional display name.
pub const META_SERVER_NAME: &str = "server_name";

/// Metadata key: optional group name to join on first contact.
pub const META_SERVER_GROUP_NAME: &str = "server_group_name";

/// Maximum accepted UUID length.
const MAX_UUID_LEN: usize = 64;

/// Call-scoped view of one inbound RPC call: its key-value metadata and the
/// peer address the authenticated channel observed.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    metadata: HashMap<String, String>,
    peer_addr: Option<IpAddr>,
}

impl CallContext {
    pub fn new(metadata: HashMap<String, String>, peer_addr: Option<IpAddr>) -> Self {
        Self {
            metadata,
            peer_addr,
        }
    }

    /// Metadata value for a key, whitespace-trimmed. Empty values read as
    /// absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    pub fn peer_addr(&self) -> Option<IpAddr> {
        self.peer_addr
    }
}

/// Authentication and auto-provisioning gateway.
pub struct AgentGateway {
    storage: Arc<dyn Storage>,
    identity: Arc<IdentityCache>,
    inventory: Arc<InventoryState>,
    geo: Option<GeoResolver>,

    /// Serializes first-contact provisioning. The fast path never takes
    /// this lock.
    provision_lock: Mutex<()>,
}

impl AgentGateway {
    pub fn new(
        storage: Arc<dyn Storage>,
        identity: Arc<IdentityCache>,
        inventory: Arc<InventoryState>,
    ) -> Self {
        Self {
            storage,
            identity,
            inventory,
            geo: None,
            provision_lock: Mutex::new(()),
        }
    }

    /// Enable lazy geo/ASN enrichment of authenticated hosts.
    pub fn with_geo(mut self, geo: GeoResolver) -> Self {
        self.geo = Some(geo);
        self
    }

    /// Validate an inbound call and resolve its stable host identity.
    ///
    /// Fails with an `Unauthenticated`-class error on any problem; nothing
    /// is retried internally. A failed provisioning transaction leaves the
    /// UUID unmapped, so a retried call re-enters the same path.
    pub async fn authenticate(&self, ctx: &CallContext) -> Result<u64, AuthError> {
        let Some(secret) = ctx.get(META_CLIENT_SECRET) else {
            self.block_peer(ctx).await;
            return Err(AuthError::Unauthenticated(
                "agent authentication failed".to_string(),
            ));
        };

        let Some(account_id) = self.identity.account_for_secret(secret).await else {
            self.block_peer(ctx).await;
            return Err(AuthError::Unauthenticated(
                "agent authentication failed".to_string(),
            ));
        };

        self.unblock_peer(ctx).await;

        let uuid = ctx.get(META_CLIENT_UUID).unwrap_or_default();
        if uuid.is_empty() || uuid.len() > MAX_UUID_LEN {
            return Err(AuthError::Unauthenticated(
                "client identifier invalid, must be 1-64 characters".to_string(),
            ));
        }

        // fast path: known UUID, no database access
        if let Some(host_id) = self.identity.host_for_uuid(uuid).await {
            self.inventory.touch(uuid).await;
            self.enrich_later(ctx, uuid);
            return Ok(host_id);
        }

        let host_id = self.provision(ctx, account_id, uuid).await?;
        self.enrich_later(ctx, uuid);
        Ok(host_id)
    }

    /// First-contact path: create the inventory record and publish its
    /// identity.
    async fn provision(
        &self,
        ctx: &CallContext,
        account_id: u64,
        uuid: &str,
    ) -> Result<u64, AuthError> {
        let _guard = self.provision_lock.lock().await;

        // a concurrent call may have provisioned this UUID while we waited
        if let Some(host_id) = self.identity.host_for_uuid(uuid).await {
            return Ok(host_id);
        }

        let name = match ctx.get(META_SERVER_NAME) {
            Some(supplied) => supplied.to_string(),
            None => names::generate(),
        };

        let group = match ctx.get(META_SERVER_GROUP_NAME) {
            Some(group_name) => Some(self.resolve_group(account_id, group_name).await?),
            None => None,
        };

        let row = self
            .storage
            .create_host(NewHost {
                uuid: uuid.to_string(),
                name: name.clone(),
                user_id: account_id,
                group_id: group.as_ref().map(|g| g.id),
            })
            .await
            .map_err(|e| AuthError::Unauthenticated(e.to_string()))?;

        match &group {
            Some(group) => info!(
                "auto-registered host: uuid={uuid}, name={name}, group={} (id:{}), account={account_id}",
                group.name, group.id
            ),
            None => info!("auto-registered host: uuid={uuid}, name={name}, account={account_id}"),
        }

        let host_id = row.id;

        // the row is committed; only now does the identity become visible
        self.inventory.register(row).await;
        self.identity.insert_host(uuid.to_string(), host_id).await;

        Ok(host_id)
    }

    /// Privilege-scoped group resolution: the requesting account's own
    /// groups first; administrators may explicitly fall back to any
    /// account's group.
    async fn resolve_group(&self, account_id: u64, name: &str) -> Result<GroupRow, AuthError> {
        match self.storage.find_group(account_id, name).await {
            Ok(group) => Ok(group),
            Err(StorageError::NotFound(_)) => {
                let account = self.storage.get_account(account_id).await.map_err(|e| {
                    warn!("account lookup failed during group resolution: {e}");
                    AuthError::Unauthenticated("host group lookup failed".to_string())
                })?;

                if account.role != Role::Admin {
                    return Err(AuthError::Unauthenticated(
                        "specified host group does not exist or is not accessible".to_string(),
                    ));
                }

                match self.storage.find_group_any(name).await {
                    Ok(group) => Ok(group),
                    Err(StorageError::NotFound(_)) => Err(AuthError::Unauthenticated(
                        "specified host group does not exist".to_string(),
                    )),
                    Err(e) => {
                        warn!("unscoped group lookup failed: {e}");
                        Err(AuthError::Unauthenticated(
                            "host group lookup failed".to_string(),
                        ))
                    }
                }
            }
            Err(e) => {
                warn!("group lookup failed: {e}");
                Err(AuthError::Unauthenticated(
                    "host group lookup failed".to_string(),
                ))
            }
        }
    }

    /// Kick off background enrichment when the host has none yet.
    ///
    /// Enrichment failures never affect authentication.
    fn enrich_later(&self, ctx: &CallContext, uuid: &str) {
        let Some(geo) = self.geo.clone() else {
            return;
        };
        let Some(peer) = ctx.peer_addr() else {
            return;
        };

        let inventory = self.inventory.clone();
        let uuid = uuid.to_string();

        tokio::spawn(async move {
            if inventory.has_geo(&uuid).await {
                return;
            }

            match geo.resolve(peer).await {
                Ok(resolution) => {
                    let addrs = match peer {
                        IpAddr::V4(v4) => HostAddrs {
                            ipv4: Some(v4.to_string()),
                            ipv6: None,
                        },
                        IpAddr::V6(v6) => HostAddrs {
                            ipv4: None,
                            ipv6: Some(v6.to_string()),
                        },
                    };
                    inventory
                        .attach_geo(
                            &uuid,
                            GeoInfo {
                                addrs,
                                country_code: resolution.country_code,
                                organization: resolution.organization,
                            },
                        )
                        .await;
                }
                Err(e) => debug!("enrichment for {uuid} failed: {e}"),
            }
        });
    }

    async fn block_peer(&self, ctx: &CallContext) {
        if let Some(peer) = ctx.peer_addr() {
            if let Err(e) = self
                .storage
                .block_address(&peer.to_string(), BlockReason::AgentAuthFailure)
                .await
            {
                warn!("failed to block {peer}: {e}");
            }
        }
    }

    async fn unblock_peer(&self, ctx: &CallContext) {
        if let Some(peer) = ctx.peer_addr() {
            if let Err(e) = self.storage.unblock_address(&peer.to_string()).await {
                warn!("failed to unblock {peer}: {e}");
            }
        }
    }
}
