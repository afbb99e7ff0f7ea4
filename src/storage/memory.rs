//! In-memory storage backend (no persistence)
//!
//! Implements the full `Storage` contract against plain maps. Useful for:
//! - Testing without database dependencies
//! - Running the hub with `{"storage": {"backend": "none"}}`
//!
//! All data is lost on restart.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use super::backend::{HealthStatus, Storage};
use super::error::{StorageError, StorageResult};
use super::schema::{AccountRow, BlockReason, GroupRow, HostRow, NewHost, Role};

#[derive(Default)]
struct Inner {
    accounts: HashMap<u64, (AccountRow, String)>,
    hosts: Vec<HostRow>,
    groups: Vec<GroupRow>,
    memberships: Vec<(u64, u64)>,
    blocked: HashMap<String, BlockReason>,
    next_host_id: u64,
}

/// In-memory storage backend
pub struct MemoryBackend {
    inner: RwLock<Inner>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                next_host_id: 1,
                ..Inner::default()
            }),
        }
    }

    /// Seed an account with its agent secret (test/bootstrap support).
    pub async fn add_account(&self, id: u64, role: Role, secret: &str) {
        let mut inner = self.inner.write().await;
        inner.accounts.insert(
            id,
            (
                AccountRow {
                    id,
                    username: format!("account-{id}"),
                    role,
                },
                secret.to_string(),
            ),
        );
    }

    /// Seed a group owned by an account (test/bootstrap support).
    pub async fn add_group(&self, id: u64, name: &str, user_id: u64) {
        let mut inner = self.inner.write().await;
        inner.groups.push(GroupRow {
            id,
            name: name.to_string(),
            user_id,
        });
    }

    /// Whether an address is currently blocked (test support).
    pub async fn is_blocked(&self, address: &str) -> bool {
        self.inner.read().await.blocked.contains_key(address)
    }

    /// Membership pairs (group id, host id) recorded so far (test support).
    pub async fn memberships(&self) -> Vec<(u64, u64)> {
        self.inner.read().await.memberships.clone()
    }
}

#[async_trait]
impl Storage for MemoryBackend {
    async fn create_host(&self, host: NewHost) -> StorageResult<HostRow> {
        let mut inner = self.inner.write().await;

        if inner.hosts.iter().any(|h| h.uuid == host.uuid) {
            return Err(StorageError::Conflict(format!(
                "host uuid '{}' already exists",
                host.uuid
            )));
        }

        let id = inner.next_host_id;
        inner.next_host_id += 1;

        let row = HostRow {
            id,
            uuid: host.uuid,
            name: host.name,
            user_id: host.user_id,
            display_index: 0,
            public_note: String::new(),
            hide_from_guests: false,
            created_at: Utc::now(),
            last_active: None,
        };

        inner.hosts.push(row.clone());
        if let Some(group_id) = host.group_id {
            inner.memberships.push((group_id, id));
        }

        Ok(row)
    }

    async fn find_group(&self, owner_id: u64, name: &str) -> StorageResult<GroupRow> {
        self.inner
            .read()
            .await
            .groups
            .iter()
            .find(|g| g.name == name && g.user_id == owner_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("group '{name}'")))
    }

    async fn find_group_any(&self, name: &str) -> StorageResult<GroupRow> {
        self.inner
            .read()
            .await
            .groups
            .iter()
            .find(|g| g.name == name)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("group '{name}'")))
    }

    async fn get_account(&self, id: u64) -> StorageResult<AccountRow> {
        self.inner
            .read()
            .await
            .accounts
            .get(&id)
            .map(|(account, _)| account.clone())
            .ok_or_else(|| StorageError::NotFound(format!("account {id}")))
    }

    async fn load_agent_secrets(&self) -> StorageResult<HashMap<String, u64>> {
        Ok(self
            .inner
            .read()
            .await
            .accounts
            .values()
            .map(|(account, secret)| (secret.clone(), account.id))
            .collect())
    }

    async fn load_hosts(&self) -> StorageResult<Vec<HostRow>> {
        Ok(self.inner.read().await.hosts.clone())
    }

    async fn block_address(&self, address: &str, reason: BlockReason) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        inner.blocked.insert(address.to_string(), reason);
        Ok(())
    }

    async fn unblock_address(&self, address: &str) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        inner.blocked.remove(address);
        Ok(())
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let inner = self.inner.read().await;
        Ok(HealthStatus {
            healthy: true,
            message: format!(
                "in-memory storage operational ({} hosts, {} accounts)",
                inner.hosts.len(),
                inner.accounts.len()
            ),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory backend (no-op)");
        Ok(())
    }
}
