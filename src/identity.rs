//! In-memory identity cache consulted on every agent authentication
//!
//! Two read-mostly maps: shared secret → owning account, and client UUID →
//! assigned host identity. The cache is an owned, injectable object so tests
//! can build isolated instances; the hub fills it from storage at startup
//! and registers new hosts as they are provisioned.

use std::collections::HashMap;

use tokio::sync::RwLock;

/// Lock-protected identity mappings.
///
/// Reads take the shared lock. The single write path (new-host registration)
/// takes the exclusive lock only for the map mutation itself - never across
/// the storage transaction that precedes it.
#[derive(Debug, Default)]
pub struct IdentityCache {
    /// shared secret → account id
    secrets: RwLock<HashMap<String, u64>>,

    /// client UUID → host id
    uuids: RwLock<HashMap<String, u64>>,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the secret map wholesale (startup fill from storage).
    pub async fn load_secrets(&self, secrets: HashMap<String, u64>) {
        let mut map = self.secrets.write().await;
        *map = secrets;
    }

    /// Resolve the account owning a shared secret.
    pub async fn account_for_secret(&self, secret: &str) -> Option<u64> {
        self.secrets.read().await.get(secret).copied()
    }

    /// Register a secret → account binding (storage-mutation callback).
    pub async fn insert_secret(&self, secret: String, account_id: u64) {
        self.secrets.write().await.insert(secret, account_id);
    }

    /// Fast path: the host identity already assigned to a client UUID.
    pub async fn host_for_uuid(&self, uuid: &str) -> Option<u64> {
        self.uuids.read().await.get(uuid).copied()
    }

    /// Publish a UUID → host binding.
    ///
    /// Callers must only do this after the host row is committed, so a
    /// visible identity is always a persisted one.
    pub async fn insert_host(&self, uuid: String, host_id: u64) {
        self.uuids.write().await.insert(uuid, host_id);
    }

    /// Replace the UUID map wholesale (startup fill from storage).
    pub async fn load_hosts(&self, uuids: HashMap<String, u64>) {
        let mut map = self.uuids.write().await;
        *map = uuids;
    }
}
