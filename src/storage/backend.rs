//! Storage trait definition
//!
//! The hub owns no persistent state beyond what these operations touch;
//! everything else (metric history, user administration) lives behind other
//! services. Implementations must be `Send + Sync` as they are shared across
//! async tasks.

use std::collections::HashMap;

use async_trait::async_trait;

use super::error::StorageResult;
use super::schema::{AccountRow, BlockReason, GroupRow, HostRow, NewHost};

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,
}

/// Trait for the inventory storage collaborator
///
/// ## Error Handling
///
/// Methods return `StorageResult<T>`. Point lookups signal a structural
/// miss with `StorageError::NotFound` so callers can apply scoping
/// fallbacks; any other variant is a real failure.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Create a host row and, when `host.group_id` is set, its
    /// group-membership record - as one transaction.
    ///
    /// Either both rows are persisted or neither is. Returns the stored row
    /// with its assigned numeric identity.
    async fn create_host(&self, host: NewHost) -> StorageResult<HostRow>;

    /// Point lookup of a group by name, scoped to its owning account.
    async fn find_group(&self, owner_id: u64, name: &str) -> StorageResult<GroupRow>;

    /// Unscoped group lookup. Only reachable through the administrator
    /// fallback in the provisioning path.
    async fn find_group_any(&self, name: &str) -> StorageResult<GroupRow>;

    /// Point lookup of an account, used to determine its role.
    async fn get_account(&self, id: u64) -> StorageResult<AccountRow>;

    /// All shared-secret → account bindings, for the startup cache fill.
    async fn load_agent_secrets(&self) -> StorageResult<HashMap<String, u64>>;

    /// All host rows, for warming the in-memory inventory at startup.
    async fn load_hosts(&self) -> StorageResult<Vec<HostRow>>;

    /// Block an origin address under a reason category. Idempotent.
    async fn block_address(&self, address: &str, reason: BlockReason) -> StorageResult<()>;

    /// Remove an origin address from the block list. Idempotent.
    async fn unblock_address(&self, address: &str) -> StorageResult<()>;

    /// Check backend health with a lightweight operation.
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Close the backend and release resources.
    async fn close(&self) -> StorageResult<()>;
}
