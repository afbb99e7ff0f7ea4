//! Row definitions for the inventory schema
//!
//! Accounts and their shared secrets are provisioned outside this hub; the
//! hub reads them to authenticate agents and writes host rows when a
//! previously-unseen client UUID shows up.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Account role, controlling group-resolution scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Ordinary account: isolated to its own groups
    User,

    /// Administrator: may resolve any account's group, explicitly
    Admin,
}

impl Role {
    pub fn parse(value: &str) -> Self {
        match value {
            "admin" => Role::Admin,
            _ => Role::User,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

/// One account row. Read-only from the hub's perspective.
#[derive(Debug, Clone)]
pub struct AccountRow {
    pub id: u64,
    pub username: String,
    pub role: Role,
}

/// One persisted inventory record ("host").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostRow {
    /// Assigned once, immutable
    pub id: u64,

    /// Client-supplied identifier, 1-64 characters, never regenerated
    pub uuid: String,

    pub name: String,
    pub user_id: u64,
    pub display_index: i64,
    pub public_note: String,
    pub hide_from_guests: bool,
    pub created_at: DateTime<Utc>,
    pub last_active: Option<DateTime<Utc>>,
}

/// One named host group, scoped to its owning account.
#[derive(Debug, Clone)]
pub struct GroupRow {
    pub id: u64,
    pub name: String,
    pub user_id: u64,
}

/// Input for the transactional host-creation path.
///
/// When `group_id` is set, the membership record is created in the same
/// transaction as the host row - either both are persisted or neither.
#[derive(Debug, Clone)]
pub struct NewHost {
    pub uuid: String,
    pub name: String,
    pub user_id: u64,
    pub group_id: Option<u64>,
}

/// Reason category recorded when an origin address is blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// Agent presented a missing or unknown shared secret
    AgentAuthFailure,
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockReason::AgentAuthFailure => write!(f, "agent-auth-failure"),
        }
    }
}
