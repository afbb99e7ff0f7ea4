//! Storage collaborator for the fleet inventory
//!
//! This module provides a trait-based abstraction over the persistent
//! inventory: accounts and their agent secrets (read-only here), host rows
//! (created once per first-contact provisioning), group lookups, and the
//! abuse-mitigation block list.
//!
//! ## Design
//!
//! - **Trait-based**: `Storage` allows swapping implementations
//! - **Async**: All operations are async for compatibility with Tokio
//! - **Transactional**: Host creation with group membership is atomic
//!
//! ## Backends
//!
//! - **SQLite** (default): Embedded database behind the `storage-sqlite`
//!   feature
//! - **In-Memory**: No persistence, for testing or throwaway deployments

pub mod backend;
pub mod error;
pub mod memory;
pub mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::{HealthStatus, Storage};
pub use error::{StorageError, StorageResult};
pub use schema::{AccountRow, BlockReason, GroupRow, HostRow, NewHost, Role};
