//! Registry of currently-connected live-view sessions

use std::collections::HashMap;

use axum::extract::ws::Message;
use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, mpsc};

/// One connected live-view session. Never persisted.
#[derive(Debug, Clone)]
pub struct OnlineSession {
    /// Viewer account identity; 0 denotes an anonymous guest
    pub user_id: u64,

    /// Resolved origin address
    pub ip: String,

    pub connected_at: DateTime<Utc>,

    /// Write handle feeding the session's socket
    pub handle: mpsc::UnboundedSender<Message>,
}

/// Lock-protected session table keyed by generated connection identity.
///
/// Insert/remove take the exclusive lock; counting takes the shared lock.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, OnlineSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, conn_id: String, session: OnlineSession) {
        self.sessions.write().await.insert(conn_id, session);
    }

    /// Remove a session. Called unconditionally on every exit path of the
    /// push loop.
    pub async fn remove(&self, conn_id: &str) {
        self.sessions.write().await.remove(conn_id);
    }

    /// Current online-viewer count.
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Snapshot of a session's metadata (diagnostics).
    pub async fn get(&self, conn_id: &str) -> Option<OnlineSession> {
        self.sessions.read().await.get(conn_id).cloned()
    }
}
