//! API shared state

use std::collections::HashMap;
use std::sync::Arc;

use crate::auth::AgentGateway;
use crate::config::StreamConfig;

use super::sessions::SessionRegistry;
use super::snapshot::SnapshotBroker;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Authentication and auto-provisioning gateway
    pub gateway: Arc<AgentGateway>,

    /// Registry of connected live-view sessions
    pub sessions: Arc<SessionRegistry>,

    /// Coalescing snapshot builder
    pub broker: Arc<SnapshotBroker>,

    /// Bearer token → viewer account identity
    pub viewer_tokens: Arc<HashMap<String, u64>>,

    /// Push-loop tuning
    pub stream: StreamConfig,

    /// Believe proxy-forwarded origin headers
    pub trust_proxy_headers: bool,
}

impl ApiState {
    pub fn new(
        gateway: Arc<AgentGateway>,
        sessions: Arc<SessionRegistry>,
        broker: Arc<SnapshotBroker>,
        viewer_tokens: HashMap<String, u64>,
        stream: StreamConfig,
        trust_proxy_headers: bool,
    ) -> Self {
        Self {
            gateway,
            sessions,
            broker,
            viewer_tokens: Arc::new(viewer_tokens),
            stream,
            trust_proxy_headers,
        }
    }
}
