//! Live-view API server
//!
//! The hub's outward surface: the WebSocket live-view entry point streaming
//! privilege-filtered fleet snapshots, and the agent authentication
//! endpoint standing in for the RPC transport.
//!
//! ## Architecture
//!
//! - **Axum** web framework with Tower middleware
//! - **Session registry** tracking every connected viewer
//! - **Coalesced snapshots** shared across concurrent viewers per
//!   privilege class

pub mod error;
pub mod routes;
pub mod sessions;
pub mod snapshot;
pub mod state;
pub mod utils;
pub mod websocket;

pub use error::{ApiError, ApiResult};
pub use sessions::{OnlineSession, SessionRegistry};
pub use snapshot::{SnapshotBroker, StreamFrame, StreamHost, ViewerClass};
pub use state::ApiState;

use std::net::SocketAddr;

use axum::{
    Router,
    routing::{get, post},
};
use tracing::info;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:8080")
    pub bind_addr: SocketAddr,

    /// Enable CORS for dashboard frontends
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".parse().unwrap(),
            enable_cors: true,
        }
    }
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task.
/// Returns the server's local address.
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    info!("starting API server on {}", config.bind_addr);

    let mut app = Router::new()
        .route("/api/v1/agent/auth", post(routes::agent::authenticate_agent))
        .route("/api/v1/ws/fleet", get(websocket::websocket_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
