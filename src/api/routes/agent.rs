//! Agent authentication endpoint
//!
//! Stand-in surface for the RPC transport: call-scoped metadata arrives as
//! a JSON object and is handed to the gateway as a [`CallContext`].

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::{
    Json,
    extract::{ConnectInfo, State},
    http::HeaderMap,
};
use serde_json::json;
use tracing::debug;

use crate::api::error::ApiResult;
use crate::api::state::ApiState;
use crate::api::utils::resolve_origin;
use crate::auth::CallContext;

/// Authenticate an agent and resolve its stable host identity
///
/// POST /api/v1/agent/auth
pub async fn authenticate_agent(
    State(state): State<ApiState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(metadata): Json<HashMap<String, String>>,
) -> ApiResult<Json<serde_json::Value>> {
    let origin = resolve_origin(&headers, remote, state.trust_proxy_headers);
    debug!("agent auth call from {origin}");

    let ctx = CallContext::new(metadata, Some(origin));
    let host_id = state.gateway.authenticate(&ctx).await?;

    Ok(Json(json!({ "id": host_id })))
}
