//! Live-view WebSocket handler
//!
//! One lightweight task pipeline per connection: a push loop computes (or
//! joins) the current snapshot for the viewer's privilege class and queues
//! it on the session's write handle, a writer drains the queue to the
//! socket, and a reader consumes client frames until close. The first
//! failing write ends the session; the registry entry is removed on every
//! exit path.

use std::time::Duration;

use axum::{
    extract::{
        ConnectInfo, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::HeaderMap,
    response::Response,
};
use chrono::Utc;
use futures::{SinkExt, stream::StreamExt};
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::sessions::OnlineSession;
use super::snapshot::ViewerClass;
use super::state::ApiState;
use super::utils::resolve_origin;

/// WebSocket upgrade handler
///
/// GET /api/v1/ws/fleet
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<ApiState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let viewer_id = viewer_identity(&headers, &state);
    let origin = resolve_origin(&headers, remote, state.trust_proxy_headers);

    ws.on_upgrade(move |socket| stream_fleet(socket, state, viewer_id, origin.to_string()))
}

/// Viewer account identity from a bearer token; 0 denotes a guest.
fn viewer_identity(headers: &HeaderMap, state: &ApiState) -> u64 {
    headers
        .get("Authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .and_then(|token| state.viewer_tokens.get(token))
        .copied()
        .unwrap_or(0)
}

/// Drive one streaming session until its socket dies.
async fn stream_fleet(socket: WebSocket, state: ApiState, viewer_id: u64, origin: String) {
    let conn_id = Uuid::new_v4().to_string();
    info!("live-view session {conn_id} connected (viewer {viewer_id}, origin {origin})");

    let (mut sink, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    state
        .sessions
        .insert(
            conn_id.clone(),
            OnlineSession {
                user_id: viewer_id,
                ip: origin,
                connected_at: Utc::now(),
                handle: tx.clone(),
            },
        )
        .await;

    // writer: drains the session's queue, ends on the first failed write
    let mut write_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sink.send(message).await.is_err() {
                debug!("write failed, client disconnected");
                break;
            }
        }
    });

    let class = if viewer_id > 0 {
        ViewerClass::Authorized
    } else {
        ViewerClass::Guest
    };
    let broker = state.broker.clone();
    let stream = state.stream.clone();
    let interval = Duration::from_secs(stream.interval_secs);

    // push loop: snapshot, periodic ping, fixed sleep
    let mut push_task = tokio::spawn(async move {
        let mut iterations: u64 = 0;
        let mut failures: u32 = 0;

        loop {
            match broker.serialized(class).await {
                Ok(frame) => {
                    failures = 0;
                    if tx.send(Message::Text(frame.as_ref().clone())).is_err() {
                        break;
                    }

                    iterations += 1;
                    if iterations % stream.ping_every == 0
                        && tx.send(Message::Ping(Vec::new())).is_err()
                    {
                        break;
                    }
                }
                Err(e) => {
                    // transient failures back off instead of spinning;
                    // repeated ones are terminal
                    failures += 1;
                    warn!("snapshot computation failed ({failures}): {e}");
                    if failures >= stream.max_snapshot_failures {
                        break;
                    }
                }
            }

            tokio::time::sleep(interval).await;
        }
    });

    // reader: consume client frames until close
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            if let Message::Close(_) = message {
                break;
            }
        }
    });

    tokio::select! {
        _ = (&mut push_task) => {
            write_task.abort();
            recv_task.abort();
        }
        _ = (&mut write_task) => {
            push_task.abort();
            recv_task.abort();
        }
        _ = (&mut recv_task) => {
            push_task.abort();
            write_task.abort();
        }
    }

    // unconditional cleanup, regardless of which task ended the session
    state.sessions.remove(&conn_id).await;
    info!("live-view session {conn_id} closed");
}
