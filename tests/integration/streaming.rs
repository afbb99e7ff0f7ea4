//! End-to-end live-view streaming tests
//!
//! These spin up the real API server, connect WebSocket clients and verify
//! privilege-dependent field visibility, session accounting and the agent
//! authentication endpoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fleet_monitoring::{
    api::{ApiConfig, ApiState, SessionRegistry, SnapshotBroker, spawn_api_server},
    auth::AgentGateway,
    config::StreamConfig,
    identity::IdentityCache,
    inventory::{GeoInfo, HostAddrs, InventoryState},
    storage::{HostRow, Role, Storage, memory::MemoryBackend},
};
use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::Value;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

const VIEWER_TOKEN: &str = "viewer-token";
const AGENT_SECRET: &str = "stream-secret";

struct TestServer {
    addr: SocketAddr,
    sessions: Arc<SessionRegistry>,
}

fn host_row(id: u64, uuid: &str, note: &str, hidden: bool) -> HostRow {
    HostRow {
        id,
        uuid: uuid.to_string(),
        name: format!("host-{id}"),
        user_id: 42,
        display_index: 0,
        public_note: note.to_string(),
        hide_from_guests: hidden,
        created_at: Utc::now(),
        last_active: None,
    }
}

async fn spawn_test_hub() -> TestServer {
    let storage = Arc::new(MemoryBackend::new());
    storage.add_account(42, Role::User, AGENT_SECRET).await;

    let identity = Arc::new(IdentityCache::new());
    identity
        .load_secrets(storage.load_agent_secrets().await.unwrap())
        .await;

    let inventory = Arc::new(InventoryState::new());
    inventory
        .warm(vec![
            host_row(1, "alpha", "maintenance window sunday", false),
            host_row(2, "bravo", "internal box", true),
        ])
        .await;
    inventory
        .attach_geo(
            "alpha",
            GeoInfo {
                addrs: HostAddrs {
                    ipv4: Some("8.8.8.8".to_string()),
                    ipv6: None,
                },
                country_code: "us".to_string(),
                organization: "Google LLC".to_string(),
            },
        )
        .await;

    let gateway = Arc::new(AgentGateway::new(
        storage.clone() as Arc<dyn Storage>,
        identity,
        inventory.clone(),
    ));

    let sessions = Arc::new(SessionRegistry::new());
    let broker = Arc::new(SnapshotBroker::new(inventory, sessions.clone()));

    let state = ApiState::new(
        gateway,
        sessions.clone(),
        broker,
        std::collections::HashMap::from([(VIEWER_TOKEN.to_string(), 9u64)]),
        StreamConfig {
            interval_secs: 1,
            ping_every: 4,
            max_snapshot_failures: 5,
        },
        false,
    );

    let config = ApiConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        enable_cors: true,
    };
    let addr = spawn_api_server(config, state).await.unwrap();

    TestServer { addr, sessions }
}

type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn connect(addr: SocketAddr, token: Option<&str>) -> WsClient {
    let mut request = format!("ws://{addr}/api/v1/ws/fleet")
        .into_client_request()
        .unwrap();
    if let Some(token) = token {
        request.headers_mut().insert(
            "Authorization",
            format!("Bearer {token}").parse().unwrap(),
        );
    }

    let (ws, _) = connect_async(request).await.unwrap();
    ws
}

/// Next text frame, skipping pings.
async fn next_frame(ws: &mut WsClient) -> Value {
    let deadline = Duration::from_secs(5);
    tokio::time::timeout(deadline, async {
        while let Some(Ok(message)) = ws.next().await {
            if message.is_text() {
                return serde_json::from_str(&message.into_text().unwrap()).unwrap();
            }
        }
        panic!("stream ended without a text frame");
    })
    .await
    .expect("no frame within deadline")
}

#[tokio::test]
async fn test_authorized_and_guest_field_visibility() {
    let server = spawn_test_hub().await;

    let mut authorized = connect(server.addr, Some(VIEWER_TOKEN)).await;
    let mut guest = connect(server.addr, None).await;

    let frame = next_frame(&mut authorized).await;
    let hosts = frame["hosts"].as_array().unwrap();
    // authorized viewers see the hidden host and full fields
    assert_eq!(hosts.len(), 2);
    let alpha = hosts.iter().find(|h| h["id"] == 1).unwrap();
    assert_eq!(alpha["public_note"], "maintenance window sunday");
    assert_eq!(alpha["ip_address"], "8.8.8.8");
    assert_eq!(alpha["country_code"], "us");

    let frame = next_frame(&mut guest).await;
    let hosts = frame["hosts"].as_array().unwrap();
    // guests get the redacted list without hidden hosts
    assert_eq!(hosts.len(), 1);
    assert_eq!(hosts[0]["id"], 1);
    assert_eq!(hosts[0]["public_note"], "");
    assert_eq!(hosts[0]["ip_address"], "");
    // country and organization remain public
    assert_eq!(hosts[0]["country_code"], "us");
    assert_eq!(hosts[0]["organization"], "Google LLC");
}

#[tokio::test]
async fn test_online_count_tracks_sessions() {
    let server = spawn_test_hub().await;

    let mut first = connect(server.addr, None).await;
    next_frame(&mut first).await;

    let mut second = connect(server.addr, None).await;
    next_frame(&mut second).await;

    // both registered; a following frame reports both viewers
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let frame = next_frame(&mut first).await;
        if frame["online"] == 2 {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "online count never reached 2"
        );
    }
}

#[tokio::test]
async fn test_session_removed_on_disconnect() {
    let server = spawn_test_hub().await;

    let mut ws = connect(server.addr, None).await;
    next_frame(&mut ws).await;
    assert_eq!(server.sessions.count().await, 1);

    drop(ws);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while server.sessions.count().await != 0 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "session was not cleaned up"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn test_agent_auth_endpoint_end_to_end() {
    let server = spawn_test_hub().await;
    let client = reqwest::Client::new();
    let url = format!("http://{}/api/v1/agent/auth", server.addr);

    let body = serde_json::json!({
        "client_secret": AGENT_SECRET,
        "client_uuid": "e2e-agent",
    });

    let response = client.post(&url).json(&body).send().await.unwrap();
    assert_eq!(response.status(), 200);
    let first: Value = response.json().await.unwrap();
    let id = first["id"].as_u64().unwrap();
    assert!(id > 0);

    // repeated call resolves to the same identity
    let response = client.post(&url).json(&body).send().await.unwrap();
    let second: Value = response.json().await.unwrap();
    assert_eq!(second["id"].as_u64().unwrap(), id);

    // invalid secret is rejected with a reason
    let response = client
        .post(&url)
        .json(&serde_json::json!({
            "client_secret": "wrong",
            "client_uuid": "e2e-agent",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
    let error: Value = response.json().await.unwrap();
    assert_eq!(error["error"], "agent authentication failed");
}
