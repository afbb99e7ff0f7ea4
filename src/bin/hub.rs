use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use fleet_monitoring::{
    api::{ApiConfig, ApiState, SessionRegistry, SnapshotBroker, spawn_api_server},
    auth::AgentGateway,
    config::{Config, StorageConfig, read_config_file},
    geo::{GeoResolver, spawn_sweeper},
    identity::IdentityCache,
    inventory::InventoryState,
    storage::{Storage, memory::MemoryBackend},
};
use tracing::{info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("fleet_monitoring", LevelFilter::TRACE),
        ("hub", LevelFilter::TRACE),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();

    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.file)?;

    let storage = open_storage(&config).await?;

    let identity = Arc::new(IdentityCache::new());
    identity.load_secrets(storage.load_agent_secrets().await?).await;

    let inventory = Arc::new(InventoryState::new());
    let hosts = storage.load_hosts().await?;
    identity
        .load_hosts(hosts.iter().map(|h| (h.uuid.clone(), h.id)).collect())
        .await;
    inventory.warm(hosts).await;
    info!("inventory warmed with {} hosts", inventory.len().await);

    let geo = GeoResolver::from_config(&config.geo);
    let _sweeper = spawn_sweeper(
        geo.clone(),
        Duration::from_secs(config.geo.sweep_interval_secs),
    );

    let gateway = Arc::new(
        AgentGateway::new(storage.clone(), identity.clone(), inventory.clone())
            .with_geo(geo.clone()),
    );

    let sessions = Arc::new(SessionRegistry::new());
    let broker = Arc::new(SnapshotBroker::new(inventory.clone(), sessions.clone()));

    let viewer_tokens = config
        .viewers
        .iter()
        .map(|viewer| (viewer.token.clone(), viewer.account_id))
        .collect();

    let state = ApiState::new(
        gateway,
        sessions,
        broker,
        viewer_tokens,
        config.stream.clone(),
        config.trust_proxy_headers,
    );

    let api_config = ApiConfig {
        bind_addr: config.bind_addr,
        enable_cors: true,
    };
    spawn_api_server(api_config, state).await?;

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    storage.close().await?;

    Ok(())
}

async fn open_storage(config: &Config) -> anyhow::Result<Arc<dyn Storage>> {
    match config.storage.clone().unwrap_or_default() {
        StorageConfig::None => {
            info!("using in-memory storage (no persistence)");
            Ok(Arc::new(MemoryBackend::new()))
        }
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path } => {
            let backend = fleet_monitoring::storage::sqlite::SqliteBackend::new(&path).await?;
            Ok(Arc::new(backend))
        }
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => {
            anyhow::bail!("built without the storage-sqlite feature")
        }
    }
}
