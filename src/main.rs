use anchorer::{
    anchoring::{AnchoringLifecycleManager, BlockchainAdapter, MockBlockchain},
    api::{AppState, Server},
    batch::{MerkleBatchAggregator, Orchestrator, ResourcePool},
    clock::{Clock, SystemClock},
    config::{AnchoringConfig, Config},
    storage::{FsBlobStore, MemoryObjectStore, SqliteRecordStore},
};
use std::sync::Arc;
use tracing::info;

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Pick the chain adapter for the configured network
///
/// Only the in-memory mock ships with this crate; real networks plug in
/// through `BlockchainAdapter`.
fn blockchain_adapter(config: &AnchoringConfig) -> anyhow::Result<Arc<dyn BlockchainAdapter>> {
    if config.network == "mock" || config.blockchain == "mock" {
        return Ok(Arc::new(MockBlockchain::new(
            config.blockchain.clone(),
            config.network.clone(),
        )));
    }
    anyhow::bail!(
        "no adapter available for {}/{}",
        config.blockchain,
        config.network
    )
}

/// The main entry point for the anchoring service.
///
/// Initializes logging, loads the configuration, wires storage, the
/// aggregator and the lifecycle manager together, starts the scheduled loop
/// in the background and serves the JSON-RPC API.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&path)?;
    info!("Anchoring service starting with config: {:?}", config);

    let records = Arc::new(SqliteRecordStore::connect(&config.database.url).await?);
    let blobs = Arc::new(FsBlobStore::new(&config.storage.blob_dir));
    // submitted resources live here until the host application supplies a durable store
    let objects = Arc::new(MemoryObjectStore::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let blockchain = blockchain_adapter(&config.anchoring)?;

    let aggregator = Arc::new(MerkleBatchAggregator::new(
        blobs,
        records.clone(),
        clock.clone(),
        config.batch.safety_buffer,
    )?);
    let lifecycle = Arc::new(AnchoringLifecycleManager::new(
        records.clone(),
        objects.clone(),
        blockchain,
        clock,
        config.anchoring.required_confirmations,
    )?);
    let pool = Arc::new(ResourcePool::new());

    let orchestrator = Orchestrator::new(
        pool.clone(),
        aggregator.clone(),
        lifecycle.clone(),
        config.batch.clone(),
        config.anchoring.base_pub_key.clone(),
        config.anchoring.grace_period(),
    );
    tokio::spawn(async move {
        if let Err(e) = orchestrator.start().await {
            tracing::error!("Orchestrator error: {:?}", e);
        }
    });
    info!("Orchestrator started");

    let state = AppState {
        pool,
        aggregator,
        records,
        objects,
        lifecycle,
        grace_period: config.anchoring.grace_period(),
    };
    let server = Server::new(config.api.clone(), state);
    server.start().await?;

    Ok(())
}
