// Path: crates/node/src/main.rs
//! Binary entry point: parse CLI flags, load config, wire the ledger,
//! mempool, and HTTP surfaces, then drive the consensus loop until the
//! process is asked to stop.

use clap::Parser;
use std::net::SocketAddr;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;
use timpal_crypto::sign::{KeyPair, PrivateKey};
use timpal_historical::HistoricalStateLog;
use timpal_ledger::Ledger;
use timpal_mempool::Mempool;
use timpal_node::api::{self, ApiState};
use timpal_node::config::{Cli, NodeConfig};
use timpal_node::consensus_loop::{ConsensusLoop, LoopConfig, NoopBroadcaster, PeerView};
use timpal_node::sync::SyncThresholds;
use timpal_storage::Store;
use tokio::sync::RwLock;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    timpal_telemetry::init::init_tracing()?;

    let cli = Cli::parse();
    let config = NodeConfig::load(&cli.config)?;

    let keypair = match &cli.validator_key {
        Some(hex_key) => {
            let bytes = hex::decode(hex_key)?;
            let private = PrivateKey::from_bytes(&bytes)?;
            let public = private.public_key();
            Some(KeyPair { public, private })
        }
        None => None,
    };

    std::fs::create_dir_all(&cli.data_dir)?;
    let store = Store::open(&cli.data_dir)?;
    let historical = HistoricalStateLog::open(store);
    let ledger_config = config.ledger_config()?;
    let max_txs_per_block = ledger_config.max_txs_per_block;

    // TODO: load a genesis validator set from a genesis file once one
    // is deployed; a single-node bootstrap runs with no validators
    // registered yet and self-registers via a `ValidatorRegistration`
    // transaction in its first proposing window.
    let ledger = Ledger::new(ledger_config, Vec::new(), historical);
    let local_height = ledger.height();
    let ledger = Arc::new(RwLock::new(ledger));
    let mempool = Arc::new(Mempool::new());
    let peer_count = Arc::new(AtomicU64::new(0));

    let metrics_sink = timpal_telemetry::prometheus::install()?;
    timpal_telemetry::sinks::SINK
        .set(metrics_sink)
        .map_err(|_| anyhow::anyhow!("metrics sink already installed"))?;

    let telemetry_addr: SocketAddr = "127.0.0.1:9100".parse()?;
    tokio::spawn(async move {
        timpal_telemetry::http::run_server(telemetry_addr).await;
    });

    let api_state = ApiState {
        ledger: ledger.clone(),
        mempool: mempool.clone(),
        peer_count: Arc::new(std::sync::atomic::AtomicUsize::new(0)),
    };
    let http_addr = cli.http_addr;
    let router = api::router(api_state);
    tokio::spawn(async move {
        let listener = match tokio::net::TcpListener::bind(http_addr).await {
            Ok(listener) => listener,
            Err(err) => {
                error!(?err, "failed to bind node API listener");
                return;
            }
        };
        if let Err(err) = axum::serve(listener, router.into_make_service()).await {
            error!(?err, "node API server exited");
        }
    });

    let loop_config = LoopConfig {
        block_time_secs: config.consensus.block_time_secs,
        max_txs_per_block,
        required_peers: config.required_peers,
        is_bootstrap: config.is_bootstrap,
        min_validators_for_consensus: timpal_ledger::config::MIN_VALIDATORS_FOR_CONSENSUS,
        external_block_timeout: Duration::from_secs(config.external_block_timeout_secs),
    };
    let thresholds = SyncThresholds {
        lag_threshold: config.sync_lag_threshold,
        severe_lag_threshold: config.severe_lag_threshold,
        cooling_blocks: config.sync_cooling_blocks,
        stall_timeout: Duration::from_secs(config.external_block_timeout_secs),
    };
    let mut consensus = ConsensusLoop::new(
        ledger,
        mempool,
        keypair,
        loop_config,
        thresholds,
        NoopBroadcaster,
        local_height,
        peer_count,
    );

    info!("timpal-node starting consensus loop");
    loop {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        // A bootstrap single-node deployment has no peer discovery yet;
        // a real deployment feeds this from the gossip/sync task.
        let peers = PeerView { reachable_peers: 0, max_peer_height: 0, online_validator_count: 1 };
        let _ = consensus.tick(now, peers).await;
        tokio::time::sleep(Duration::from_secs(config.consensus.block_time_secs)).await;
    }
}
