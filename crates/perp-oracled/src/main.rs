//! perp-oracled: the perpetual price oracle daemon.
//!
//! Single process running a Tokio runtime. Keepers push index and last
//! prices, and the funding engine reads prices and updates funding inputs,
//! through newline-delimited JSON-RPC 2.0 over a Unix socket.

mod clock;
mod commands;
mod config;
mod rpc;

use std::sync::Arc;

use perp_oracle::{AllowList, OracleStore, SharedFunding};
use perp_types::OracleEvent;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::clock::unix_now;
use crate::config::DaemonConfig;
use crate::rpc::RpcServer;

/// Daemon-wide shared state.
pub struct DaemonState {
    /// The price store.
    pub store: OracleStore,
    /// Funding table the store projects index prices with.
    pub funding: Arc<SharedFunding>,
    /// Role grants, shared with the store.
    pub access: Arc<AllowList>,
    /// Configuration the daemon was started with.
    pub config: DaemonConfig,
    /// Unix time the store was initialized.
    pub started_at: u64,
}

impl DaemonState {
    /// Build the store described by `config`, initialized at `now`.
    pub fn from_config(config: DaemonConfig, now: u64) -> anyhow::Result<Self> {
        let instruments = config.instrument_specs()?;
        let access = Arc::new(config.allow_list());
        let funding = Arc::new(SharedFunding::new());
        let store = OracleStore::new(
            config.oracle.clone(),
            instruments,
            access.clone(),
            funding.clone(),
            now,
        )?;
        Ok(Self {
            store,
            funding,
            access,
            config,
            started_at: now,
        })
    }
}

/// Log every store event until the bus closes.
async fn log_events(mut events: broadcast::Receiver<OracleEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => debug!(event = event.name(), %json, "oracle event"),
                Err(e) => warn!("failed to encode event: {}", e),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "event logger lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config
    let config = DaemonConfig::load()?;

    // 2. Initialize tracing; RUST_LOG wins over the configured level
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(config.log_directive()))?,
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        instruments = config.instruments.len(),
        "perp oracle daemon starting"
    );

    // 3. Build the store
    let socket_path = config.daemon.socket_path.clone();
    let state = Arc::new(DaemonState::from_config(config, unix_now())?);

    // 4. Start the event logger
    tokio::spawn(log_events(state.store.events().subscribe()));

    // 5. Run the RPC server until shutdown
    let rpc_server = RpcServer::new(state.clone(), socket_path.clone());
    tokio::select! {
        result = rpc_server.run() => {
            if let Err(e) = result {
                error!("RPC server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
        }
    }

    let _ = std::fs::remove_file(&socket_path);
    info!("daemon stopped");
    Ok(())
}
