mod activity;
mod api;
mod config;
mod constants;
mod issuer;

use activity::FileActivityLog;
use anyhow::Context;
use api::{AppState, NodeClient};
use clap::Parser;
use config::{Args, Backend, NodeConfig};
use issuer::{spawn_issue, DryRunIssuer};
use ledger_core::{ChainStore, Client, MemoryStore};
use ledger_storage::{FileStore, SledStore};
use std::{net::SocketAddr, sync::Arc};
use tracing::{info, warn};

fn open_store(config: &NodeConfig) -> anyhow::Result<Box<dyn ChainStore>> {
    let store: Box<dyn ChainStore> = match config.backend {
        Backend::File => Box::new(FileStore::open(&config.data_dir, &config.identity)?),
        Backend::Sled => Box::new(SledStore::open(config.data_dir.join(&config.identity))?),
        Backend::Memory => Box::new(MemoryStore::new()),
    };
    Ok(store)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(%err, "failed to listen for ctrl-c");
    }
    info!("shutdown requested");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Args::parse().resolve()?;
    let store = open_store(&config)?;
    let activity = Arc::new(FileActivityLog::new(&config.log_dir, &config.identity));
    let client: Arc<NodeClient> = Arc::new(
        Client::open(&config.identity, store, config.chain.clone(), activity)
            .context("opening ledger")?,
    );

    if config.mine_on_start {
        client.mine(true);
    }
    if let Some(asset) = config.issue_asset.clone() {
        spawn_issue(Arc::new(DryRunIssuer), asset);
    }

    let state = AppState {
        client: Arc::clone(&client),
    };
    let app = api::router(state);

    let addr: SocketAddr = config.listen.parse()?;
    info!(identity = %config.identity, backend = ?config.backend, "ledger-node listening on http://{addr}");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    client.shutdown().context("closing ledger")?;
    info!("ledger-node stopped");
    Ok(())
}
