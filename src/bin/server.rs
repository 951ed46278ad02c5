use anyhow::Context;
use chat_ledger::api::{routes, AppState};
use chat_ledger::config::{AppConfig, LedgerBackend};
use chat_ledger::ledger::{EvmLedger, Ledger, MemoryLedger};
use chat_ledger::records::{FileRecordStore, MemoryRecordStore, RecordStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env().context("loading configuration")?;

    let records: Arc<dyn RecordStore> = match &config.records_path {
        Some(path) => Arc::new(
            FileRecordStore::open(path).with_context(|| format!("opening record store {}", path.display()))?,
        ),
        None => {
            warn!("no record file configured, cached hash records live in memory only");
            Arc::new(MemoryRecordStore::new())
        }
    };

    match config.backend {
        LedgerBackend::Evm => {
            let ledger_config = config.evm_ledger().context("configuring EVM ledger")?;
            info!(rpc_url = %ledger_config.rpc_url, contract = %ledger_config.contract_address, "using EVM ledger");
            let ledger = EvmLedger::new(ledger_config).context("building EVM ledger client")?;
            serve(config.listen_addr, Arc::new(ledger), records).await
        }
        LedgerBackend::Memory => {
            warn!("using in-memory ledger, digests are lost on restart");
            serve(config.listen_addr, Arc::new(MemoryLedger::new()), records).await
        }
    }
}

async fn serve<L: Ledger + 'static>(
    addr: SocketAddr,
    ledger: Arc<L>,
    records: Arc<dyn RecordStore>,
) -> anyhow::Result<()> {
    let state = Arc::new(AppState::new(ledger, records));
    let ledger_name = state.ledger.name().to_string();

    let (bound, server) = warp::serve(routes(state)).try_bind_with_graceful_shutdown(addr, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for shutdown signal");
        }
    })?;

    info!(addr = %bound, ledger = %ledger_name, "chat ledger API listening");
    server.await;
    info!("server stopped");
    Ok(())
}
