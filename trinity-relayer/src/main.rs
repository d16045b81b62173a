//! trinity-relayer binary.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use trinity_core::RelayerStore;
use trinity_relayer::{
    ArbitrumClient, ChainReader, ConsensusContract, LogFormat, RelayerConfig, SolanaReader,
    TonReader, TrinityRelayer,
};

const DEFAULT_LOG_FILTER: &str = "trinity_relayer=info,trinity_core=info";

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    let config = RelayerConfig::from_env()?;

    init_tracing(config.log_format);

    info!("Starting trinity-relayer");
    info!(
        arbitrum = %config.arbitrum_rpc_url,
        solana = %config.solana_rpc_url,
        ton = %config.ton_endpoint,
        verifier = ?config.verifier_address,
        "Chain endpoints"
    );

    let validators = config.validator_set()?;
    let home = config.home_validator()?;

    let store = match &config.db_path {
        Some(path) => RelayerStore::open(path)
            .with_context(|| format!("Failed to open relayer store at {}", path.display()))?,
        None => {
            info!("RELAYER_DB_PATH not set, relayer state is kept in memory");
            RelayerStore::temporary().context("Failed to create in-memory store")?
        }
    };

    // Create chain clients
    let contract: Arc<dyn ConsensusContract> = Arc::new(
        ArbitrumClient::connect(
            &config.arbitrum_rpc_url,
            config.arbitrum_ws_url.clone(),
            config.verifier_address,
            home.wallet().clone(),
        )
        .await
        .context("Failed to connect to Arbitrum")?,
    );
    let readers: Vec<Arc<dyn ChainReader>> = vec![
        Arc::new(SolanaReader::new(config.solana_rpc_url.clone())?),
        Arc::new(TonReader::new(config.ton_endpoint.clone())?),
    ];

    let relayer = TrinityRelayer::new(contract, readers, validators, store, config.settings.clone())?;
    relayer.start().await.context("Failed to start relayer")?;

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutting down relayer...");

    relayer.stop().await;
    relayer.drain().await;

    let stats = relayer.stats();
    info!(
        operations = stats.operations_processed,
        proofs = stats.proofs_submitted,
        consensus = stats.consensus_achieved,
        failed = stats.failed_submissions,
        "Relayer shut down"
    );

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    match format {
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}
