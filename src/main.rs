// Plasma Oracles - Main Entry Point
// Submits one batch of currency rates to the currencies contract

use std::sync::Arc;

use plasma_oracles::{parse_rates, ChainRpc, CurrenciesSubmitter, HttpLedgerClient, NetworkConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: plasma-oracles <rates.json> <token>";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let (rates_path, token) = match (args.next(), args.next()) {
        (Some(path), Some(token)) => (path, token),
        _ => return Err(USAGE.into()),
    };

    // Client and key are built once and shared by every submission
    let config = NetworkConfig::from_env()?;
    let rpc = ChainRpc::new(config.chain_rpc_config())?;
    let client = HttpLedgerClient::new(rpc, config.signing_key()?);
    client.log_status();

    let submitter = CurrenciesSubmitter::from_config(Arc::new(client), &config);

    let raw = tokio::fs::read_to_string(&rates_path).await?;
    let rates = parse_rates(&raw)?;
    info!(count = rates.len(), %token, "submitting rates");

    let receipt = submitter.update_currencies(&rates, &token).await?;
    info!(transaction_id = %receipt.transaction_id, "rates updated");

    Ok(())
}
