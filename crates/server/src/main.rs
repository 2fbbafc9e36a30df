//! Nexus - login and realm server
//!
//! Loads `serveroptions.txt` and the account files, then serves the STS
//! login tier and the binary realm tier until interrupted.

use anyhow::Context;
use nexus_accounts::{AccountLoader, MemoryAccountStore};
use nexus_config::ServerConfig;
use nexus_network::{HandlerRegistry, NetworkConfig, NexusServer};
use nexus_protocol::OpcodeRegistry;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Nexus starting up");

    let config = match ServerConfig::load_default() {
        Ok(config) => config,
        Err(e) => {
            warn!("Failed to load server options: {}", e);
            warn!("Using default configuration");
            ServerConfig::default()
        }
    };
    config.display();

    let loader = AccountLoader::new(&config.accounts_dir);
    let accounts = loader
        .load_all()
        .with_context(|| format!("loading accounts from {:?}", config.accounts_dir))?;

    let store = MemoryAccountStore::new();
    for account in accounts {
        let email = account.email.clone();
        if let Err(e) = store.insert(account) {
            warn!("Skipping account {}: {}", email, e);
        }
    }
    info!("Loaded {} accounts", store.len());

    let network_config = NetworkConfig::from_server_config(&config);
    let server = NexusServer::bind(
        network_config,
        Arc::new(store),
        OpcodeRegistry::realm_server(),
        HandlerRegistry::new(),
    )
    .await
    .context("starting listeners")?;

    info!("Server is ready to accept connections");

    if let Err(e) = server.run().await {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    info!("Server shutting down gracefully");
    Ok(())
}
