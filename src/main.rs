//! Investor-facing track-record ledger service: ingest self-reported
//! trading events, serve signed reports, and serve offline-verifiable
//! proof bundles.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use trackrecord::api::{router, AppState};
use trackrecord::config::{load_env, Config};
use trackrecord::signer::KeyPair;
use trackrecord::state_manager::StateManager;
use trackrecord::store::Store;

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "trackrecord=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    let config = Config::from_env();
    info!("starting trackrecord-server, database at {}", config.database_path);

    let store = Arc::new(Store::new(&config.database_path).context("failed to open ledger database")?);
    let state_manager = Arc::new(StateManager::new(store.clone(), config.server_hmac_secret.clone()));
    let keys = Arc::new(match config.signing_key {
        Some(bytes) => KeyPair::from_bytes(&bytes),
        None => {
            tracing::warn!("SIGNING_KEY_HEX not set; generating an ephemeral signing key for this process");
            KeyPair::generate()
        }
    });
    info!("report signing key version: {}", keys.signing_key_version());

    let state = AppState { store, state_manager, keys, trusted_key_versions: config.trusted_key_versions.clone() };
    let app = router(state);

    let listener = TcpListener::bind(&config.bind_addr).await.context("failed to bind listener")?;
    info!("listening on {}", config.bind_addr);
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
