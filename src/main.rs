use probe_rs::api::{ApiServer, AppState};
use probe_rs::catalog::CatalogManager;
use probe_rs::config::Config;
use probe_rs::delivery::DeliveryEngine;
use probe_rs::grant::GrantManager;
use probe_rs::ledger::LedgerManager;
use probe_rs::users::UserManager;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = if std::path::Path::new("config.toml").exists() {
        Config::from_file("config.toml")?
    } else {
        Config::default()
    };

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    match config.logging.format.as_str() {
        "json" => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
        _ => tracing_subscriber::fmt().with_env_filter(filter).pretty().init(),
    }

    info!("Starting probe-rs service");
    info!("  API listening on: {}", config.server.listen_addr);
    info!("  Database: {}", config.storage.database_url);
    info!("  Subjects: {:?}", config.delivery.subjects);
    info!("  Cooldown scope: {:?}", config.delivery.cooldown_scope);

    // Connect storage
    let options =
        SqliteConnectOptions::from_str(&config.storage.database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(config.storage.max_connections)
        .acquire_timeout(Duration::from_secs(config.storage.acquire_timeout_secs))
        .connect_with(options)
        .await?;

    // Wire up the engine
    let ledger = Arc::new(LedgerManager::new(pool.clone(), config.delivery.cooldown_scope));
    ledger.init_db().await?;

    let catalog = Arc::new(CatalogManager::new(pool.clone()));
    catalog.init_db().await?;

    let users = Arc::new(UserManager::new(
        pool.clone(),
        ledger.clone(),
        config.delivery.clone(),
    ));
    users.init_db().await?;

    let (notice_tx, mut notice_rx) = mpsc::unbounded_channel();
    let grants = Arc::new(GrantManager::new(
        ledger.clone(),
        config.delivery.clone(),
        notice_tx,
    ));

    let engine = Arc::new(DeliveryEngine::new(
        ledger.clone(),
        catalog.clone(),
        config.delivery.clone(),
    ));

    // Grant notices are handed to the chat transport; until one is attached
    // they surface in the log.
    tokio::spawn(async move {
        while let Some(notice) = notice_rx.recv().await {
            info!(
                user_id = notice.user_id,
                subject = %notice.subject,
                tier = %notice.tier,
                granted = notice.granted,
                "grant notice ready for transport"
            );
        }
    });

    let addr = config.server.listen_addr.clone();
    let state = Arc::new(AppState {
        engine,
        ledger,
        catalog,
        grants,
        users,
        config: Arc::new(config),
    });

    let server = ApiServer::new(state, addr);
    server.run().await?;

    Ok(())
}
