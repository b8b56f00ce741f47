//! Administer the probe catalog and entitlement ledger

use clap::{Parser, Subcommand};
use probe_rs::catalog::CatalogManager;
use probe_rs::config::Config;
use probe_rs::grant::GrantManager;
use probe_rs::ledger::LedgerManager;
use probe_rs::users::UserManager;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(
    name = "probe-admin",
    about = "Catalog ingestion and quota grants against the service database"
)]
struct Cli {
    /// Service configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Append a probe file to a catalog partition
    Ingest {
        subject: String,
        tier: String,
        label: String,
        file_ref: String,
    },
    /// Grant delivery quota to a user
    Grant {
        user_id: i64,
        subject: String,
        tier: String,
        amount: i64,
    },
    /// List a catalog partition in delivery order
    List { subject: String, tier: String },
    /// Show the registered-user count
    Subscribers,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = if std::path::Path::new(&cli.config).exists() {
        Config::from_file(&cli.config)?
    } else {
        Config::default()
    };

    let options =
        SqliteConnectOptions::from_str(&config.storage.database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    let ledger = Arc::new(LedgerManager::new(pool.clone(), config.delivery.cooldown_scope));
    ledger.init_db().await?;

    let catalog = CatalogManager::new(pool.clone());
    catalog.init_db().await?;

    match cli.command {
        Command::Ingest {
            subject,
            tier,
            label,
            file_ref,
        } => {
            if !config.delivery.is_configured(&subject, &tier) {
                anyhow::bail!("unknown subject/tier combination: {}/{}", subject, tier);
            }
            let item = catalog.ingest(&subject, &tier, &label, &file_ref).await?;
            println!("✅ Ingested item #{}", item.id);
            println!("   Partition: {}/{}", item.subject, item.tier);
            println!("   Label: {}", item.label);
        }
        Command::Grant {
            user_id,
            subject,
            tier,
            amount,
        } => {
            let (notice_tx, mut notice_rx) = mpsc::unbounded_channel();
            let grants = GrantManager::new(ledger, config.delivery.clone(), notice_tx);

            let receipt = grants.grant_access(user_id, &subject, &tier, amount).await?;
            println!(
                "✅ Granted {} deliveries to user {} for {}/{}",
                receipt.granted, receipt.user_id, receipt.subject, receipt.tier
            );
            println!("   Remaining: {}", receipt.remaining_count);

            if let Some(notice) = notice_rx.recv().await {
                println!("   Notice {} queued for transport", notice.id);
            }
        }
        Command::List { subject, tier } => {
            let items = catalog.list(&subject, &tier).await?;
            if items.is_empty() {
                println!("No items in {}/{}", subject, tier);
            }
            for item in items {
                println!("#{}  {}  ({})", item.id, item.label, item.file_ref);
            }
        }
        Command::Subscribers => {
            let users = UserManager::new(pool.clone(), ledger, config.delivery.clone());
            users.init_db().await?;
            println!("Subscribers: {}", users.count().await?);
        }
    }

    Ok(())
}
