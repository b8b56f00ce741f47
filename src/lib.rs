//! probe-rs: Entitlement-gated delivery of exam probe files
//!
//! The engine behind a chat bot that hands out a finite catalog of probe
//! files, gated by two orthogonal limits per (user, subject, tier): a
//! time-based cooldown and a consumable quota.
//!
//! # Guarantees
//!
//! - **No double delivery**: each user walks a catalog partition in id
//!   order; an item is never handed to the same user twice
//! - **Quota conservation**: concurrent requests cannot over-spend a quota;
//!   the commit re-validates its preconditions at write time
//! - **Cooldown monotonicity**: delivery deadlines only move forward
//!
//! # Example
//!
//! ```no_run
//! use probe_rs::catalog::CatalogManager;
//! use probe_rs::config::Config;
//! use probe_rs::delivery::DeliveryEngine;
//! use probe_rs::ledger::LedgerManager;
//! use sqlx::SqlitePool;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let pool = SqlitePool::connect(&config.storage.database_url).await?;
//!
//!     let ledger = Arc::new(LedgerManager::new(pool.clone(), config.delivery.cooldown_scope));
//!     ledger.init_db().await?;
//!
//!     let catalog = Arc::new(CatalogManager::new(pool));
//!     catalog.init_db().await?;
//!
//!     let engine = DeliveryEngine::new(ledger, catalog, config.delivery.clone());
//!     let outcome = engine.deliver(1, "math", "free").await?;
//!     println!("{:?}", outcome);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration management
//! - [`error`]: Error types and handling
//! - [`ledger`]: Durable entitlement records (quota, cursor, cooldown)
//! - [`catalog`]: Ordered probe-file catalog
//! - [`delivery`]: Per-request admission and atomic commit
//! - [`grant`]: Administrative quota grants
//! - [`users`]: Registration and the user directory
//! - [`api`]: HTTP surface for the chat-transport adapter

pub mod api;
pub mod catalog;
pub mod config;
pub mod delivery;
pub mod error;
pub mod grant;
pub mod ledger;
pub mod users;

// Re-export commonly used types
pub use config::Config;
pub use error::{ProbeError, Result};
