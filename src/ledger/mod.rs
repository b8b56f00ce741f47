//! Entitlement ledger: durable quota, cursor and cooldown state per
//! (user, subject, tier)

pub mod manager;
pub mod types;

pub use manager::LedgerManager;
pub use types::{CooldownScope, EntitlementRecord};
