use crate::error::Result;
use crate::ledger::CooldownScope;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub delivery: DeliveryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub listen_addr: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// Bound on waiting for a pooled connection; expiry is reported to the
    /// caller as a delivery conflict, never as a hang.
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

/// Admission policy: which subjects and tiers exist, who is privileged,
/// and how cooldown windows are keyed.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeliveryConfig {
    pub subjects: Vec<String>,
    /// Tier seeded with `default_quota` at registration.
    pub free_tier: String,
    pub cooldown_scope: CooldownScope,
    /// Privileged user ids, exempt from cooldown and quota.
    pub admin_ids: Vec<i64>,
    pub tiers: Vec<TierPolicy>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TierPolicy {
    pub name: String,
    pub cooldown_hours: i64,
    pub default_quota: i64,
    /// User-facing price wording for paid tiers (e.g. "990 tg").
    pub price_label: Option<String>,
}

impl TierPolicy {
    pub fn cooldown(&self) -> Duration {
        Duration::hours(self.cooldown_hours.max(0))
    }
}

impl DeliveryConfig {
    pub fn tier(&self, name: &str) -> Option<&TierPolicy> {
        self.tiers.iter().find(|t| t.name == name)
    }

    pub fn is_configured(&self, subject: &str, tier: &str) -> bool {
        self.subjects.iter().any(|s| s == subject) && self.tier(tier).is_some()
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admin_ids.contains(&user_id)
    }

    pub fn free_tier_policy(&self) -> Option<&TierPolicy> {
        self.tier(&self.free_tier)
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::error::ProbeError::Config(e.to_string()))?;

        toml::from_str(&content)
            .map_err(|e| crate::error::ProbeError::Config(e.to_string()))
    }

    pub fn default() -> Self {
        Self {
            server: ServerConfig {
                listen_addr: "0.0.0.0:8080".to_string(),
            },
            storage: StorageConfig {
                database_url: "sqlite://probe.db".to_string(),
                max_connections: 5,
                acquire_timeout_secs: 5,
            },
            delivery: DeliveryConfig {
                subjects: vec!["informatics".to_string(), "math".to_string()],
                free_tier: "free".to_string(),
                cooldown_scope: CooldownScope::SubjectTier,
                admin_ids: Vec::new(),
                tiers: vec![
                    TierPolicy {
                        name: "free".to_string(),
                        cooldown_hours: 24,
                        default_quota: 5,
                        price_label: None,
                    },
                    TierPolicy {
                        name: "special".to_string(),
                        cooldown_hours: 0,
                        default_quota: 0,
                        price_label: Some("990 tg".to_string()),
                    },
                    TierPolicy {
                        name: "special_with_answers".to_string(),
                        cooldown_hours: 0,
                        default_quota: 0,
                        price_label: Some("1490 tg".to_string()),
                    },
                ],
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}
