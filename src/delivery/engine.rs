//! Delivery engine - admission decisions and atomic delivery commits

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::catalog::{CatalogManager, Item};
use crate::config::{DeliveryConfig, TierPolicy};
use crate::delivery::types::{Delivery, DeliveryOutcome, DenyReason};
use crate::error::{ProbeError, Result};
use crate::ledger::LedgerManager;

/// Pause before the single retry of a failed storage operation.
const STORAGE_RETRY_BACKOFF: StdDuration = StdDuration::from_millis(100);

/// Decides, for each request, whether the user may receive the next probe,
/// which one, and commits the entitlement transition.
///
/// Per request: CheckPrivilege -> CheckCooldown -> CheckQuota -> SelectItem
/// -> Commit -> Deliver | Deny. A commit that loses a race against a
/// concurrent request restarts once from CheckCooldown; a second loss is
/// reported as a conflict.
pub struct DeliveryEngine {
    ledger: Arc<LedgerManager>,
    catalog: Arc<CatalogManager>,
    policy: DeliveryConfig,
}

impl DeliveryEngine {
    pub fn new(ledger: Arc<LedgerManager>, catalog: Arc<CatalogManager>, policy: DeliveryConfig) -> Self {
        Self {
            ledger,
            catalog,
            policy,
        }
    }

    /// Handle one delivery request.
    pub async fn deliver(&self, user_id: i64, subject: &str, tier: &str) -> Result<DeliveryOutcome> {
        self.deliver_at(user_id, subject, tier, Utc::now()).await
    }

    /// Handle one delivery request against an explicit clock.
    pub async fn deliver_at(
        &self,
        user_id: i64,
        subject: &str,
        tier: &str,
        now: DateTime<Utc>,
    ) -> Result<DeliveryOutcome> {
        if !self.policy.is_configured(subject, tier) {
            return Err(ProbeError::InvalidSubject {
                subject: subject.to_string(),
                tier: tier.to_string(),
            });
        }
        // is_configured guarantees the tier exists
        let tier_policy = self
            .policy
            .tier(tier)
            .ok_or_else(|| ProbeError::InvalidSubject {
                subject: subject.to_string(),
                tier: tier.to_string(),
            })?;

        // CheckPrivilege: administrators bypass cooldown and quota entirely
        // and never touch the ledger.
        if self.policy.is_admin(user_id) {
            return match self.catalog.random_item(subject, tier).await? {
                Some(item) => {
                    info!(user_id, subject, tier, item_id = item.id, "privileged delivery");
                    Ok(DeliveryOutcome::Delivered(self.package(item, tier_policy)))
                }
                None => Ok(DeliveryOutcome::Denied(DenyReason::CatalogExhausted)),
            };
        }

        match self.admit(user_id, subject, tier, tier_policy, now).await {
            Err(ProbeError::Database(sqlx::Error::PoolTimedOut)) => {
                warn!(user_id, subject, tier, "timed out waiting for the ledger");
                Ok(DeliveryOutcome::Denied(DenyReason::Conflict))
            }
            Err(ProbeError::Database(e)) => {
                warn!(user_id, subject, tier, error = %e, "storage failed, retrying once");
                tokio::time::sleep(STORAGE_RETRY_BACKOFF).await;
                match self.admit(user_id, subject, tier, tier_policy, now).await {
                    Err(ProbeError::Database(e)) => {
                        Err(ProbeError::StorageUnavailable(e.to_string()))
                    }
                    other => other,
                }
            }
            other => other,
        }
    }

    /// One admission pass, restarted once after a lost commit race.
    async fn admit(
        &self,
        user_id: i64,
        subject: &str,
        tier: &str,
        tier_policy: &TierPolicy,
        now: DateTime<Utc>,
    ) -> Result<DeliveryOutcome> {
        match self.attempt(user_id, subject, tier, tier_policy, now).await {
            Err(ProbeError::PreconditionFailed) => {
                debug!(user_id, subject, tier, "commit lost a race, re-admitting");
                match self.attempt(user_id, subject, tier, tier_policy, now).await {
                    Err(ProbeError::PreconditionFailed) => {
                        Ok(DeliveryOutcome::Denied(DenyReason::Conflict))
                    }
                    other => other,
                }
            }
            other => other,
        }
    }

    async fn attempt(
        &self,
        user_id: i64,
        subject: &str,
        tier: &str,
        tier_policy: &TierPolicy,
        now: DateTime<Utc>,
    ) -> Result<DeliveryOutcome> {
        let record = self.ledger.read(user_id, subject, tier).await?;

        // CheckCooldown: the window can be open even before the first grant
        // when the deployment shares cooldowns across tiers.
        let deadline = match &record {
            Some(record) => record.cooldown_until,
            None => self.ledger.cooldown_deadline(user_id, subject, tier).await?,
        };
        if let Some(until) = deadline {
            if now < until {
                let retry_after_secs = (until - now).num_seconds().max(1);
                return Ok(DeliveryOutcome::Denied(DenyReason::CooldownActive {
                    retry_after_secs,
                }));
            }
        }

        // CheckQuota: an absent record and a spent one deny the same way.
        let Some(record) = record else {
            return Ok(DeliveryOutcome::Denied(DenyReason::QuotaExhausted));
        };
        if !record.has_quota() {
            return Ok(DeliveryOutcome::Denied(DenyReason::QuotaExhausted));
        }

        // SelectItem
        let Some(item) = self.catalog.next_item(subject, tier, record.cursor).await? else {
            return Ok(DeliveryOutcome::Denied(DenyReason::CatalogExhausted));
        };

        // Commit: the ledger re-validates quota and cursor at write time.
        self.ledger
            .commit_delivery(user_id, subject, tier, item.id, tier_policy.cooldown(), now)
            .await?;

        info!(user_id, subject, tier, item_id = item.id, "delivered");
        Ok(DeliveryOutcome::Delivered(self.package(item, tier_policy)))
    }

    fn package(&self, item: Item, tier_policy: &TierPolicy) -> Delivery {
        let caption = match &tier_policy.price_label {
            Some(price) => format!("Premium probe ({}): {}", price, item.label),
            None => format!("Practice probe (free): {}", item.label),
        };

        Delivery {
            item_id: item.id,
            label: item.label,
            file_ref: item.file_ref,
            caption,
        }
    }
}
