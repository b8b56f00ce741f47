//! Grant service - administrative quota top-ups with user notification

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::DeliveryConfig;
use crate::error::{ProbeError, Result};
use crate::grant::types::{GrantNotice, GrantReceipt};
use crate::ledger::LedgerManager;

/// Applies administrative quota grants.
///
/// Admin identity is verified by the transport boundary before a request
/// reaches this service. Successful grants queue a [`GrantNotice`] for the
/// transport layer to forward to the user.
pub struct GrantManager {
    ledger: Arc<LedgerManager>,
    policy: DeliveryConfig,
    notices: mpsc::UnboundedSender<GrantNotice>,
}

impl GrantManager {
    pub fn new(
        ledger: Arc<LedgerManager>,
        policy: DeliveryConfig,
        notices: mpsc::UnboundedSender<GrantNotice>,
    ) -> Self {
        Self {
            ledger,
            policy,
            notices,
        }
    }

    /// Add `amount` deliveries to the target user's quota for a tier.
    pub async fn grant_access(
        &self,
        target_user_id: i64,
        subject: &str,
        tier: &str,
        amount: i64,
    ) -> Result<GrantReceipt> {
        if !self.policy.is_configured(subject, tier) {
            return Err(ProbeError::InvalidSubject {
                subject: subject.to_string(),
                tier: tier.to_string(),
            });
        }

        let remaining_count = self.ledger.grant(target_user_id, subject, tier, amount).await?;

        info!(
            user_id = target_user_id,
            subject, tier, amount, remaining_count, "quota granted"
        );

        let notice = GrantNotice {
            id: Uuid::new_v4(),
            user_id: target_user_id,
            subject: subject.to_string(),
            tier: tier.to_string(),
            granted: amount,
            remaining_count,
            created_at: Utc::now(),
        };
        if self.notices.send(notice).is_err() {
            warn!(user_id = target_user_id, "grant notice receiver dropped");
        }

        Ok(GrantReceipt {
            user_id: target_user_id,
            subject: subject.to_string(),
            tier: tier.to_string(),
            granted: amount,
            remaining_count,
        })
    }
}
