use serde::{Deserialize, Serialize};

/// A delivery request as handed over by the transport adapter.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeliveryRequest {
    pub user_id: i64,
    pub subject: String,
    pub tier: String,
}

/// Why a delivery request was turned down.
///
/// These are legitimate business outcomes, not failures; none of them is
/// retried automatically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// The cooldown window is still open; retry after the given duration.
    CooldownActive { retry_after_secs: i64 },
    /// No remaining quota for this (user, subject, tier), or never had any.
    QuotaExhausted,
    /// The cursor has passed the last item of the partition.
    CatalogExhausted,
    /// Lost a concurrent update race twice, or timed out waiting for the
    /// ledger.
    Conflict,
}

impl DenyReason {
    pub fn code(&self) -> &'static str {
        match self {
            DenyReason::CooldownActive { .. } => "cooldown_active",
            DenyReason::QuotaExhausted => "quota_exhausted",
            DenyReason::CatalogExhausted => "catalog_exhausted",
            DenyReason::Conflict => "conflict",
        }
    }

    /// User-facing wording, ready for the transport layer to render.
    pub fn detail(&self) -> String {
        match self {
            DenyReason::CooldownActive { retry_after_secs } => {
                let hours = retry_after_secs / 3600;
                let minutes = (retry_after_secs % 3600) / 60;
                format!(
                    "The next probe for this section unlocks in {} h {} min.",
                    hours, minutes
                )
            }
            DenyReason::QuotaExhausted => {
                "No probe allowance left for this subject and tier.".to_string()
            }
            DenyReason::CatalogExhausted => {
                "Every probe in this section has already been delivered to you.".to_string()
            }
            DenyReason::Conflict => {
                "The request collided with another update. Please try again.".to_string()
            }
        }
    }
}

/// A successfully admitted delivery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Delivery {
    pub item_id: i64,
    pub label: String,
    /// Opaque payload handle the transport sends to the user.
    pub file_ref: String,
    pub caption: String,
}

/// Terminal state of one delivery request.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    Delivered(Delivery),
    Denied(DenyReason),
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered(_))
    }

    pub fn delivered(&self) -> Option<&Delivery> {
        match self {
            DeliveryOutcome::Delivered(delivery) => Some(delivery),
            DeliveryOutcome::Denied(_) => None,
        }
    }

    pub fn denied(&self) -> Option<&DenyReason> {
        match self {
            DeliveryOutcome::Delivered(_) => None,
            DeliveryOutcome::Denied(reason) => Some(reason),
        }
    }
}
