use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Cooldown row key shared by every tier of a subject when the scope is
/// [`CooldownScope::Subject`].
pub(crate) const SHARED_COOLDOWN_KEY: &str = "shared";

/// Which deliveries share one cooldown window.
///
/// Chosen per deployment; applied uniformly by the ledger rather than
/// branched through handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CooldownScope {
    /// One window per (user, subject), shared by every tier.
    Subject,
    /// One window per (user, subject, tier).
    SubjectTier,
}

impl CooldownScope {
    pub(crate) fn key<'a>(&self, tier: &'a str) -> &'a str {
        match self {
            CooldownScope::Subject => SHARED_COOLDOWN_KEY,
            CooldownScope::SubjectTier => tier,
        }
    }
}

/// Durable per-(user, subject, tier) entitlement state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitlementRecord {
    pub user_id: i64,
    pub subject: String,
    pub tier: String,
    /// Consumable allowance; never negative.
    pub remaining_count: i64,
    /// Id of the last item delivered; 0 before any delivery.
    pub cursor: i64,
    /// Earliest time the next delivery is permitted, if a window is open.
    pub cooldown_until: Option<DateTime<Utc>>,
}

impl EntitlementRecord {
    pub fn has_quota(&self) -> bool {
        self.remaining_count > 0
    }

    /// Time left in the cooldown window, if the window is still open at `now`.
    pub fn cooldown_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        match self.cooldown_until {
            Some(until) if now < until => Some(until - now),
            _ => None,
        }
    }
}
