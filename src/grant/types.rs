use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Acknowledgement returned to the administrator after a grant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrantReceipt {
    pub user_id: i64,
    pub subject: String,
    pub tier: String,
    pub granted: i64,
    pub remaining_count: i64,
}

/// Notification queued for the transport layer to deliver to the user.
#[derive(Debug, Clone, Serialize)]
pub struct GrantNotice {
    pub id: Uuid,
    pub user_id: i64,
    pub subject: String,
    pub tier: String,
    pub granted: i64,
    pub remaining_count: i64,
    pub created_at: DateTime<Utc>,
}
