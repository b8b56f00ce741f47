//! Registration service - first-contact bookkeeping and free-tier seeding

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::config::DeliveryConfig;
use crate::error::{ProbeError, Result};
use crate::ledger::LedgerManager;
use crate::users::types::{UserProfile, UserRecord};

/// Manages the user directory.
///
/// Registration is idempotent: the first contact creates the user row and
/// seeds a free-tier entitlement for every configured subject; later
/// contacts only refresh the display metadata.
pub struct UserManager {
    db: SqlitePool,
    ledger: Arc<LedgerManager>,
    policy: DeliveryConfig,
}

impl UserManager {
    pub fn new(db: SqlitePool, ledger: Arc<LedgerManager>, policy: DeliveryConfig) -> Self {
        Self { db, ledger, policy }
    }

    /// Initialize database tables
    pub async fn init_db(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                user_id INTEGER PRIMARY KEY,
                username TEXT,
                first_name TEXT,
                last_name TEXT,
                joined_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Register the user if this is their first contact.
    ///
    /// Returns `true` for a first-time registration (the transport picks the
    /// welcome message off this).
    pub async fn register_if_absent(&self, profile: &UserProfile) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (user_id, username, first_name, last_name, joined_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(profile.user_id)
        .bind(&profile.username)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.db)
        .await?;

        let first_time = result.rows_affected() > 0;

        if first_time {
            info!(user_id = profile.user_id, "registered new user");
        } else {
            // Display metadata may change between contacts; joined_at never does.
            sqlx::query(
                r#"
                UPDATE users
                SET username = ?, first_name = ?, last_name = ?
                WHERE user_id = ?
                "#,
            )
            .bind(&profile.username)
            .bind(&profile.first_name)
            .bind(&profile.last_name)
            .bind(profile.user_id)
            .execute(&self.db)
            .await?;
        }

        if let Some(free) = self.policy.free_tier_policy() {
            for subject in &self.policy.subjects {
                self.ledger
                    .ensure(profile.user_id, subject, &free.name, free.default_quota)
                    .await?;
            }
        }

        Ok(first_time)
    }

    /// Number of registered users.
    pub async fn count(&self) -> Result<i64> {
        let (count,) = sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.db)
            .await?;

        Ok(count)
    }

    pub async fn get(&self, user_id: i64) -> Result<Option<UserRecord>> {
        let row = sqlx::query(
            r#"
            SELECT user_id, username, first_name, last_name, joined_at
            FROM users
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let joined_at_raw: String = row.try_get("joined_at")?;
        let joined_at = DateTime::parse_from_rfc3339(&joined_at_raw)
            .map_err(|e| ProbeError::Config(format!("malformed timestamp in users: {}", e)))?
            .with_timezone(&Utc);

        Ok(Some(UserRecord {
            user_id: row.try_get("user_id")?,
            username: row.try_get("username")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            joined_at,
        }))
    }
}
