//! Entitlement ledger - the single shared mutable resource of the engine

use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{ProbeError, Result};
use crate::ledger::types::{CooldownScope, EntitlementRecord};

/// Manages durable per-(user, subject, tier) entitlement records.
///
/// All admission-relevant writes re-validate their preconditions at commit
/// time, so concurrent requests for the same key cannot double-spend a quota
/// or re-deliver an item.
pub struct LedgerManager {
    db: SqlitePool,
    scope: CooldownScope,
}

impl LedgerManager {
    pub fn new(db: SqlitePool, scope: CooldownScope) -> Self {
        Self { db, scope }
    }

    /// Initialize database tables
    pub async fn init_db(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entitlements (
                user_id INTEGER NOT NULL,
                subject TEXT NOT NULL,
                tier TEXT NOT NULL,
                remaining_count INTEGER NOT NULL DEFAULT 0,
                cursor INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (user_id, subject, tier)
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cooldowns (
                user_id INTEGER NOT NULL,
                subject TEXT NOT NULL,
                scope_key TEXT NOT NULL,
                next_time TEXT NOT NULL,
                PRIMARY KEY (user_id, subject, scope_key)
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Create a record with the given starting quota if none exists.
    ///
    /// Idempotent; an existing record is left untouched.
    pub async fn ensure(
        &self,
        user_id: i64,
        subject: &str,
        tier: &str,
        default_quota: i64,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO entitlements (user_id, subject, tier, remaining_count, cursor, created_at, updated_at)
            VALUES (?, ?, ?, ?, 0, ?, ?)
            ON CONFLICT (user_id, subject, tier) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(subject)
        .bind(tier)
        .bind(default_quota.max(0))
        .bind(&now)
        .bind(&now)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Read the current record, with the cooldown deadline the configured
    /// scope assigns to this tier. No side effects.
    pub async fn read(
        &self,
        user_id: i64,
        subject: &str,
        tier: &str,
    ) -> Result<Option<EntitlementRecord>> {
        let row = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT remaining_count, cursor
            FROM entitlements
            WHERE user_id = ? AND subject = ? AND tier = ?
            "#,
        )
        .bind(user_id)
        .bind(subject)
        .bind(tier)
        .fetch_optional(&self.db)
        .await?;

        let Some((remaining_count, cursor)) = row else {
            return Ok(None);
        };

        let cooldown_until = self.cooldown_deadline(user_id, subject, tier).await?;

        Ok(Some(EntitlementRecord {
            user_id,
            subject: subject.to_string(),
            tier: tier.to_string(),
            remaining_count,
            cursor,
            cooldown_until,
        }))
    }

    /// Cooldown deadline for this (user, subject, tier) under the configured
    /// scope, whether or not an entitlement record exists.
    pub async fn cooldown_deadline(
        &self,
        user_id: i64,
        subject: &str,
        tier: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query_as::<_, (String,)>(
            r#"
            SELECT next_time FROM cooldowns
            WHERE user_id = ? AND subject = ? AND scope_key = ?
            "#,
        )
        .bind(user_id)
        .bind(subject)
        .bind(self.scope.key(tier))
        .fetch_optional(&self.db)
        .await?;

        match row {
            Some((raw,)) => Ok(Some(parse_timestamp(&raw)?)),
            None => Ok(None),
        }
    }

    /// Atomically add `delta` (> 0) to the remaining quota, creating the
    /// record if absent. Returns the new remaining count.
    pub async fn grant(&self, user_id: i64, subject: &str, tier: &str, delta: i64) -> Result<i64> {
        if delta <= 0 {
            return Err(ProbeError::InvalidArgument(format!(
                "grant delta must be positive, got {}",
                delta
            )));
        }

        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO entitlements (user_id, subject, tier, remaining_count, cursor, created_at, updated_at)
            VALUES (?, ?, ?, ?, 0, ?, ?)
            ON CONFLICT (user_id, subject, tier) DO UPDATE SET
                remaining_count = remaining_count + excluded.remaining_count,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(subject)
        .bind(tier)
        .bind(delta)
        .bind(&now)
        .bind(&now)
        .execute(&self.db)
        .await?;

        let (remaining_count,) = sqlx::query_as::<_, (i64,)>(
            r#"
            SELECT remaining_count FROM entitlements
            WHERE user_id = ? AND subject = ? AND tier = ?
            "#,
        )
        .bind(user_id)
        .bind(subject)
        .bind(tier)
        .fetch_one(&self.db)
        .await?;

        Ok(remaining_count)
    }

    /// Commit one delivery: spend one unit of quota, advance the cursor to
    /// `item_id` and push the cooldown deadline to `now + cooldown`.
    ///
    /// The decrement and cursor advance are guarded by
    /// `remaining_count > 0 AND cursor < item_id` inside the same
    /// transaction, so a request that lost a race against a concurrent
    /// commit fails with [`ProbeError::PreconditionFailed`] instead of
    /// over-spending or re-delivering.
    pub async fn commit_delivery(
        &self,
        user_id: i64,
        subject: &str,
        tier: &str,
        item_id: i64,
        cooldown: Duration,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.db.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE entitlements
            SET remaining_count = remaining_count - 1,
                cursor = ?,
                updated_at = ?
            WHERE user_id = ? AND subject = ? AND tier = ?
              AND remaining_count > 0
              AND cursor < ?
            "#,
        )
        .bind(item_id)
        .bind(now.to_rfc3339())
        .bind(user_id)
        .bind(subject)
        .bind(tier)
        .bind(item_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            debug!(
                user_id,
                subject, tier, item_id, "delivery commit lost its preconditions"
            );
            return Err(ProbeError::PreconditionFailed);
        }

        // Forward-only cooldown: never pull an existing deadline back.
        let scope_key = self.scope.key(tier);
        let candidate = now + cooldown;

        let existing = sqlx::query_as::<_, (String,)>(
            r#"
            SELECT next_time FROM cooldowns
            WHERE user_id = ? AND subject = ? AND scope_key = ?
            "#,
        )
        .bind(user_id)
        .bind(subject)
        .bind(scope_key)
        .fetch_optional(&mut *tx)
        .await?;

        let next_time = match existing {
            Some((raw,)) => {
                let current = parse_timestamp(&raw)?;
                current.max(candidate)
            }
            None => candidate,
        };

        sqlx::query(
            r#"
            INSERT INTO cooldowns (user_id, subject, scope_key, next_time)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (user_id, subject, scope_key) DO UPDATE SET
                next_time = excluded.next_time
            "#,
        )
        .bind(user_id)
        .bind(subject)
        .bind(scope_key)
        .bind(next_time.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| ProbeError::Config(format!("malformed timestamp in ledger: {}", e)))
}
