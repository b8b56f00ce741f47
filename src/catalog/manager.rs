//! Catalog store - ordered probe files per (subject, tier) partition

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::catalog::types::Item;
use crate::error::{ProbeError, Result};

/// Manages the ordered collection of probe files.
///
/// Ids are assigned by the database at ingestion and strictly increase, so
/// `next_item` walking "smallest id greater than the cursor" visits every
/// item of a partition exactly once per user.
pub struct CatalogManager {
    db: SqlitePool,
}

impl CatalogManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Initialize database tables
    pub async fn init_db(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                subject TEXT NOT NULL,
                tier TEXT NOT NULL,
                label TEXT NOT NULL,
                file_ref TEXT NOT NULL,
                ingested_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_items_partition
            ON items (subject, tier, id)
            "#,
        )
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Append a new item; its id is greater than every existing id.
    pub async fn ingest(
        &self,
        subject: &str,
        tier: &str,
        label: &str,
        file_ref: &str,
    ) -> Result<Item> {
        let ingested_at = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO items (subject, tier, label, file_ref, ingested_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(subject)
        .bind(tier)
        .bind(label)
        .bind(file_ref)
        .bind(ingested_at.to_rfc3339())
        .execute(&self.db)
        .await?;

        let id = result.last_insert_rowid();
        info!(id, subject, tier, label, "ingested catalog item");

        Ok(Item {
            id,
            subject: subject.to_string(),
            tier: tier.to_string(),
            label: label.to_string(),
            file_ref: file_ref.to_string(),
            ingested_at,
        })
    }

    /// The item with the smallest id strictly greater than `after_id`, or
    /// `None` once the partition is exhausted.
    pub async fn next_item(&self, subject: &str, tier: &str, after_id: i64) -> Result<Option<Item>> {
        let row = sqlx::query(
            r#"
            SELECT id, subject, tier, label, file_ref, ingested_at
            FROM items
            WHERE subject = ? AND tier = ? AND id > ?
            ORDER BY id
            LIMIT 1
            "#,
        )
        .bind(subject)
        .bind(tier)
        .bind(after_id)
        .fetch_optional(&self.db)
        .await?;

        row.map(row_to_item).transpose()
    }

    /// A uniformly chosen item for privileged callers; no cursor interaction.
    pub async fn random_item(&self, subject: &str, tier: &str) -> Result<Option<Item>> {
        let row = sqlx::query(
            r#"
            SELECT id, subject, tier, label, file_ref, ingested_at
            FROM items
            WHERE subject = ? AND tier = ?
            ORDER BY RANDOM()
            LIMIT 1
            "#,
        )
        .bind(subject)
        .bind(tier)
        .fetch_optional(&self.db)
        .await?;

        row.map(row_to_item).transpose()
    }

    /// All items of a partition in delivery order (admin view).
    pub async fn list(&self, subject: &str, tier: &str) -> Result<Vec<Item>> {
        let rows = sqlx::query(
            r#"
            SELECT id, subject, tier, label, file_ref, ingested_at
            FROM items
            WHERE subject = ? AND tier = ?
            ORDER BY id
            "#,
        )
        .bind(subject)
        .bind(tier)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(row_to_item).collect()
    }

    /// Number of items in a partition.
    pub async fn count(&self, subject: &str, tier: &str) -> Result<i64> {
        let (count,) = sqlx::query_as::<_, (i64,)>(
            "SELECT COUNT(*) FROM items WHERE subject = ? AND tier = ?",
        )
        .bind(subject)
        .bind(tier)
        .fetch_one(&self.db)
        .await?;

        Ok(count)
    }
}

fn row_to_item(row: SqliteRow) -> Result<Item> {
    let ingested_at_raw: String = row.try_get("ingested_at")?;
    let ingested_at = DateTime::parse_from_rfc3339(&ingested_at_raw)
        .map_err(|e| ProbeError::Config(format!("malformed timestamp in catalog: {}", e)))?
        .with_timezone(&Utc);

    Ok(Item {
        id: row.try_get("id")?,
        subject: row.try_get("subject")?,
        tier: row.try_get("tier")?,
        label: row.try_get("label")?,
        file_ref: row.try_get("file_ref")?,
        ingested_at,
    })
}
