//! # Notification Outbox Repository
//!
//! One event row per committed order, written in the commit transaction.
//!
//! ## The Outbox Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SETTLEMENT COMMIT                                                      │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  ... decrement stock, INSERT order ...                          │   │
//! │  │  INSERT INTO notifications (kind, entity_id, payload)           │   │
//! │  │  VALUES ('ORDER_PLACED', :order_id, <event JSON>)               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼  COMMIT ← order and event exist together or not at all          │
//! │                                                                         │
//! │  SENDER (outside settlement)                                            │
//! │    get_pending(limit) → deliver → mark_delivered / mark_failed          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;

/// A queued notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct NotificationEntry {
    pub id: String,
    pub store_id: String,
    /// Event kind, e.g. `ORDER_PLACED`.
    pub kind: String,
    pub entity_id: String,
    /// JSON event body.
    pub payload: String,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub attempted_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl NotificationEntry {
    pub fn new(
        store_id: &str,
        kind: &str,
        entity_id: &str,
        payload: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        NotificationEntry {
            id: Uuid::new_v4().to_string(),
            store_id: store_id.to_string(),
            kind: kind.to_string(),
            entity_id: entity_id.to_string(),
            payload,
            attempts: 0,
            last_error: None,
            created_at,
            attempted_at: None,
            delivered_at: None,
        }
    }
}

/// Inserts an entry on an existing connection or transaction.
pub(crate) async fn insert_entry(
    conn: &mut SqliteConnection,
    entry: &NotificationEntry,
) -> DbResult<()> {
    debug!(kind = %entry.kind, entity_id = %entry.entity_id, "Queuing notification");

    sqlx::query(
        r#"
        INSERT INTO notifications (
            id, store_id, kind, entity_id, payload,
            attempts, last_error, created_at, attempted_at, delivered_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5,
            ?6, ?7, ?8, ?9, ?10
        )
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.store_id)
    .bind(&entry.kind)
    .bind(&entry.entity_id)
    .bind(&entry.payload)
    .bind(entry.attempts)
    .bind(&entry.last_error)
    .bind(entry.created_at)
    .bind(entry.attempted_at)
    .bind(entry.delivered_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Repository for the notification outbox.
#[derive(Debug, Clone)]
pub struct NotificationRepository {
    pool: SqlitePool,
}

impl NotificationRepository {
    /// Creates a new NotificationRepository.
    pub fn new(pool: SqlitePool) -> Self {
        NotificationRepository { pool }
    }

    /// Undelivered entries, oldest first.
    pub async fn get_pending(&self, limit: u32) -> DbResult<Vec<NotificationEntry>> {
        let entries: Vec<NotificationEntry> = sqlx::query_as(
            r#"
            SELECT
                id, store_id, kind, entity_id, payload,
                attempts, last_error, created_at, attempted_at, delivered_at
            FROM notifications
            WHERE delivered_at IS NULL
            ORDER BY created_at ASC
            LIMIT ?1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// All entries for one entity (an order id), oldest first.
    pub async fn for_entity(&self, entity_id: &str) -> DbResult<Vec<NotificationEntry>> {
        let entries: Vec<NotificationEntry> = sqlx::query_as(
            r#"
            SELECT
                id, store_id, kind, entity_id, payload,
                attempts, last_error, created_at, attempted_at, delivered_at
            FROM notifications
            WHERE entity_id = ?1
            ORDER BY created_at ASC
            "#,
        )
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    pub async fn mark_delivered(&self, id: &str) -> DbResult<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE notifications SET
                delivered_at = ?2,
                attempted_at = ?2
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Records a failed delivery attempt.
    pub async fn mark_failed(&self, id: &str, error: &str) -> DbResult<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE notifications SET
                attempts = attempts + 1,
                last_error = ?2,
                attempted_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE delivered_at IS NULL")
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_outbox_lifecycle() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.catalog().insert_store("s1", "Shop", "EUR").await.unwrap();

        let entry = NotificationEntry::new("s1", "ORDER_PLACED", "o1", "{}".to_string(), Utc::now());
        {
            let mut conn = db.pool().acquire().await.unwrap();
            insert_entry(&mut conn, &entry).await.unwrap();
        }

        let repo = db.notifications();
        assert_eq!(repo.count_pending().await.unwrap(), 1);

        repo.mark_failed(&entry.id, "smtp timeout").await.unwrap();
        let pending = repo.get_pending(10).await.unwrap();
        assert_eq!(pending[0].attempts, 1);
        assert_eq!(pending[0].last_error.as_deref(), Some("smtp timeout"));

        repo.mark_delivered(&entry.id).await.unwrap();
        assert_eq!(repo.count_pending().await.unwrap(), 0);
        assert_eq!(repo.for_entity("o1").await.unwrap().len(), 1);
    }
}
