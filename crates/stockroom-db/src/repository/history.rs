//! # History Repository
//!
//! Append-only snapshots of committed aggregates.
//!
//! Each coordinator mutation appends exactly one entry inside its unit of
//! work, so the history holds one row per committed change and never a row
//! for a change that rolled back.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::error::DbResult;
use stockroom_core::{Aggregate, HistoryEntry, HistoryEvent};

/// Repository for aggregate history.
#[derive(Debug, Clone)]
pub struct HistoryRepository {
    pool: SqlitePool,
}

impl HistoryRepository {
    /// Creates a new HistoryRepository.
    pub fn new(pool: SqlitePool) -> Self {
        HistoryRepository { pool }
    }

    /// Appends a snapshot of `aggregate` as it will be after commit.
    pub async fn append(
        conn: &mut SqliteConnection,
        aggregate: &Aggregate,
        event: HistoryEvent,
    ) -> DbResult<HistoryEntry> {
        let entry = HistoryEntry {
            id: Uuid::new_v4().to_string(),
            aggregate_id: aggregate.id.clone(),
            event,
            payload: serde_json::to_string(aggregate)?,
            recorded_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO aggregate_history (id, aggregate_id, event, payload, recorded_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.aggregate_id)
        .bind(entry.event)
        .bind(&entry.payload)
        .bind(entry.recorded_at)
        .execute(&mut *conn)
        .await?;

        Ok(entry)
    }

    /// All entries for an aggregate, oldest first.
    pub async fn for_aggregate(&self, aggregate_id: &str) -> DbResult<Vec<HistoryEntry>> {
        let rows: Vec<HistoryRow> = sqlx::query_as(
            r#"
            SELECT id, aggregate_id, event, payload, recorded_at
            FROM aggregate_history
            WHERE aggregate_id = ?1
            ORDER BY rowid
            "#,
        )
        .bind(aggregate_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(HistoryEntry::from).collect())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct HistoryRow {
    id: String,
    aggregate_id: String,
    event: HistoryEvent,
    payload: String,
    recorded_at: DateTime<Utc>,
}

impl From<HistoryRow> for HistoryEntry {
    fn from(row: HistoryRow) -> Self {
        HistoryEntry {
            id: row.id,
            aggregate_id: row.aggregate_id,
            event: row.event,
            payload: row.payload,
            recorded_at: row.recorded_at,
        }
    }
}
