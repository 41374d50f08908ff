//! # Aggregate Repository
//!
//! Storage for order and sale headers and their lines.
//!
//! ## Two Access Paths
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Pool reads (&self)                 Unit-of-work writes (conn)          │
//! │  ──────────────────────────         ─────────────────────────────────   │
//! │  get_by_id()                        claim()          ← first write      │
//! │  list_for_customer()                insert()                            │
//! │                                     insert_line() / update_line()       │
//! │  One read transaction per call:     delete_line()                       │
//! │  header + lines share a snapshot.   write_header() / mark_cancelled()   │
//! │                                     load()                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Optimistic Claim
//! Every mutation of an existing aggregate starts with [`claim`], which bumps
//! `version` only if it still equals the version the caller read. A concurrent
//! writer that got there first turns the second claim into
//! [`DbError::Conflict`], and the coordinator retries from a fresh read.
//!
//! [`claim`]: AggregateRepository::claim

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use stockroom_core::{
    Aggregate, AggregateKind, AggregateLine, DeliveryInfo, Money, OrderStatus, Quantity,
    TransactionState,
};

const HEADER_COLUMNS: &str = r#"
    id, kind, customer_ref, delivery_address, delivery_phone, delivery_notes,
    state, order_status, total_cents, created_at, updated_at, cancelled_at, version
"#;

const LINE_COLUMNS: &str = r#"
    id, aggregate_id, variant_id, position, quantity_milli,
    unit_price_cents, line_total_cents, created_at, updated_at
"#;

/// Repository for order/sale database operations.
#[derive(Debug, Clone)]
pub struct AggregateRepository {
    pool: SqlitePool,
}

impl AggregateRepository {
    /// Creates a new AggregateRepository.
    pub fn new(pool: SqlitePool) -> Self {
        AggregateRepository { pool }
    }

    // =========================================================================
    // Pool Reads
    // =========================================================================

    /// Gets the last committed state of an aggregate.
    ///
    /// Header and lines are read in one read transaction, so both come
    /// from the same committed snapshot.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Aggregate>> {
        let mut tx = self.pool.begin().await?;
        let aggregate = Self::load(&mut tx, id).await?;
        tx.commit().await?;
        Ok(aggregate)
    }

    /// Aggregates for one customer, newest first.
    pub async fn list_for_customer(
        &self,
        customer_ref: &str,
        limit: u32,
    ) -> DbResult<Vec<Aggregate>> {
        let mut tx = self.pool.begin().await?;

        let headers: Vec<HeaderRow> = sqlx::query_as(&format!(
            "SELECT {HEADER_COLUMNS} FROM aggregates
             WHERE customer_ref = ?1
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?2"
        ))
        .bind(customer_ref)
        .bind(limit)
        .fetch_all(&mut *tx)
        .await?;

        let mut aggregates = Vec::with_capacity(headers.len());
        for header in headers {
            let lines = fetch_lines(&mut tx, &header.id).await?;
            aggregates.push(header.into_aggregate(lines));
        }
        tx.commit().await?;

        Ok(aggregates)
    }

    /// Number of aggregates of a kind (for diagnostics).
    pub async fn count(&self, kind: AggregateKind) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM aggregates WHERE kind = ?1")
            .bind(kind)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    // =========================================================================
    // Unit-of-Work Operations
    // =========================================================================

    /// Loads header and lines on the given connection.
    pub async fn load(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Aggregate>> {
        let header: Option<HeaderRow> = sqlx::query_as(&format!(
            "SELECT {HEADER_COLUMNS} FROM aggregates WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        let Some(header) = header else {
            return Ok(None);
        };

        let lines = fetch_lines(conn, id).await?;
        Ok(Some(header.into_aggregate(lines)))
    }

    /// Inserts a new header and all of its lines.
    pub async fn insert(conn: &mut SqliteConnection, aggregate: &Aggregate) -> DbResult<()> {
        debug!(id = %aggregate.id, kind = %aggregate.kind, lines = aggregate.lines.len(), "Inserting aggregate");

        let delivery = aggregate.delivery.as_ref();
        sqlx::query(&format!(
            "INSERT INTO aggregates ({HEADER_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
        ))
        .bind(&aggregate.id)
        .bind(aggregate.kind)
        .bind(&aggregate.customer_ref)
        .bind(delivery.map(|d| d.address.as_str()))
        .bind(delivery.and_then(|d| d.phone.as_deref()))
        .bind(delivery.and_then(|d| d.notes.as_deref()))
        .bind(aggregate.state)
        .bind(aggregate.order_status)
        .bind(aggregate.total.cents())
        .bind(aggregate.created_at)
        .bind(aggregate.updated_at)
        .bind(aggregate.cancelled_at)
        .bind(aggregate.version)
        .execute(&mut *conn)
        .await?;

        for line in &aggregate.lines {
            Self::insert_line(conn, &aggregate.id, line).await?;
        }

        Ok(())
    }

    /// Bumps `version` if it still equals `expected_version` and the
    /// aggregate is not cancelled.
    ///
    /// ## Errors
    /// `Conflict` when another writer committed first or cancelled it.
    pub async fn claim(
        conn: &mut SqliteConnection,
        id: &str,
        expected_version: i64,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE aggregates
            SET version = version + 1, updated_at = ?3
            WHERE id = ?1 AND version = ?2 AND state != 'cancelled'
            "#,
        )
        .bind(id)
        .bind(expected_version)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            debug!(id = %id, expected_version, "Aggregate claim lost");
            return Err(DbError::conflict("Aggregate", id));
        }

        Ok(())
    }

    /// Writes state, status, total and timestamps. `version` is left alone;
    /// [`claim`](Self::claim) already moved it.
    pub async fn write_header(conn: &mut SqliteConnection, aggregate: &Aggregate) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE aggregates
            SET state = ?2, order_status = ?3, total_cents = ?4,
                updated_at = ?5, cancelled_at = ?6
            WHERE id = ?1
            "#,
        )
        .bind(&aggregate.id)
        .bind(aggregate.state)
        .bind(aggregate.order_status)
        .bind(aggregate.total.cents())
        .bind(aggregate.updated_at)
        .bind(aggregate.cancelled_at)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Aggregate", &aggregate.id));
        }

        Ok(())
    }

    /// Flips the aggregate to cancelled unless it already is.
    ///
    /// ## Returns
    /// `true` if this call did the cancelling, `false` if it was already
    /// cancelled (or does not exist).
    pub async fn mark_cancelled(
        conn: &mut SqliteConnection,
        id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE aggregates
            SET state = 'cancelled',
                order_status = CASE WHEN kind = 'order' THEN 'cancelled' ELSE NULL END,
                cancelled_at = ?2,
                updated_at = ?2,
                version = version + 1
            WHERE id = ?1 AND state != 'cancelled'
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Inserts one line.
    pub async fn insert_line(
        conn: &mut SqliteConnection,
        aggregate_id: &str,
        line: &AggregateLine,
    ) -> DbResult<()> {
        sqlx::query(&format!(
            "INSERT INTO aggregate_lines ({LINE_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
        ))
        .bind(&line.id)
        .bind(aggregate_id)
        .bind(&line.variant_id)
        .bind(line.position)
        .bind(line.quantity.milli())
        .bind(line.unit_price.cents())
        .bind(line.line_total.cents())
        .bind(line.created_at)
        .bind(line.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Rewrites variant, quantity, price snapshot and total of one line.
    pub async fn update_line(
        conn: &mut SqliteConnection,
        aggregate_id: &str,
        line: &AggregateLine,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE aggregate_lines
            SET variant_id = ?3, quantity_milli = ?4, unit_price_cents = ?5,
                line_total_cents = ?6, updated_at = ?7
            WHERE id = ?1 AND aggregate_id = ?2
            "#,
        )
        .bind(&line.id)
        .bind(aggregate_id)
        .bind(&line.variant_id)
        .bind(line.quantity.milli())
        .bind(line.unit_price.cents())
        .bind(line.line_total.cents())
        .bind(line.updated_at)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Line", &line.id));
        }

        Ok(())
    }

    /// Deletes one line.
    pub async fn delete_line(
        conn: &mut SqliteConnection,
        aggregate_id: &str,
        line_id: &str,
    ) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM aggregate_lines WHERE id = ?1 AND aggregate_id = ?2")
            .bind(line_id)
            .bind(aggregate_id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Line", line_id));
        }

        Ok(())
    }
}

/// Helper to generate a new aggregate ID.
pub fn generate_aggregate_id() -> String {
    Uuid::new_v4().to_string()
}

/// Helper to generate a new line ID.
pub fn generate_line_id() -> String {
    Uuid::new_v4().to_string()
}

async fn fetch_lines(conn: &mut SqliteConnection, aggregate_id: &str) -> DbResult<Vec<AggregateLine>> {
    let rows: Vec<LineRow> = sqlx::query_as(&format!(
        "SELECT {LINE_COLUMNS} FROM aggregate_lines WHERE aggregate_id = ?1 ORDER BY position"
    ))
    .bind(aggregate_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(AggregateLine::from).collect())
}

// =============================================================================
// Row Mapping
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct HeaderRow {
    id: String,
    kind: AggregateKind,
    customer_ref: Option<String>,
    delivery_address: Option<String>,
    delivery_phone: Option<String>,
    delivery_notes: Option<String>,
    state: TransactionState,
    order_status: Option<OrderStatus>,
    total_cents: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    cancelled_at: Option<DateTime<Utc>>,
    version: i64,
}

impl HeaderRow {
    fn into_aggregate(self, lines: Vec<AggregateLine>) -> Aggregate {
        let delivery = self.delivery_address.map(|address| DeliveryInfo {
            address,
            phone: self.delivery_phone,
            notes: self.delivery_notes,
        });

        Aggregate {
            id: self.id,
            kind: self.kind,
            customer_ref: self.customer_ref,
            delivery,
            state: self.state,
            order_status: self.order_status,
            total: Money::from_cents(self.total_cents),
            created_at: self.created_at,
            updated_at: self.updated_at,
            cancelled_at: self.cancelled_at,
            version: self.version,
            lines,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LineRow {
    id: String,
    #[allow(dead_code)]
    aggregate_id: String,
    variant_id: String,
    position: i64,
    quantity_milli: i64,
    unit_price_cents: i64,
    line_total_cents: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<LineRow> for AggregateLine {
    fn from(row: LineRow) -> Self {
        AggregateLine {
            id: row.id,
            variant_id: row.variant_id,
            position: row.position,
            quantity: Quantity::from_milli(row.quantity_milli),
            unit_price: Money::from_cents(row.unit_price_cents),
            line_total: Money::from_cents(row.line_total_cents),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::variant::NewVariant;
    use crate::{Database, DbConfig};

    async fn setup() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.variants()
            .insert(&NewVariant::new("TSHIRT", "40063813", Money::from_cents(1000)).with_id("v-1"))
            .await
            .unwrap();
        db
    }

    fn order(id: &str) -> Aggregate {
        let now = Utc::now();
        Aggregate {
            id: id.to_string(),
            kind: AggregateKind::Order,
            customer_ref: Some("cust-7".to_string()),
            delivery: Some(DeliveryInfo {
                address: "1 Loom Lane".to_string(),
                phone: None,
                notes: Some("ring twice".to_string()),
            }),
            state: TransactionState::Committed,
            order_status: Some(OrderStatus::Pending),
            total: Money::from_cents(2000),
            created_at: now,
            updated_at: now,
            cancelled_at: None,
            version: 0,
            lines: vec![AggregateLine {
                id: "l-1".to_string(),
                variant_id: "v-1".to_string(),
                position: 0,
                quantity: Quantity::from_units(2),
                unit_price: Money::from_cents(1000),
                line_total: Money::from_cents(2000),
                created_at: now,
                updated_at: now,
            }],
        }
    }

    #[tokio::test]
    async fn test_insert_and_load_roundtrip() {
        let db = setup().await;
        let agg = order("a-1");

        let mut uow = db.begin().await.unwrap();
        AggregateRepository::insert(uow.conn(), &agg).await.unwrap();
        uow.commit().await.unwrap();

        let loaded = db.aggregates().get_by_id("a-1").await.unwrap().unwrap();
        assert_eq!(loaded.kind, AggregateKind::Order);
        assert_eq!(loaded.delivery, agg.delivery);
        assert_eq!(loaded.lines.len(), 1);
        assert_eq!(loaded.lines[0].quantity, Quantity::from_units(2));
        assert_eq!(loaded.total, Money::from_cents(2000));

        let listed = db.aggregates().list_for_customer("cust-7", 10).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(db.aggregates().count(AggregateKind::Order).await.unwrap(), 1);
        assert_eq!(db.aggregates().count(AggregateKind::Sale).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_claim_detects_stale_version() {
        let db = setup().await;
        let mut uow = db.begin().await.unwrap();
        AggregateRepository::insert(uow.conn(), &order("a-1")).await.unwrap();
        uow.commit().await.unwrap();

        let mut uow = db.begin().await.unwrap();
        AggregateRepository::claim(uow.conn(), "a-1", 0, Utc::now())
            .await
            .unwrap();
        let err = AggregateRepository::claim(uow.conn(), "a-1", 0, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict { .. }));
        uow.commit().await.unwrap();

        let loaded = db.aggregates().get_by_id("a-1").await.unwrap().unwrap();
        assert_eq!(loaded.version, 1);
    }

    #[tokio::test]
    async fn test_mark_cancelled_only_once() {
        let db = setup().await;
        let mut uow = db.begin().await.unwrap();
        AggregateRepository::insert(uow.conn(), &order("a-1")).await.unwrap();

        assert!(AggregateRepository::mark_cancelled(uow.conn(), "a-1", Utc::now())
            .await
            .unwrap());
        assert!(!AggregateRepository::mark_cancelled(uow.conn(), "a-1", Utc::now())
            .await
            .unwrap());
        uow.commit().await.unwrap();

        let loaded = db.aggregates().get_by_id("a-1").await.unwrap().unwrap();
        assert_eq!(loaded.state, TransactionState::Cancelled);
        assert_eq!(loaded.order_status, Some(OrderStatus::Cancelled));
        assert!(loaded.cancelled_at.is_some());

        // Cancelled aggregates cannot be claimed
        let mut uow = db.begin().await.unwrap();
        assert!(AggregateRepository::claim(uow.conn(), "a-1", loaded.version, Utc::now())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_line_update_and_delete() {
        let db = setup().await;
        let agg = order("a-1");
        let mut uow = db.begin().await.unwrap();
        AggregateRepository::insert(uow.conn(), &agg).await.unwrap();

        let mut line = agg.lines[0].clone();
        line.quantity = Quantity::from_units(1);
        line.line_total = Money::from_cents(1000);
        AggregateRepository::update_line(uow.conn(), "a-1", &line)
            .await
            .unwrap();

        let loaded = AggregateRepository::load(uow.conn(), "a-1").await.unwrap().unwrap();
        assert_eq!(loaded.lines[0].quantity, Quantity::from_units(1));

        AggregateRepository::delete_line(uow.conn(), "a-1", "l-1")
            .await
            .unwrap();
        assert!(matches!(
            AggregateRepository::delete_line(uow.conn(), "a-1", "l-1").await,
            Err(DbError::NotFound { .. })
        ));
        uow.commit().await.unwrap();

        let loaded = db.aggregates().get_by_id("a-1").await.unwrap().unwrap();
        assert!(loaded.lines.is_empty());
    }

    #[tokio::test]
    async fn test_line_with_unknown_variant_rejected() {
        let db = setup().await;
        let mut agg = order("a-1");
        agg.lines[0].variant_id = "ghost".to_string();

        let mut uow = db.begin().await.unwrap();
        let err = AggregateRepository::insert(uow.conn(), &agg).await.unwrap_err();
        assert!(matches!(err, DbError::ForeignKeyViolation { .. }));
    }
}
