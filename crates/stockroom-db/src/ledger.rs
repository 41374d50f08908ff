//! # Inventory Ledger
//!
//! The single source of truth for sellable quantity per variant.
//!
//! ## Atomic Reserve
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                    Stock Decrement Strategy                         │
//! │                                                                     │
//! │  ❌ WRONG: read, compare, write                                     │
//! │     SELECT available_milli ...      → 1000                          │
//! │     UPDATE ... SET available_milli = 0                              │
//! │     (two requests both read 1000 and both sell the last unit)       │
//! │                                                                     │
//! │  ✅ CORRECT: one conditional decrement                              │
//! │     UPDATE variants                                                 │
//! │     SET available_milli = available_milli - ?2                      │
//! │     WHERE id = ?1 AND available_milli >= ?2                         │
//! │     RETURNING available_milli                                       │
//! │                                                                     │
//! │  No row back → nothing changed → InsufficientStock (or NotFound)    │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every change appends a row to `stock_movements` on the same connection,
//! so the journal commits or rolls back together with the balance.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult, LedgerError, LedgerResult};
use stockroom_core::{MovementReason, Quantity, StockMovement};

/// Reserve/release/restock over the `variants` table.
///
/// Mutating methods take the connection of an open
/// [`UnitOfWork`](crate::UnitOfWork); reads use the pool and never lock.
#[derive(Debug, Clone)]
pub struct InventoryLedger {
    pool: SqlitePool,
}

impl InventoryLedger {
    pub fn new(pool: SqlitePool) -> Self {
        InventoryLedger { pool }
    }

    /// Takes `quantity` out of the variant's available stock.
    ///
    /// ## Returns
    /// The remaining available quantity.
    ///
    /// ## Errors
    /// - `InsufficientStock` when fewer than `quantity` are available;
    ///   nothing is changed
    /// - `VariantNotFound` when the variant does not exist
    /// - `InvalidQuantity` for negative input
    pub async fn reserve(
        &self,
        conn: &mut SqliteConnection,
        variant_id: &str,
        quantity: Quantity,
        aggregate_id: Option<&str>,
    ) -> LedgerResult<Quantity> {
        if quantity.is_negative() {
            return Err(LedgerError::InvalidQuantity {
                variant_id: variant_id.to_string(),
                quantity,
            });
        }
        if quantity.is_zero() {
            return current_balance(conn, variant_id).await;
        }

        let now = Utc::now();
        let remaining: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE variants
            SET
                available_milli = available_milli - ?2,
                updated_at = ?3,
                version = version + 1
            WHERE id = ?1 AND available_milli >= ?2
            RETURNING available_milli
            "#,
        )
        .bind(variant_id)
        .bind(quantity.milli())
        .bind(now)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| invariant_or_storage(variant_id, e.into()))?;

        let Some(remaining) = remaining else {
            let available = current_balance(conn, variant_id).await?;
            debug!(
                variant_id = %variant_id,
                requested = %quantity,
                available = %available,
                "Reservation refused"
            );
            return Err(LedgerError::InsufficientStock {
                variant_id: variant_id.to_string(),
                requested: quantity,
                available,
            });
        };

        let remaining = Quantity::from_milli(remaining);
        record_movement(
            conn,
            variant_id,
            aggregate_id,
            MovementReason::Reserve,
            -quantity,
            remaining,
            now,
        )
        .await?;

        debug!(
            variant_id = %variant_id,
            reserved = %quantity,
            remaining = %remaining,
            "Stock reserved"
        );
        Ok(remaining)
    }

    /// Puts `quantity` back into the variant's available stock.
    ///
    /// Always succeeds for non-negative input. A variant that no longer
    /// exists has nothing to return stock to; that is logged and ignored.
    pub async fn release(
        &self,
        conn: &mut SqliteConnection,
        variant_id: &str,
        quantity: Quantity,
        aggregate_id: Option<&str>,
    ) -> LedgerResult<()> {
        if quantity.is_negative() {
            return Err(LedgerError::InvalidQuantity {
                variant_id: variant_id.to_string(),
                quantity,
            });
        }
        if quantity.is_zero() {
            return Ok(());
        }

        let Some(balance) =
            increase(conn, variant_id, quantity, aggregate_id, MovementReason::Release).await?
        else {
            warn!(
                variant_id = %variant_id,
                quantity = %quantity,
                "Release against missing variant ignored"
            );
            return Ok(());
        };

        debug!(
            variant_id = %variant_id,
            released = %quantity,
            available = %balance,
            "Stock released"
        );
        Ok(())
    }

    /// Adds received stock to a variant in its own transaction.
    ///
    /// ## Returns
    /// The new available quantity.
    pub async fn restock(&self, variant_id: &str, quantity: Quantity) -> LedgerResult<Quantity> {
        if !quantity.is_positive() {
            return Err(LedgerError::InvalidQuantity {
                variant_id: variant_id.to_string(),
                quantity,
            });
        }

        let mut tx = self.pool.begin().await.map_err(DbError::from)?;
        let balance = increase(&mut tx, variant_id, quantity, None, MovementReason::Restock)
            .await?
            .ok_or_else(|| LedgerError::VariantNotFound(variant_id.to_string()))?;
        tx.commit().await.map_err(DbError::from)?;

        debug!(variant_id = %variant_id, quantity = %quantity, available = %balance, "Restocked");
        Ok(balance)
    }

    /// Advisory read of the available quantity. Takes no locks.
    ///
    /// Never use the result to decide whether to sell; [`reserve`](Self::reserve)
    /// makes that decision atomically.
    pub async fn available(&self, variant_id: &str) -> LedgerResult<Quantity> {
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;
        current_balance(&mut conn, variant_id).await
    }

    /// Journal entries for a variant, oldest first.
    pub async fn movements(&self, variant_id: &str) -> DbResult<Vec<StockMovement>> {
        let rows: Vec<MovementRow> = sqlx::query_as(
            r#"
            SELECT id, variant_id, aggregate_id, reason, delta_milli, balance_after, recorded_at
            FROM stock_movements
            WHERE variant_id = ?1
            ORDER BY rowid
            "#,
        )
        .bind(variant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(StockMovement::from).collect())
    }
}

// =============================================================================
// Statement Helpers
// =============================================================================

/// Reads the balance, treating a negative value as a broken invariant.
async fn current_balance(conn: &mut SqliteConnection, variant_id: &str) -> LedgerResult<Quantity> {
    let available: Option<i64> =
        sqlx::query_scalar("SELECT available_milli FROM variants WHERE id = ?1")
            .bind(variant_id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(DbError::from)?;

    match available {
        None => Err(LedgerError::VariantNotFound(variant_id.to_string())),
        Some(milli) if milli < 0 => {
            error!(
                variant_id = %variant_id,
                available_milli = milli,
                "Negative available quantity observed"
            );
            Err(LedgerError::InvariantViolation {
                variant_id: variant_id.to_string(),
                detail: format!("available quantity is {}", Quantity::from_milli(milli)),
            })
        }
        Some(milli) => Ok(Quantity::from_milli(milli)),
    }
}

/// Adds to the balance and journals it. `None` when the variant is missing.
async fn increase(
    conn: &mut SqliteConnection,
    variant_id: &str,
    quantity: Quantity,
    aggregate_id: Option<&str>,
    reason: MovementReason,
) -> LedgerResult<Option<Quantity>> {
    let now = Utc::now();
    let balance: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE variants
        SET
            available_milli = available_milli + ?2,
            updated_at = ?3,
            version = version + 1
        WHERE id = ?1
        RETURNING available_milli
        "#,
    )
    .bind(variant_id)
    .bind(quantity.milli())
    .bind(now)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| invariant_or_storage(variant_id, e.into()))?;

    let Some(balance) = balance.map(Quantity::from_milli) else {
        return Ok(None);
    };

    record_movement(conn, variant_id, aggregate_id, reason, quantity, balance, now).await?;
    Ok(Some(balance))
}

/// Appends one row to the stock journal.
pub(crate) async fn record_movement(
    conn: &mut SqliteConnection,
    variant_id: &str,
    aggregate_id: Option<&str>,
    reason: MovementReason,
    delta: Quantity,
    balance_after: Quantity,
    recorded_at: DateTime<Utc>,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO stock_movements (
            id, variant_id, aggregate_id, reason, delta_milli, balance_after, recorded_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(variant_id)
    .bind(aggregate_id)
    .bind(reason)
    .bind(delta.milli())
    .bind(balance_after.milli())
    .bind(recorded_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// CHECK failures on the variants table mean the balance would go negative.
fn invariant_or_storage(variant_id: &str, err: DbError) -> LedgerError {
    match err {
        DbError::CheckViolation { message } => {
            error!(variant_id = %variant_id, detail = %message, "Inventory CHECK constraint tripped");
            LedgerError::InvariantViolation {
                variant_id: variant_id.to_string(),
                detail: message,
            }
        }
        other => LedgerError::Storage(other),
    }
}

// =============================================================================
// Row Mapping
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct MovementRow {
    id: String,
    variant_id: String,
    aggregate_id: Option<String>,
    reason: MovementReason,
    delta_milli: i64,
    balance_after: i64,
    recorded_at: DateTime<Utc>,
}

impl From<MovementRow> for StockMovement {
    fn from(row: MovementRow) -> Self {
        StockMovement {
            id: row.id,
            variant_id: row.variant_id,
            aggregate_id: row.aggregate_id,
            reason: row.reason,
            delta: Quantity::from_milli(row.delta_milli),
            balance_after: Quantity::from_milli(row.balance_after),
            recorded_at: row.recorded_at,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
