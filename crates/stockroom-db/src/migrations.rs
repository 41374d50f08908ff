//! # Database Migrations
//!
//! The Stockroom schema, embedded at compile time and applied by
//! [`Database::new`](crate::Database::new) unless
//! `DbConfig::run_migrations(false)` is set.
//!
//! ## What the Schema Enforces
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  variants           available_milli >= 0, unit_price_cents >= 0         │
//! │  aggregates         total_cents >= 0, order_status only on orders       │
//! │  aggregate_lines    quantity_milli > 0, UNIQUE (aggregate_id, position) │
//! │  aggregate_history  append-only snapshots                               │
//! │  stock_movements    append-only journal                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A tripped CHECK surfaces as [`DbError::CheckViolation`](crate::DbError),
//! which the engine reports as an invariant violation.
//!
//! New migrations go in `migrations/sqlite/` as the next `NNN_*.sql`;
//! applied files are never edited.

use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Applies every pending migration in filename order.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    info!(available = MIGRATOR.migrations.len(), "Checking for pending migrations");

    MIGRATOR.run(pool).await?;

    info!("Schema up to date");
    Ok(())
}

/// `(embedded, applied)` migration counts, for diagnostics.
///
/// A database that was never migrated reports zero applied.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<(usize, usize)> {
    let embedded = MIGRATOR.migrations.len();

    let has_table: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_one(pool)
    .await?;
    if has_table == 0 {
        return Ok((embedded, 0));
    }

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
        .fetch_one(pool)
        .await?;

    Ok((embedded, applied as usize))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_status_before_and_after_migrating() {
        let db = Database::new(DbConfig::in_memory().run_migrations(false))
            .await
            .unwrap();
        let (embedded, applied) = migration_status(db.pool()).await.unwrap();
        assert!(embedded >= 1);
        assert_eq!(applied, 0);

        run_migrations(db.pool()).await.unwrap();
        run_migrations(db.pool()).await.unwrap();
        assert_eq!(migration_status(db.pool()).await.unwrap(), (embedded, embedded));
    }

    #[tokio::test]
    async fn test_negative_stock_is_refused_by_schema() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let err = sqlx::query(
            "INSERT INTO variants (id, product_ref, barcode, unit_price_cents, available_milli, created_at, updated_at)
             VALUES ('v-neg', 'TEE', '20000000001', 100, -1, '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
        )
        .execute(db.pool())
        .await
        .map_err(DbError::from)
        .unwrap_err();

        assert!(matches!(err, DbError::CheckViolation { .. }), "{:?}", err);
    }
}
