//! Shared fixtures for the engine integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use stockroom_core::{Money, Quantity};
use stockroom_db::{Database, DbConfig, NewVariant};
use stockroom_engine::{RetryPolicy, TransactionCoordinator};
use tempfile::TempDir;

static BARCODES: AtomicU64 = AtomicU64::new(1);

/// Retries quickly and often enough for contended tests.
pub fn test_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 20,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(20),
    }
}

/// Coordinator over a fresh single-connection in-memory database.
pub async fn memory_coordinator() -> TransactionCoordinator {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    TransactionCoordinator::with_sqlite_catalog(db).with_retry_policy(test_retry())
}

/// Coordinator over a file-backed database with a real connection pool.
///
/// Keep the returned `TempDir` alive for the duration of the test.
pub async fn file_coordinator() -> (TempDir, TransactionCoordinator) {
    let dir = tempfile::tempdir().unwrap();
    let config = DbConfig::new(dir.path().join("stockroom.db"))
        .max_connections(8)
        .busy_timeout(Duration::from_secs(10));
    let db = Database::new(config).await.unwrap();
    let coordinator = TransactionCoordinator::with_sqlite_catalog(db)
        .with_retry_policy(test_retry())
        .with_lock_timeout(Duration::from_secs(10));
    (dir, coordinator)
}

/// Inserts a variant with the given id, price and stock.
pub async fn add_variant(coordinator: &TransactionCoordinator, id: &str, price_cents: i64, stock: Quantity) {
    let barcode = format!("200{:010}", BARCODES.fetch_add(1, Ordering::SeqCst));
    coordinator
        .database()
        .variants()
        .insert(
            &NewVariant::new("TEE-CREW", barcode, Money::from_cents(price_cents))
                .with_id(id)
                .stock(stock),
        )
        .await
        .unwrap();
}

pub fn units(n: i64) -> Quantity {
    Quantity::from_units(n)
}

pub fn cents(n: i64) -> Money {
    Money::from_cents(n)
}
