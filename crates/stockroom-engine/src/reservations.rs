//! # Reservation Log
//!
//! Records every ledger change a coordinator call makes so a failed call
//! can undo them, newest first, before its unit of work rolls back.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create([A×2, B×1, C×4])                                                │
//! │                                                                         │
//! │  reserve A 2   ─► log: [Reserved(A,2)]                                  │
//! │  reserve B 1   ─► log: [Reserved(A,2), Reserved(B,1)]                   │
//! │  reserve C 4   ✗ InsufficientStock                                      │
//! │                                                                         │
//! │  undo:  release B 1, release A 2   (reverse order)                      │
//! │  then:  rollback                                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A variant swap logs `Released(old)` before reserving the new variant; if
//! that reservation fails, undo re-reserves the old quantity.

use sqlx::SqliteConnection;
use stockroom_core::Quantity;
use stockroom_db::{InventoryLedger, LedgerResult};
use tracing::{debug, error};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Change {
    Reserved { variant_id: String, quantity: Quantity },
    Released { variant_id: String, quantity: Quantity },
}

/// Ledger changes made so far by one coordinator call.
#[derive(Debug)]
pub(crate) struct ReservationLog {
    aggregate_id: String,
    changes: Vec<Change>,
}

impl ReservationLog {
    pub(crate) fn new(aggregate_id: impl Into<String>) -> Self {
        ReservationLog {
            aggregate_id: aggregate_id.into(),
            changes: Vec::new(),
        }
    }

    /// Reserves and records the reservation.
    pub(crate) async fn reserve(
        &mut self,
        ledger: &InventoryLedger,
        conn: &mut SqliteConnection,
        variant_id: &str,
        quantity: Quantity,
    ) -> LedgerResult<Quantity> {
        let remaining = ledger
            .reserve(conn, variant_id, quantity, Some(&self.aggregate_id))
            .await?;
        self.changes.push(Change::Reserved {
            variant_id: variant_id.to_string(),
            quantity,
        });
        Ok(remaining)
    }

    /// Releases and records the release.
    pub(crate) async fn release(
        &mut self,
        ledger: &InventoryLedger,
        conn: &mut SqliteConnection,
        variant_id: &str,
        quantity: Quantity,
    ) -> LedgerResult<()> {
        ledger
            .release(conn, variant_id, quantity, Some(&self.aggregate_id))
            .await?;
        self.changes.push(Change::Released {
            variant_id: variant_id.to_string(),
            quantity,
        });
        Ok(())
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Reverses every recorded change, newest first.
    ///
    /// Keeps going after a failed step so as much as possible is restored;
    /// the first failure is returned.
    pub(crate) async fn undo(
        self,
        ledger: &InventoryLedger,
        conn: &mut SqliteConnection,
    ) -> LedgerResult<()> {
        let mut first_err = None;
        let steps = self.changes.len();

        for change in self.changes.into_iter().rev() {
            let result = match &change {
                Change::Reserved { variant_id, quantity } => {
                    ledger
                        .release(conn, variant_id, *quantity, Some(&self.aggregate_id))
                        .await
                }
                Change::Released { variant_id, quantity } => ledger
                    .reserve(conn, variant_id, *quantity, Some(&self.aggregate_id))
                    .await
                    .map(|_| ()),
            };

            if let Err(e) = result {
                error!(
                    aggregate_id = %self.aggregate_id,
                    change = ?change,
                    error = %e,
                    "Compensation step failed"
                );
                first_err.get_or_insert(e);
            }
        }

        debug!(aggregate_id = %self.aggregate_id, steps, "Compensation finished");
        first_err.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockroom_core::Money;
    use stockroom_db::{Database, DbConfig, NewVariant};

    async fn setup() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        for (id, barcode, units) in [("v-a", "2000000000017", 5), ("v-b", "2000000000024", 2)] {
            db.variants()
                .insert(
                    &NewVariant::new("TEE-CREW", barcode, Money::from_cents(1000))
                        .with_id(id)
                        .stock(Quantity::from_units(units)),
                )
                .await
                .unwrap();
        }
        db
    }

    #[tokio::test]
    async fn test_undo_restores_balances() {
        let db = setup().await;
        let ledger = db.ledger();

        let mut uow = db.begin().await.unwrap();
        let mut log = ReservationLog::new("agg-1");
        log.reserve(&ledger, uow.conn(), "v-a", Quantity::from_units(3))
            .await
            .unwrap();
        log.release(&ledger, uow.conn(), "v-b", Quantity::from_units(1))
            .await
            .unwrap();
        assert!(!log.is_empty());

        log.undo(&ledger, uow.conn()).await.unwrap();
        uow.commit().await.unwrap();

        assert_eq!(ledger.available("v-a").await.unwrap(), Quantity::from_units(5));
        assert_eq!(ledger.available("v-b").await.unwrap(), Quantity::from_units(2));
    }

    #[tokio::test]
    async fn test_failed_reserve_is_not_logged() {
        let db = setup().await;
        let ledger = db.ledger();

        let mut uow = db.begin().await.unwrap();
        let mut log = ReservationLog::new("agg-1");
        assert!(log
            .reserve(&ledger, uow.conn(), "v-b", Quantity::from_units(9))
            .await
            .is_err());
        assert!(log.is_empty());
        uow.rollback().await.unwrap();
    }
}
