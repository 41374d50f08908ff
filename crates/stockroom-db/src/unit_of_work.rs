//! # Unit of Work
//!
//! One SQLite transaction scoped to a single coordinator call.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  db.begin()                                                             │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  UnitOfWork ──► ledger.reserve(&mut uow, ...)                           │
//! │     │       ──► AggregateRepository::insert(uow.conn(), ...)            │
//! │     │       ──► HistoryRepository::append(uow.conn(), ...)              │
//! │     │                                                                   │
//! │     ├── commit()    → all writes become visible together                │
//! │     ├── rollback()  → none of them happened                             │
//! │     └── dropped     → same as rollback (future cancelled mid-flight)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! SQLite takes the write lock at the first write statement, so every
//! coordinator call makes a conditional write its first statement. A
//! transaction that reads first and upgrades later can fail with
//! `SQLITE_BUSY`, which surfaces as [`DbError::Busy`] and is retried.

use sqlx::{Sqlite, SqliteConnection, Transaction};
use tracing::debug;

use crate::error::{DbError, DbResult};

/// An open storage transaction.
///
/// Repository and ledger functions that must run inside the transaction take
/// `&mut SqliteConnection`, obtained from [`UnitOfWork::conn`].
pub struct UnitOfWork {
    tx: Transaction<'static, Sqlite>,
}

impl UnitOfWork {
    pub(crate) fn new(tx: Transaction<'static, Sqlite>) -> Self {
        UnitOfWork { tx }
    }

    /// The connection the transaction runs on.
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut *self.tx
    }

    /// Commits every write made through this unit of work.
    pub async fn commit(self) -> DbResult<()> {
        self.tx.commit().await.map_err(|e| match DbError::from(e) {
            busy @ DbError::Busy(_) => busy,
            other => DbError::TransactionFailed(other.to_string()),
        })?;
        debug!("Unit of work committed");
        Ok(())
    }

    /// Discards every write made through this unit of work.
    pub async fn rollback(self) -> DbResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;
        debug!("Unit of work rolled back");
        Ok(())
    }
}

impl std::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork").finish_non_exhaustive()
    }
}
