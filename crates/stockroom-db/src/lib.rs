//! # stockroom-db: Database Layer for Stockroom
//!
//! SQLite storage for variants, orders and sales, plus the inventory ledger
//! that owns every change to available stock.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stockroom Data Flow                              │
//! │                                                                         │
//! │  TransactionCoordinator (stockroom-engine)                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   stockroom-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐  ┌───────────────┐  ┌───────────────────┐  │   │
//! │  │   │   Database    │  │ InventoryLedger│  │   Repositories    │  │   │
//! │  │   │   (pool.rs)   │  │  (ledger.rs)   │  │  variant          │  │   │
//! │  │   │               │  │                │  │  aggregate        │  │   │
//! │  │   │ SqlitePool    │  │ reserve        │  │  history          │  │   │
//! │  │   │ UnitOfWork    │◄─│ release        │  │                   │  │   │
//! │  │   │ migrations    │  │ restock        │  │                   │  │   │
//! │  │   └───────────────┘  └───────────────┘  └───────────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite (WAL mode)                           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`pool`] - Connection pool and configuration
//! - [`unit_of_work`] - One transaction per coordinator call
//! - [`ledger`] - Atomic reserve/release over variant stock
//! - [`migrations`] - Embedded schema migrations
//! - [`error`] - Database error types
//! - [`repository`] - Variant, aggregate and history repositories
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stockroom_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/stockroom.db")).await?;
//!
//! let mut uow = db.begin().await?;
//! let remaining = db.ledger().reserve(uow.conn(), &variant_id, qty, None).await?;
//! uow.commit().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod ledger;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod unit_of_work;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult, LedgerError, LedgerResult};
pub use ledger::InventoryLedger;
pub use pool::{Database, DbConfig};
pub use unit_of_work::UnitOfWork;

// Repository re-exports for convenience
pub use repository::aggregate::{generate_aggregate_id, generate_line_id, AggregateRepository};
pub use repository::history::HistoryRepository;
pub use repository::variant::{NewVariant, VariantRepository};
