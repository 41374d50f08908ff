//! # Repository Module
//!
//! Database repository implementations for Stockroom.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  TransactionCoordinator                                                 │
//! │       │                                                                 │
//! │       │  db.aggregates().get_by_id(id)           (pool, committed)      │
//! │       │  AggregateRepository::insert(uow.conn(), &agg)   (in a tx)      │
//! │       ▼                                                                 │
//! │  VariantRepository      AggregateRepository      HistoryRepository      │
//! │  ├── insert             ├── get_by_id / load     ├── append             │
//! │  ├── get_by_id          ├── claim                └── for_aggregate      │
//! │  ├── get_by_barcode     ├── insert / *_line                             │
//! │  └── set_price          └── write_header / mark_cancelled               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Reads that take `&self` use the pool and see committed data only.
//! Associated functions that take `&mut SqliteConnection` run inside the
//! caller's [`UnitOfWork`](crate::UnitOfWork).

pub mod aggregate;
pub mod history;
pub mod variant;
