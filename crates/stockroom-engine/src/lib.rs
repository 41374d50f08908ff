//! # stockroom-engine: Transaction Coordinator for Stockroom
//!
//! Creates, mutates and cancels orders and sales as all-or-nothing units,
//! keeping per-variant stock consistent under concurrent callers.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stockroom Request Flow                           │
//! │                                                                         │
//! │  Request handlers (any number of concurrent tasks)                      │
//! │       │  CreateAggregate / AddLine / UpdateLine / remove / cancel       │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 stockroom-engine (THIS CRATE)                   │   │
//! │  │                                                                 │   │
//! │  │   TransactionCoordinator ──► VariantLocks (sorted, timed)       │   │
//! │  │          │                ──► RetryPolicy (exponential backoff) │   │
//! │  │          │                ──► dyn Catalog (price snapshots)     │   │
//! │  │          │                ──► ReservationLog (compensation)     │   │
//! │  └──────────┼──────────────────────────────────────────────────────┘   │
//! │             ▼                                                           │
//! │  stockroom-db: UnitOfWork, InventoryLedger, repositories               │
//! │             ▼                                                           │
//! │  stockroom-core: Money, Quantity, PricingCalculator, Aggregate         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`coordinator`] - The transaction coordinator
//! - [`request`] - Serde request types
//! - [`catalog`] - Catalog collaborator trait and the SQLite catalog
//! - [`locks`] - Per-variant async locks
//! - [`retry`] - Whole-operation retry with backoff
//! - [`config`] - `stockroom.toml` and environment configuration
//! - [`telemetry`] - Tracing subscriber setup
//! - [`error`] - Engine error type and error codes
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stockroom_engine::{EngineConfig, TransactionCoordinator, CreateAggregate, LineRequest};
//!
//! stockroom_engine::telemetry::init_tracing();
//!
//! let config = EngineConfig::load(None)?;
//! let coordinator = TransactionCoordinator::from_config(&config).await?;
//!
//! let order = coordinator
//!     .create(CreateAggregate::order(
//!         "CUST-0042",
//!         vec![LineRequest::new(variant_id, Quantity::from_units(2))],
//!         Money::from_cents(2998),
//!     ))
//!     .await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod locks;
mod reservations;
pub mod request;
pub mod retry;
pub mod telemetry;

// =============================================================================
// Re-exports
// =============================================================================

pub use catalog::{Catalog, CatalogVariant, SqliteCatalog, VariantAttributes};
pub use config::{ConfigError, EngineConfig};
pub use coordinator::TransactionCoordinator;
pub use error::{EngineError, EngineResult, ErrorCode, ErrorResponse};
pub use locks::VariantLocks;
pub use request::{AddLine, CreateAggregate, LineRequest, UpdateLine};
pub use retry::RetryPolicy;
