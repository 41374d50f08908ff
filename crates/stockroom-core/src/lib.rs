//! # stockroom-core: Pure Business Logic for Stockroom
//!
//! Money, quantities, pricing and the order/sale domain model. Everything
//! here is deterministic and free of I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stockroom Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 Request handlers (API layer)                    │   │
//! │  │    CreateOrder, CreateSale, AddLine, UpdateLine, Cancel         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               stockroom-engine (TransactionCoordinator)          │   │
//! │  │      locks • retries • compensation • catalog lookups           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ stockroom-core (THIS CRATE) ★                   │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │  pricing  │  │ validation│  │   │
//! │  │   │ Aggregate │  │   Money   │  │ HALF_UP   │  │   rules   │  │   │
//! │  │   │  Variant  │  │ Quantity  │  │ tolerance │  │  limits   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               stockroom-db (Database Layer)                     │   │
//! │  │       SQLite, migrations, InventoryLedger, repositories         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Variant, Aggregate, state machines)
//! - [`money`] - Money in integer cents
//! - [`quantity`] - Quantities in integer milli-units
//! - [`pricing`] - Line/aggregate totals and declared-total validation
//! - [`error`] - Domain error types
//! - [`validation`] - Request validation rules
//!
//! ## Example Usage
//!
//! ```rust
//! use stockroom_core::{Money, PricingCalculator, Quantity};
//!
//! let pricing = PricingCalculator::default();
//!
//! // 1.5 m of fabric at 3.33 per metre = 4.995 → 5.00
//! let line = pricing.line_total(Money::from_cents(333), Quantity::from_milli(1500));
//! assert_eq!(line.cents(), 500);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod pricing;
pub mod quantity;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use pricing::{PricingCalculator, DEFAULT_TOTAL_TOLERANCE};
pub use quantity::Quantity;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines allowed in a single order or sale.
pub const MAX_AGGREGATE_LINES: usize = 100;

/// Maximum quantity on a single line.
///
/// ## Business Reason
/// Catches typos such as 1000 instead of 10 before they reserve a
/// warehouse's worth of stock.
pub const MAX_LINE_QUANTITY: Quantity = Quantity::from_units(999);

/// Maximum unit price (10,000,000.00).
///
/// Bounds every line total to `MAX_UNIT_PRICE × MAX_LINE_QUANTITY` and
/// every aggregate total to [`MAX_AGGREGATE_TOTAL`], both far inside `i64`
/// cents.
pub const MAX_UNIT_PRICE: Money = Money::from_cents(1_000_000_000);

/// Largest total an aggregate can reach within the line and price limits.
pub const MAX_AGGREGATE_TOTAL: Money = Money::from_cents(
    MAX_UNIT_PRICE.cents() * (MAX_LINE_QUANTITY.milli() / quantity::MILLI_PER_UNIT)
        * MAX_AGGREGATE_LINES as i64,
);
