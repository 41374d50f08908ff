//! # Domain Types
//!
//! Core domain types used throughout Stockroom.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────────┐   ┌─────────────────┐   │
//! │  │    Variant      │   │     Aggregate       │   │ AggregateLine   │   │
//! │  │  ─────────────  │   │  ─────────────────  │   │  ─────────────  │   │
//! │  │  id             │   │  id, kind           │   │  id, position   │   │
//! │  │  barcode        │◄──│  state              │──►│  variant_id     │   │
//! │  │  unit_price     │   │  order_status       │   │  quantity       │   │
//! │  │  available      │   │  total              │   │  unit_price ❄   │   │
//! │  └─────────────────┘   └─────────────────────┘   │  line_total     │   │
//! │                                                   └─────────────────┘   │
//! │  ┌─────────────────┐   ┌─────────────────────┐   ┌─────────────────┐   │
//! │  │ AggregateKind   │   │ TransactionState    │   │  OrderStatus    │   │
//! │  │  Order | Sale   │   │  Draft → Committed  │   │  pending → ...  │   │
//! │  └─────────────────┘   │  → Modified ↺       │   │  → delivered    │   │
//! │                        │  → Cancelled ■      │   └─────────────────┘   │
//! │                        └─────────────────────┘                          │
//! │  ❄ = snapshot, frozen at transaction time                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;
use crate::pricing::PricingCalculator;
use crate::quantity::Quantity;

// =============================================================================
// Variant
// =============================================================================

/// A sellable variant of a catalog product (one size/color combination).
///
/// `available` is only ever changed by the inventory ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Variant {
    pub id: String,
    /// Reference to the product in the external catalog.
    pub product_ref: String,
    pub size: Option<String>,
    pub color: Option<String>,
    /// Unique across all variants.
    pub barcode: String,
    /// Current catalog price. Lines snapshot this at transaction time.
    pub unit_price: Money,
    /// Sellable quantity. Never negative.
    pub available: Quantity,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Aggregate Kind
// =============================================================================

/// Whether an aggregate is a delivery order or an over-the-counter sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AggregateKind {
    Order,
    Sale,
}

impl AggregateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateKind::Order => "order",
            AggregateKind::Sale => "sale",
        }
    }
}

impl fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Transaction State
// =============================================================================

/// Lifecycle of an aggregate as seen by the transaction coordinator.
///
/// ```text
/// Draft ──► Committed ──► Modified ◄─┐
///               │            │  └────┘
///               └──► Cancelled ◄─┘
/// ```
///
/// `Draft` only exists in memory while `create` is running; it is never
/// persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    Draft,
    Committed,
    Modified,
    Cancelled,
}

impl TransactionState {
    /// Returns true if the state machine allows `self → next`.
    pub fn can_transition_to(&self, next: TransactionState) -> bool {
        use TransactionState::*;
        matches!(
            (self, next),
            (Draft, Committed)
                | (Committed, Modified)
                | (Committed, Cancelled)
                | (Modified, Modified)
                | (Modified, Cancelled)
        )
    }

    /// Lines may be added, updated or removed.
    pub fn is_mutable(&self) -> bool {
        matches!(self, TransactionState::Committed | TransactionState::Modified)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionState::Draft => "draft",
            TransactionState::Committed => "committed",
            TransactionState::Modified => "modified",
            TransactionState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Order Status
// =============================================================================

/// Fulfillment status of an order. Sales carry no status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// Position along the fulfillment pipeline. `Cancelled` is off-pipeline.
    fn rank(&self) -> Option<u8> {
        match self {
            OrderStatus::Pending => Some(0),
            OrderStatus::Confirmed => Some(1),
            OrderStatus::Processing => Some(2),
            OrderStatus::Shipped => Some(3),
            OrderStatus::Delivered => Some(4),
            OrderStatus::Cancelled => None,
        }
    }

    /// Forward moves along the pipeline are allowed, including skips.
    /// Cancellation is handled by the coordinator, not by this check.
    pub fn can_advance_to(&self, next: OrderStatus) -> bool {
        match (self.rank(), next.rank()) {
            (Some(from), Some(to)) => to > from,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(OrderStatus::Pending),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "processing" => Ok(OrderStatus::Processing),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" | "canceled" => Ok(OrderStatus::Cancelled),
            _ => Err(ValidationError::NotAllowed {
                field: "status".to_string(),
                allowed: [
                    "pending",
                    "confirmed",
                    "processing",
                    "shipped",
                    "delivered",
                    "cancelled",
                ]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            }),
        }
    }
}

// =============================================================================
// Delivery Info
// =============================================================================

/// Where and how an order is delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DeliveryInfo {
    pub address: String,
    pub phone: Option<String>,
    pub notes: Option<String>,
}

// =============================================================================
// Aggregate Line
// =============================================================================

/// A line of an order or sale.
///
/// `unit_price` is a snapshot taken when the line was written and is never
/// refreshed from the catalog afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AggregateLine {
    pub id: String,
    pub variant_id: String,
    /// Ordering within the aggregate, ascending.
    pub position: i64,
    /// Quantity reserved from the variant for this line.
    pub quantity: Quantity,
    /// Unit price at time of transaction (frozen).
    pub unit_price: Money,
    /// `round(quantity × unit_price, 2, HALF_UP)`.
    pub line_total: Money,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Aggregate
// =============================================================================

/// An order or sale header plus its lines, as last committed.
///
/// This is the immutable result type returned by every coordinator
/// operation; nothing downstream patches fields onto it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Aggregate {
    pub id: String,
    pub kind: AggregateKind,
    /// External customer reference. Required for orders.
    pub customer_ref: Option<String>,
    /// Orders only.
    pub delivery: Option<DeliveryInfo>,
    pub state: TransactionState,
    /// Orders only.
    pub order_status: Option<OrderStatus>,
    /// `round(Σ line_total, 2)`.
    pub total: Money,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Bumped on every committed header change; used for optimistic checks.
    pub version: i64,
    /// Lines ordered by `position`.
    pub lines: Vec<AggregateLine>,
}

impl Aggregate {
    pub fn line(&self, line_id: &str) -> Option<&AggregateLine> {
        self.lines.iter().find(|l| l.id == line_id)
    }

    pub fn is_cancelled(&self) -> bool {
        self.state == TransactionState::Cancelled
    }

    /// Quantity of `variant_id` currently held by this aggregate.
    ///
    /// Cancelled aggregates hold nothing.
    pub fn reserved_quantity(&self, variant_id: &str) -> Quantity {
        if self.is_cancelled() {
            return Quantity::zero();
        }
        self.lines
            .iter()
            .filter(|l| l.variant_id == variant_id)
            .map(|l| l.quantity)
            .sum()
    }

    /// Distinct variant ids referenced by the lines, sorted.
    pub fn variant_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lines.iter().map(|l| l.variant_id.clone()).collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Total recomputed from the lines.
    pub fn computed_total(&self, pricing: &PricingCalculator) -> Money {
        pricing.aggregate_total(self.lines.iter().map(|l| l.line_total))
    }

    /// Next free line position.
    pub fn next_position(&self) -> i64 {
        self.lines.iter().map(|l| l.position).max().map_or(0, |p| p + 1)
    }
}

// =============================================================================
// History
// =============================================================================

/// What happened to an aggregate in a committed unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum HistoryEvent {
    Created,
    LineAdded,
    LineUpdated,
    LineRemoved,
    StatusChanged,
    Cancelled,
}

/// An append-only record of a committed aggregate.
///
/// `payload` is the full aggregate as JSON, written in the same
/// transaction as the change it records.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct HistoryEntry {
    pub id: String,
    pub aggregate_id: String,
    pub event: HistoryEvent,
    pub payload: String,
    #[ts(as = "String")]
    pub recorded_at: DateTime<Utc>,
}

impl HistoryEntry {
    /// Decodes the aggregate snapshot carried by this entry.
    pub fn snapshot(&self) -> serde_json::Result<Aggregate> {
        serde_json::from_str(&self.payload)
    }
}

// =============================================================================
// Stock Movements
// =============================================================================

/// Why a variant's available quantity changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MovementReason {
    Reserve,
    Release,
    Restock,
}

/// One entry of the append-only stock journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockMovement {
    pub id: String,
    pub variant_id: String,
    pub aggregate_id: Option<String>,
    pub reason: MovementReason,
    /// Signed change: negative for reservations.
    pub delta: Quantity,
    /// Available quantity right after the change.
    pub balance_after: Quantity,
    #[ts(as = "String")]
    pub recorded_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================
