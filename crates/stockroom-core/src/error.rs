//! # Error Types
//!
//! Domain-specific error types for stockroom-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  stockroom-core errors (this file)                                     │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  stockroom-db errors                                                   │
//! │  ├── DbError          - Storage failures                               │
//! │  └── LedgerError      - Reserve/release outcomes                       │
//! │                                                                         │
//! │  stockroom-engine errors                                               │
//! │  └── EngineError      - What the API layer sees (typed, coded)         │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError ─┐                                  │
//! │        DbError → LedgerError ───────┴─► EngineError → caller           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::money::Money;
use crate::quantity::Quantity;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations detected without touching storage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The declared total differs from the computed one by more than the
    /// tolerance.
    ///
    /// ## When This Occurs
    /// - A client computed the total with float math and drifted
    /// - A client tampered with the total
    /// - A client used a stale price for one of the lines
    #[error("Declared total {declared} does not match computed total {computed}")]
    TotalMismatch { declared: Money, computed: Money },

    /// The requested state change is not allowed from the current state.
    ///
    /// ## When This Occurs
    /// - Adding a line to a cancelled order
    /// - Moving a shipped order back to pending
    /// - Setting a fulfillment status on a sale
    #[error("Cannot move {aggregate_id} from {from} to {to}")]
    InvalidTransition {
        aggregate_id: String,
        from: String,
        to: String,
    },

    /// Aggregate has reached the maximum number of lines.
    #[error("An order or sale cannot have more than {max} lines")]
    TooManyLines { max: usize },

    /// Line quantity exceeds the maximum allowed.
    #[error("Quantity {requested} exceeds maximum allowed ({max})")]
    QuantityTooLarge { requested: Quantity, max: Quantity },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when request input doesn't meet requirements.
/// Used for early validation before any inventory is reserved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID, malformed decimal).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
