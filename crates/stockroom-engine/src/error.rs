//! # Engine Error Type
//!
//! The typed result every coordinator operation returns on failure.
//!
//! ## Error Handling Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Stockroom                              │
//! │                                                                         │
//! │  Caller                      TransactionCoordinator                     │
//! │  ──────                      ──────────────────────                     │
//! │                                                                         │
//! │  coordinator.create(req)                                                │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  Validation? ───── CoreError::Validation ──────► Validation      │  │
//! │  │  Total wrong? ──── CoreError::TotalMismatch ───► TotalMismatch   │  │
//! │  │  Reserve refused? ─ LedgerError::Insufficient ─► InsufficientStock│ │
//! │  │  SQLite busy? ──── DbError::Busy ──► retry ──► ... ──► Fatal     │  │
//! │  │  CHECK tripped? ── DbError::CheckViolation ────► InvariantViolation│ │
//! │  │  Lock timeout? ─────────────────────────────────► Retryable      │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! │  match err.code() {                                                     │
//! │    ErrorCode::InsufficientStock => offer a smaller quantity,            │
//! │    ErrorCode::Retryable         => resubmit later,                      │
//! │    ...                                                                  │
//! │  }                                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Serialization
//! [`ErrorResponse`] is what an API layer hands to its client:
//! ```json
//! {
//!   "code": "INSUFFICIENT_STOCK",
//!   "message": "Insufficient stock for v-1: requested 5.000, available 2.000"
//! }
//! ```

use serde::Serialize;
use stockroom_core::{CoreError, Money, Quantity};
use stockroom_db::{DbError, LedgerError};
use thiserror::Error;
use ts_rs::TS;

/// Everything a coordinator operation can fail with.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The aggregate, line or variant does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    /// A line asked for more than the variant has. Nothing was reserved.
    ///
    /// `line_index` points at the offending request line when the failure
    /// happened inside `create`.
    #[error("Insufficient stock for {variant_id}: requested {requested}, available {available}")]
    InsufficientStock {
        variant_id: String,
        requested: Quantity,
        available: Quantity,
        line_index: Option<usize>,
    },

    /// The caller's total disagrees with the computed one.
    #[error("Declared total {declared} does not match computed total {computed}")]
    TotalMismatch { declared: Money, computed: Money },

    /// The aggregate is in a state that does not allow the operation.
    ///
    /// ## When This Occurs
    /// - Any line change on a cancelled order or sale
    /// - Moving an order's status backwards
    /// - Setting a fulfillment status on a sale
    #[error("Invalid state for {aggregate_id}: {reason}")]
    InvalidState { aggregate_id: String, reason: String },

    /// Request input was rejected before anything was touched.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Storage holds a state the invariants say is impossible.
    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    /// The operation could not get its locks in time. Nothing changed.
    #[error("{operation} should be retried: {reason}")]
    Retryable { operation: String, reason: String },

    /// Storage kept failing after every allowed attempt.
    #[error("{operation} failed after {attempts} attempt(s): {message}")]
    Fatal {
        operation: String,
        attempts: u32,
        message: String,
    },

    /// A storage failure still inside the retry loop.
    ///
    /// Coordinator operations never return this; the retry loop turns it
    /// into a retry or into [`EngineError::Fatal`].
    #[error(transparent)]
    Storage(DbError),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Stable machine-readable error codes.
///
/// ## Usage in a Client
/// ```typescript
/// switch (e.code) {
///   case 'INSUFFICIENT_STOCK':
///     offerReducedQuantity(e.message);
///     break;
///   case 'RETRYABLE':
///     retryLater();
///     break;
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Resource not found (404)
    NotFound,

    /// Not enough stock for a line (409)
    InsufficientStock,

    /// Declared total rejected (422)
    TotalMismatch,

    /// Operation not allowed in the current state (409)
    InvalidState,

    /// Input validation failed (400)
    ValidationError,

    /// Storage invariant broken (500)
    InvariantViolation,

    /// Temporary contention, safe to resubmit (503)
    Retryable,

    /// Storage failure after retries (500)
    Fatal,
}

/// Error body for an API layer.
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Machine-readable error code for programmatic handling
    pub code: ErrorCode,

    /// Human-readable error message for display
    pub message: String,
}

impl EngineError {
    /// Creates a NotFound error.
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Creates an InvalidState error.
    pub fn invalid_state(aggregate_id: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::InvalidState {
            aggregate_id: aggregate_id.into(),
            reason: reason.into(),
        }
    }

    /// Creates a Validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        EngineError::Validation(message.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::NotFound { .. } => ErrorCode::NotFound,
            EngineError::InsufficientStock { .. } => ErrorCode::InsufficientStock,
            EngineError::TotalMismatch { .. } => ErrorCode::TotalMismatch,
            EngineError::InvalidState { .. } => ErrorCode::InvalidState,
            EngineError::Validation(_) => ErrorCode::ValidationError,
            EngineError::InvariantViolation(_) => ErrorCode::InvariantViolation,
            EngineError::Retryable { .. } => ErrorCode::Retryable,
            EngineError::Storage(e) if e.is_transient() => ErrorCode::Retryable,
            EngineError::Fatal { .. } | EngineError::Storage(_) => ErrorCode::Fatal,
        }
    }

    /// Returns true if resubmitting the same request unchanged may succeed.
    ///
    /// ## Retryable Errors
    /// - Lock acquisition timeouts
    /// - Busy/locked database, pool timeout, version conflicts
    ///
    /// ## Non-Retryable Errors
    /// - InsufficientStock, TotalMismatch (the request must change)
    /// - NotFound, InvalidState, Validation
    /// - Fatal, InvariantViolation
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Retryable { .. } => true,
            EngineError::Storage(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Storage failures the retry loop should re-run the whole operation for.
    pub(crate) fn is_transient_storage(&self) -> bool {
        matches!(self, EngineError::Storage(e) if e.is_transient())
    }

    /// Attaches the request line index to an InsufficientStock error.
    pub(crate) fn at_line(self, index: usize) -> Self {
        match self {
            EngineError::InsufficientStock {
                variant_id,
                requested,
                available,
                ..
            } => EngineError::InsufficientStock {
                variant_id,
                requested,
                available,
                line_index: Some(index),
            },
            other => other,
        }
    }

    /// Builds the API error body.
    pub fn to_response(&self) -> ErrorResponse {
        let message = match self {
            // Storage details stay in the logs
            EngineError::Fatal { operation, .. } => {
                format!("{} failed; please try again later", operation)
            }
            other => other.to_string(),
        };
        ErrorResponse {
            code: self.code(),
            message,
        }
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::TotalMismatch { declared, computed } => {
                EngineError::TotalMismatch { declared, computed }
            }
            CoreError::InvalidTransition {
                aggregate_id,
                from,
                to,
            } => EngineError::InvalidState {
                aggregate_id,
                reason: format!("cannot move from {} to {}", from, to),
            },
            CoreError::TooManyLines { .. } | CoreError::QuantityTooLarge { .. } => {
                EngineError::Validation(err.to_string())
            }
            CoreError::Validation(e) => EngineError::Validation(e.to_string()),
        }
    }
}

impl From<stockroom_core::ValidationError> for EngineError {
    fn from(err: stockroom_core::ValidationError) -> Self {
        EngineError::Validation(err.to_string())
    }
}

impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => EngineError::NotFound { kind: entity, id },
            DbError::InvalidInput(message) => EngineError::Validation(message),
            DbError::CheckViolation { message } => {
                tracing::error!(detail = %message, "Check constraint tripped");
                EngineError::InvariantViolation(message)
            }
            other => EngineError::Storage(other),
        }
    }
}

impl From<LedgerError> for EngineError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientStock {
                variant_id,
                requested,
                available,
            } => EngineError::InsufficientStock {
                variant_id,
                requested,
                available,
                line_index: None,
            },
            LedgerError::VariantNotFound(id) => EngineError::not_found("Variant", id),
            LedgerError::InvalidQuantity {
                variant_id,
                quantity,
            } => EngineError::Validation(format!(
                "invalid quantity {} for variant {}",
                quantity, variant_id
            )),
            LedgerError::InvariantViolation { variant_id, detail } => {
                tracing::error!(variant_id = %variant_id, detail = %detail, "Ledger invariant violated");
                EngineError::InvariantViolation(format!("variant {}: {}", variant_id, detail))
            }
            LedgerError::Storage(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(EngineError::Retryable {
            operation: "create".into(),
            reason: "lock timeout".into(),
        }
        .is_retryable());
        assert!(EngineError::from(DbError::Busy("locked".into())).is_retryable());
        assert!(EngineError::from(DbError::conflict("Aggregate", "a-1")).is_retryable());

        assert!(!EngineError::not_found("Aggregate", "a-1").is_retryable());
        assert!(!EngineError::TotalMismatch {
            declared: Money::from_cents(100),
            computed: Money::from_cents(200),
        }
        .is_retryable());
        assert!(!EngineError::Fatal {
            operation: "create".into(),
            attempts: 3,
            message: "busy".into(),
        }
        .is_retryable());
    }

    #[test]
    fn test_ledger_error_mapping() {
        let err: EngineError = LedgerError::InsufficientStock {
            variant_id: "v-1".into(),
            requested: Quantity::from_units(5),
            available: Quantity::from_units(2),
        }
        .into();
        assert_eq!(err.code(), ErrorCode::InsufficientStock);

        let err = err.at_line(3);
        assert!(matches!(
            err,
            EngineError::InsufficientStock { line_index: Some(3), .. }
        ));

        let err: EngineError = LedgerError::VariantNotFound("v-9".into()).into();
        assert!(matches!(err, EngineError::NotFound { ref kind, ref id } if kind == "Variant" && id == "v-9"));
    }

    #[test]
    fn test_check_violation_is_invariant() {
        let err: EngineError = DbError::CheckViolation {
            message: "CHECK constraint failed: available_milli >= 0".into(),
        }
        .into();
        assert_eq!(err.code(), ErrorCode::InvariantViolation);
    }

    #[test]
    fn test_core_error_mapping() {
        let err: EngineError = CoreError::InvalidTransition {
            aggregate_id: "o-1".into(),
            from: "shipped".into(),
            to: "pending".into(),
        }
        .into();
        assert_eq!(err.code(), ErrorCode::InvalidState);

        let err: EngineError = CoreError::TooManyLines { max: 100 }.into();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    #[test]
    fn test_response_serialization() {
        let err = EngineError::not_found("Aggregate", "a-1");
        let json = serde_json::to_value(err.to_response()).unwrap();
        assert_eq!(json["code"], "NOT_FOUND");
        assert_eq!(json["message"], "Aggregate not found: a-1");

        let fatal = EngineError::Fatal {
            operation: "cancel".into(),
            attempts: 3,
            message: "database is locked".into(),
        };
        let body = fatal.to_response();
        assert_eq!(body.code, ErrorCode::Fatal);
        assert!(!body.message.contains("locked"));
    }
}
