//! # Validation Module
//!
//! Input validation for order and sale requests.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Request types (serde)                                        │
//! │  └── Shape and type checks during deserialization                     │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Coordinator, before any inventory is touched                 │
//! │  ├── THIS MODULE: ids, references, quantities, prices, limits          │
//! │  └── Declared total vs computed total                                  │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (available_milli >= 0), CHECK (quantity_milli > 0)          │
//! │  ├── UNIQUE (barcode)                                                  │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use stockroom_core::validation::{validate_line_quantity, validate_reference};
//! use stockroom_core::Quantity;
//!
//! validate_reference("customer_ref", "CUST-0042").unwrap();
//! validate_line_quantity(Quantity::from_units(5)).unwrap();
//! ```

use crate::error::{CoreError, ValidationError};
use crate::money::Money;
use crate::quantity::Quantity;
use crate::{MAX_AGGREGATE_LINES, MAX_AGGREGATE_TOTAL, MAX_LINE_QUANTITY, MAX_UNIT_PRICE};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest external reference or id accepted.
const MAX_REFERENCE_LEN: usize = 64;

// =============================================================================
// String Validators
// =============================================================================

/// Validates an identifier supplied by a caller (variant id, line id, ...).
///
/// ## Rules
/// - Must not be empty
/// - At most 64 characters
/// - Letters, digits, hyphens and underscores only
pub fn validate_id(field: &str, id: &str) -> ValidationResult<()> {
    let id = id.trim();

    if id.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if id.len() > MAX_REFERENCE_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_REFERENCE_LEN,
        });
    }

    if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates an external reference such as a customer or product reference.
///
/// Looser than [`validate_id`]: any printable text, but not blank and not
/// longer than 64 characters.
///
/// ## Example
/// ```rust
/// use stockroom_core::validation::validate_reference;
///
/// assert!(validate_reference("customer_ref", "ACME Ltd. #7").is_ok());
/// assert!(validate_reference("customer_ref", "  ").is_err());
/// ```
pub fn validate_reference(field: &str, reference: &str) -> ValidationResult<()> {
    let reference = reference.trim();

    if reference.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if reference.chars().count() > MAX_REFERENCE_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_REFERENCE_LEN,
        });
    }

    if reference.chars().any(|c| c.is_control()) {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must not contain control characters".to_string(),
        });
    }

    Ok(())
}

/// Validates a variant barcode (EAN-8, UPC-A, EAN-13, GTIN-14 or an
/// internal code of the same shape).
///
/// ## Rules
/// - 8 to 14 ASCII digits
pub fn validate_barcode(barcode: &str) -> ValidationResult<()> {
    let barcode = barcode.trim();

    if barcode.is_empty() {
        return Err(ValidationError::Required {
            field: "barcode".to_string(),
        });
    }

    if !barcode.chars().all(|c| c.is_ascii_digit()) || !(8..=14).contains(&barcode.len()) {
        return Err(ValidationError::InvalidFormat {
            field: "barcode".to_string(),
            reason: "must be 8 to 14 digits".to_string(),
        });
    }

    Ok(())
}

/// Validates the delivery address of an order.
pub fn validate_address(address: &str) -> ValidationResult<()> {
    let address = address.trim();

    if address.is_empty() {
        return Err(ValidationError::Required {
            field: "delivery.address".to_string(),
        });
    }

    if address.chars().count() > 500 {
        return Err(ValidationError::TooLong {
            field: "delivery.address".to_string(),
            max: 500,
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates the quantity of a single line.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed [`MAX_LINE_QUANTITY`] (999 units)
///
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  validate_line_quantity(q)                                              │
/// │       │                                                                 │
/// │       ├── q <= 0?    → MustBePositive                                   │
/// │       ├── q > 999?   → QuantityTooLarge                                 │
/// │       └── OK         → proceed to reservation                           │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub fn validate_line_quantity(quantity: Quantity) -> Result<(), CoreError> {
    if !quantity.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        }
        .into());
    }

    if quantity > MAX_LINE_QUANTITY {
        return Err(CoreError::QuantityTooLarge {
            requested: quantity,
            max: MAX_LINE_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a unit price. Zero is allowed (free items, samples); anything
/// above [`MAX_UNIT_PRICE`] is rejected.
pub fn validate_unit_price(price: Money) -> ValidationResult<()> {
    if price.is_negative() || price > MAX_UNIT_PRICE {
        return Err(ValidationError::OutOfRange {
            field: "unit_price".to_string(),
            min: 0,
            max: MAX_UNIT_PRICE.cents(),
        });
    }

    Ok(())
}

/// Validates a declared total: between zero and [`MAX_AGGREGATE_TOTAL`].
pub fn validate_declared_total(total: Money) -> ValidationResult<()> {
    if total.is_negative() || total > MAX_AGGREGATE_TOTAL {
        return Err(ValidationError::OutOfRange {
            field: "declared_total".to_string(),
            min: 0,
            max: MAX_AGGREGATE_TOTAL.cents(),
        });
    }

    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates the number of lines an aggregate would have.
///
/// ## Rules
/// - At least one line
/// - At most [`MAX_AGGREGATE_LINES`] (100)
pub fn validate_line_count(count: usize) -> Result<(), CoreError> {
    if count == 0 {
        return Err(ValidationError::Required {
            field: "lines".to_string(),
        }
        .into());
    }

    if count > MAX_AGGREGATE_LINES {
        return Err(CoreError::TooManyLines {
            max: MAX_AGGREGATE_LINES,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_id() {
        assert!(validate_id("variant_id", "var-001").is_ok());
        assert!(validate_id("variant_id", "550e8400-e29b-41d4-a716-446655440000").is_ok());

        assert!(validate_id("variant_id", "").is_err());
        assert!(validate_id("variant_id", "has space").is_err());
        assert!(validate_id("variant_id", &"a".repeat(65)).is_err());
    }

    #[test]
    fn test_validate_reference() {
        assert!(validate_reference("customer_ref", "Jane's Boutique").is_ok());
        assert!(validate_reference("customer_ref", "").is_err());
        assert!(validate_reference("customer_ref", "tab\there").is_err());
        assert!(validate_reference("customer_ref", &"x".repeat(65)).is_err());
    }

    #[test]
    fn test_validate_barcode() {
        assert!(validate_barcode("4006381333931").is_ok());
        assert!(validate_barcode("96385074").is_ok());
        assert!(validate_barcode("1234567").is_err());
        assert!(validate_barcode("40063813339AB").is_err());
        assert!(validate_barcode("").is_err());
    }

    #[test]
    fn test_validate_line_quantity() {
        assert!(validate_line_quantity(Quantity::from_units(1)).is_ok());
        assert!(validate_line_quantity(Quantity::from_milli(250)).is_ok());
        assert!(validate_line_quantity(Quantity::from_units(999)).is_ok());

        assert!(matches!(
            validate_line_quantity(Quantity::zero()),
            Err(CoreError::Validation(ValidationError::MustBePositive { .. }))
        ));
        assert!(validate_line_quantity(Quantity::from_units(-1)).is_err());
        assert!(matches!(
            validate_line_quantity(Quantity::from_milli(999_001)),
            Err(CoreError::QuantityTooLarge { .. })
        ));
    }

    #[test]
    fn test_validate_unit_price() {
        assert!(validate_unit_price(Money::zero()).is_ok());
        assert!(validate_unit_price(Money::from_cents(1099)).is_ok());
        assert!(validate_unit_price(Money::from_cents(-1)).is_err());
        assert!(validate_unit_price(MAX_UNIT_PRICE).is_ok());
        assert!(matches!(
            validate_unit_price(Money::from_cents(MAX_UNIT_PRICE.cents() + 1)),
            Err(ValidationError::OutOfRange { max, .. }) if max == MAX_UNIT_PRICE.cents()
        ));
        assert!(validate_unit_price(Money::from_cents(i64::MAX / 100)).is_err());
    }

    #[test]
    fn test_validate_declared_total() {
        assert!(validate_declared_total(Money::zero()).is_ok());
        assert!(validate_declared_total(MAX_AGGREGATE_TOTAL).is_ok());
        assert!(validate_declared_total(Money::from_cents(-1)).is_err());
        assert!(validate_declared_total(Money::from_cents(MAX_AGGREGATE_TOTAL.cents() + 1)).is_err());
    }

    #[test]
    fn test_validate_line_count() {
        assert!(validate_line_count(1).is_ok());
        assert!(validate_line_count(100).is_ok());
        assert!(validate_line_count(0).is_err());
        assert_eq!(
            validate_line_count(101),
            Err(CoreError::TooManyLines { max: 100 })
        );
    }

    #[test]
    fn test_validate_address() {
        assert!(validate_address("12 Market Street").is_ok());
        assert!(validate_address(" ").is_err());
        assert!(validate_address(&"a".repeat(501)).is_err());
    }
}
