//! # Request Types
//!
//! Inputs to the coordinator, deserializable straight from an API body.
//!
//! Quantities travel as milli-units and money as cents, the same integers
//! the core types serialize to:
//! ```json
//! {
//!   "kind": "order",
//!   "customer_ref": "CUST-0042",
//!   "delivery": { "address": "12 Mill Lane, Leeds", "phone": null, "notes": null },
//!   "lines": [
//!     { "variant_id": "v-1", "quantity": 3000 },
//!     { "variant_id": "v-7", "quantity": 1500, "unit_price": 990 }
//!   ],
//!   "declared_total": 5982
//! }
//! ```

use serde::{Deserialize, Serialize};
use stockroom_core::{AggregateKind, DeliveryInfo, Money, Quantity};
use ts_rs::TS;

/// One requested line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LineRequest {
    pub variant_id: String,
    pub quantity: Quantity,
    /// Client-supplied unit price. The catalog price is used when absent.
    #[serde(default)]
    pub unit_price: Option<Money>,
}

impl LineRequest {
    pub fn new(variant_id: impl Into<String>, quantity: Quantity) -> Self {
        LineRequest {
            variant_id: variant_id.into(),
            quantity,
            unit_price: None,
        }
    }

    pub fn with_price(mut self, unit_price: Money) -> Self {
        self.unit_price = Some(unit_price);
        self
    }
}

/// CreateOrder / CreateSale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CreateAggregate {
    pub kind: AggregateKind,
    #[serde(default)]
    pub customer_ref: Option<String>,
    #[serde(default)]
    pub delivery: Option<DeliveryInfo>,
    pub lines: Vec<LineRequest>,
    /// What the client believes the total is.
    pub declared_total: Money,
}

impl CreateAggregate {
    pub fn order(customer_ref: impl Into<String>, lines: Vec<LineRequest>, declared_total: Money) -> Self {
        CreateAggregate {
            kind: AggregateKind::Order,
            customer_ref: Some(customer_ref.into()),
            delivery: None,
            lines,
            declared_total,
        }
    }

    pub fn sale(lines: Vec<LineRequest>, declared_total: Money) -> Self {
        CreateAggregate {
            kind: AggregateKind::Sale,
            customer_ref: None,
            delivery: None,
            lines,
            declared_total,
        }
    }

    pub fn with_customer(mut self, customer_ref: impl Into<String>) -> Self {
        self.customer_ref = Some(customer_ref.into());
        self
    }

    pub fn with_delivery(mut self, delivery: DeliveryInfo) -> Self {
        self.delivery = Some(delivery);
        self
    }
}

/// Append a line to an existing aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AddLine {
    pub aggregate_id: String,
    pub variant_id: String,
    pub quantity: Quantity,
    #[serde(default)]
    pub unit_price: Option<Money>,
}

impl AddLine {
    pub fn new(aggregate_id: impl Into<String>, variant_id: impl Into<String>, quantity: Quantity) -> Self {
        AddLine {
            aggregate_id: aggregate_id.into(),
            variant_id: variant_id.into(),
            quantity,
            unit_price: None,
        }
    }

    pub fn with_price(mut self, unit_price: Money) -> Self {
        self.unit_price = Some(unit_price);
        self
    }
}

/// Change a line's variant, quantity, or both. Absent fields keep their
/// current value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UpdateLine {
    pub aggregate_id: String,
    pub line_id: String,
    #[serde(default)]
    pub variant_id: Option<String>,
    #[serde(default)]
    pub quantity: Option<Quantity>,
}

impl UpdateLine {
    pub fn new(aggregate_id: impl Into<String>, line_id: impl Into<String>) -> Self {
        UpdateLine {
            aggregate_id: aggregate_id.into(),
            line_id: line_id.into(),
            variant_id: None,
            quantity: None,
        }
    }

    pub fn quantity(mut self, quantity: Quantity) -> Self {
        self.quantity = Some(quantity);
        self
    }

    pub fn variant(mut self, variant_id: impl Into<String>) -> Self {
        self.variant_id = Some(variant_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_from_json() {
        let req: CreateAggregate = serde_json::from_str(
            r#"{
                "kind": "order",
                "customer_ref": "CUST-0042",
                "lines": [
                    { "variant_id": "v-1", "quantity": 3000 },
                    { "variant_id": "v-7", "quantity": 1500, "unit_price": 990 }
                ],
                "declared_total": 5982
            }"#,
        )
        .unwrap();

        assert_eq!(req.kind, AggregateKind::Order);
        assert_eq!(req.customer_ref.as_deref(), Some("CUST-0042"));
        assert!(req.delivery.is_none());
        assert_eq!(req.lines[0].quantity, Quantity::from_units(3));
        assert_eq!(req.lines[0].unit_price, None);
        assert_eq!(req.lines[1].unit_price, Some(Money::from_cents(990)));
        assert_eq!(req.declared_total, Money::from_cents(5982));
    }

    #[test]
    fn test_update_line_partial_json() {
        let req: UpdateLine =
            serde_json::from_str(r#"{ "aggregate_id": "a-1", "line_id": "l-1", "quantity": 1000 }"#)
                .unwrap();
        assert_eq!(req, UpdateLine::new("a-1", "l-1").quantity(Quantity::from_units(1)));
    }
}
