//! # Catalog Collaborator
//!
//! The coordinator asks the catalog two things about a variant: does it
//! exist, and what does it cost right now. The answer is snapshotted onto
//! the line and never consulted again for that line.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  TransactionCoordinator ──get_variant(id)──► dyn Catalog                │
//! │                                                  │                      │
//! │                                   ┌──────────────┴──────────────┐       │
//! │                                   ▼                             ▼       │
//! │                            SqliteCatalog                 (any other     │
//! │                            variants table                 catalog)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stockroom_core::{Money, Variant};
use stockroom_db::VariantRepository;

use crate::error::EngineResult;

/// Descriptive attributes of a variant.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VariantAttributes {
    pub size: Option<String>,
    pub color: Option<String>,
    pub barcode: Option<String>,
}

/// What the catalog knows about one variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogVariant {
    pub id: String,
    pub product_ref: String,
    /// Current list price.
    pub price: Money,
    pub attributes: VariantAttributes,
}

impl From<Variant> for CatalogVariant {
    fn from(v: Variant) -> Self {
        CatalogVariant {
            id: v.id,
            product_ref: v.product_ref,
            price: v.unit_price,
            attributes: VariantAttributes {
                size: v.size,
                color: v.color,
                barcode: Some(v.barcode),
            },
        }
    }
}

/// Variant lookup used for existence checks and price snapshots.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// `Ok(None)` when the variant does not exist.
    async fn get_variant(&self, variant_id: &str) -> EngineResult<Option<CatalogVariant>>;
}

/// Catalog backed by the local `variants` table.
#[derive(Debug, Clone)]
pub struct SqliteCatalog {
    variants: VariantRepository,
}

impl SqliteCatalog {
    pub fn new(variants: VariantRepository) -> Self {
        SqliteCatalog { variants }
    }
}

#[async_trait]
impl Catalog for SqliteCatalog {
    async fn get_variant(&self, variant_id: &str) -> EngineResult<Option<CatalogVariant>> {
        let variant = self.variants.get_by_id(variant_id).await?;
        Ok(variant.map(CatalogVariant::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockroom_core::Quantity;
    use stockroom_db::{Database, DbConfig, NewVariant};

    #[tokio::test]
    async fn test_sqlite_catalog_lookup() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.variants()
            .insert(
                &NewVariant::new("TEE-CREW", "2000000000017", Money::from_cents(1499))
                    .with_id("v-1")
                    .size("M")
                    .color("Navy")
                    .stock(Quantity::from_units(3)),
            )
            .await
            .unwrap();

        let catalog = SqliteCatalog::new(db.variants());

        let found = catalog.get_variant("v-1").await.unwrap().unwrap();
        assert_eq!(found.price, Money::from_cents(1499));
        assert_eq!(found.product_ref, "TEE-CREW");
        assert_eq!(found.attributes.size.as_deref(), Some("M"));
        assert_eq!(found.attributes.barcode.as_deref(), Some("2000000000017"));

        assert!(catalog.get_variant("missing").await.unwrap().is_none());
    }
}
