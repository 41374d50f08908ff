//! # Variant Repository
//!
//! Catalog-side operations on variants: insert, lookup and price changes.
//!
//! Available quantity is deliberately absent from every write here except
//! the initial stock on insert; all later changes go through
//! [`InventoryLedger`](crate::InventoryLedger).

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::ledger::record_movement;
use stockroom_core::validation::{validate_barcode, validate_reference, validate_unit_price};
use stockroom_core::{Money, MovementReason, Quantity, Variant};

/// Input for [`VariantRepository::insert`].
///
/// ## Example
/// ```rust,ignore
/// let new = NewVariant::new("TSHIRT-BASIC", "4006381333931", Money::from_cents(1999))
///     .size("M")
///     .color("Navy")
///     .stock(Quantity::from_units(24));
/// let variant = db.variants().insert(&new).await?;
/// ```
#[derive(Debug, Clone)]
pub struct NewVariant {
    pub id: String,
    pub product_ref: String,
    pub size: Option<String>,
    pub color: Option<String>,
    pub barcode: String,
    pub unit_price: Money,
    pub initial_stock: Quantity,
}

impl NewVariant {
    pub fn new(product_ref: impl Into<String>, barcode: impl Into<String>, unit_price: Money) -> Self {
        NewVariant {
            id: generate_variant_id(),
            product_ref: product_ref.into(),
            size: None,
            color: None,
            barcode: barcode.into(),
            unit_price,
            initial_stock: Quantity::zero(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn size(mut self, size: impl Into<String>) -> Self {
        self.size = Some(size.into());
        self
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn stock(mut self, quantity: Quantity) -> Self {
        self.initial_stock = quantity;
        self
    }
}

/// Repository for variant database operations.
#[derive(Debug, Clone)]
pub struct VariantRepository {
    pool: SqlitePool,
}

impl VariantRepository {
    /// Creates a new VariantRepository.
    pub fn new(pool: SqlitePool) -> Self {
        VariantRepository { pool }
    }

    /// Inserts a variant. Initial stock is journaled as a restock.
    ///
    /// ## Errors
    /// - `UniqueViolation` when the barcode is already taken
    /// - `InvalidInput` when the input does not validate
    pub async fn insert(&self, new: &NewVariant) -> DbResult<Variant> {
        validate_reference("product_ref", &new.product_ref)
            .and_then(|_| validate_barcode(&new.barcode))
            .and_then(|_| validate_unit_price(new.unit_price))
            .map_err(|e| DbError::InvalidInput(e.to_string()))?;
        if new.initial_stock.is_negative() {
            return Err(DbError::InvalidInput(format!(
                "initial stock must not be negative: {}",
                new.initial_stock
            )));
        }

        debug!(id = %new.id, barcode = %new.barcode, "Inserting variant");

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO variants (
                id, product_ref, size, color, barcode,
                unit_price_cents, available_milli, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
            "#,
        )
        .bind(&new.id)
        .bind(&new.product_ref)
        .bind(&new.size)
        .bind(&new.color)
        .bind(&new.barcode)
        .bind(new.unit_price.cents())
        .bind(new.initial_stock.milli())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::duplicate(field, &new.barcode),
            other => other,
        })?;

        if new.initial_stock.is_positive() {
            record_movement(
                &mut tx,
                &new.id,
                None,
                MovementReason::Restock,
                new.initial_stock,
                new.initial_stock,
                now,
            )
            .await?;
        }

        tx.commit().await?;

        Ok(Variant {
            id: new.id.clone(),
            product_ref: new.product_ref.clone(),
            size: new.size.clone(),
            color: new.color.clone(),
            barcode: new.barcode.clone(),
            unit_price: new.unit_price,
            available: new.initial_stock,
            created_at: now,
            updated_at: now,
        })
    }

    /// Gets a variant by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Variant>> {
        let row: Option<VariantRow> = sqlx::query_as(
            r#"
            SELECT id, product_ref, size, color, barcode,
                   unit_price_cents, available_milli, created_at, updated_at
            FROM variants
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Variant::from))
    }

    /// Gets a variant by barcode (scanner lookup).
    pub async fn get_by_barcode(&self, barcode: &str) -> DbResult<Option<Variant>> {
        let row: Option<VariantRow> = sqlx::query_as(
            r#"
            SELECT id, product_ref, size, color, barcode,
                   unit_price_cents, available_milli, created_at, updated_at
            FROM variants
            WHERE barcode = ?1
            "#,
        )
        .bind(barcode.trim())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Variant::from))
    }

    /// All variants of one catalog product, ordered by size then color.
    pub async fn list_for_product(&self, product_ref: &str) -> DbResult<Vec<Variant>> {
        let rows: Vec<VariantRow> = sqlx::query_as(
            r#"
            SELECT id, product_ref, size, color, barcode,
                   unit_price_cents, available_milli, created_at, updated_at
            FROM variants
            WHERE product_ref = ?1
            ORDER BY size, color, id
            "#,
        )
        .bind(product_ref)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Variant::from).collect())
    }

    /// Changes the catalog price.
    ///
    /// Lines already written keep the price they were sold at.
    pub async fn set_price(&self, id: &str, unit_price: Money) -> DbResult<()> {
        validate_unit_price(unit_price).map_err(|e| DbError::InvalidInput(e.to_string()))?;
        debug!(id = %id, price = %unit_price, "Updating variant price");

        let result = sqlx::query(
            r#"
            UPDATE variants
            SET unit_price_cents = ?2, updated_at = ?3, version = version + 1
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(unit_price.cents())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Variant", id));
        }

        Ok(())
    }

    /// Counts variants (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM variants")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

/// Helper to generate a new variant ID.
pub fn generate_variant_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Row Mapping
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct VariantRow {
    id: String,
    product_ref: String,
    size: Option<String>,
    color: Option<String>,
    barcode: String,
    unit_price_cents: i64,
    available_milli: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<VariantRow> for Variant {
    fn from(row: VariantRow) -> Self {
        Variant {
            id: row.id,
            product_ref: row.product_ref,
            size: row.size,
            color: row.color,
            barcode: row.barcode,
            unit_price: Money::from_cents(row.unit_price_cents),
            available: Quantity::from_milli(row.available_milli),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.variants();

        let inserted = repo
            .insert(
                &NewVariant::new("TSHIRT-BASIC", "4006381333931", Money::from_cents(1999))
                    .size("M")
                    .color("Navy")
                    .stock(Quantity::from_units(12)),
            )
            .await
            .unwrap();

        let by_id = repo.get_by_id(&inserted.id).await.unwrap().unwrap();
        assert_eq!(by_id.barcode, "4006381333931");
        assert_eq!(by_id.size.as_deref(), Some("M"));
        assert_eq!(by_id.available, Quantity::from_units(12));

        let by_barcode = repo.get_by_barcode("4006381333931").await.unwrap().unwrap();
        assert_eq!(by_barcode.id, inserted.id);

        assert!(repo.get_by_id("missing").await.unwrap().is_none());
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_barcode_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.variants();

        repo.insert(&NewVariant::new("JEANS", "96385074", Money::from_cents(4999)))
            .await
            .unwrap();
        let err = repo
            .insert(&NewVariant::new("JEANS", "96385074", Money::from_cents(4999)))
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::UniqueViolation { value, .. } if value == "96385074"));
    }

    #[tokio::test]
    async fn test_set_price_and_list() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.variants();

        let small = repo
            .insert(&NewVariant::new("HOODIE", "12345670", Money::from_cents(3500)).size("S"))
            .await
            .unwrap();
        repo.insert(&NewVariant::new("HOODIE", "12345671", Money::from_cents(3500)).size("L"))
            .await
            .unwrap();

        repo.set_price(&small.id, Money::from_cents(2900)).await.unwrap();
        let variants = repo.list_for_product("HOODIE").await.unwrap();
        assert_eq!(variants.len(), 2);
        assert_eq!(variants[0].size.as_deref(), Some("L"));
        assert_eq!(variants[1].unit_price, Money::from_cents(2900));

        assert!(matches!(
            repo.set_price("missing", Money::from_cents(1)).await,
            Err(DbError::NotFound { .. })
        ));
        assert!(repo.set_price(&small.id, Money::from_cents(-1)).await.is_err());
    }
}
