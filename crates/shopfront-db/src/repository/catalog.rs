//! # Catalog Repository
//!
//! Reads the current state of the variants in a cart.
//!
//! ## Snapshot Read
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  CartLine { product_id, variant_id }                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  variants ⋈ products                                                    │
//! │    WHERE variant, product AND store all match                           │
//! │      AND neither row is deleted or inactive                             │
//! │       │                                                                 │
//! │       ├── no row → NotFound (never reveals another store's catalog)     │
//! │       ▼                                                                 │
//! │  + best active attached discount for the order's channel and date       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  VariantSnapshot (read fresh per attempt, never cached)                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Pure reads, except for the fixture inserts at the bottom, which the seed
//! binary and tests use to build a catalog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::discount::DirectDiscountRow;
use shopfront_core::{
    select_attached_discount, CartLine, Channel, DirectDiscount, OptionMap, VariantSnapshot,
};

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, FromRow)]
struct VariantRow {
    variant_id: String,
    product_id: String,
    category_id: Option<String>,
    product_name: String,
    sku: String,
    barcode: Option<String>,
    image_url: Option<String>,
    options_json: String,
    price_cents: i64,
    tax_rate_bps: i64,
    inventory_on_hand: i64,
}

impl VariantRow {
    fn into_snapshot(self) -> DbResult<VariantSnapshot> {
        let options: OptionMap = serde_json::from_str(&self.options_json)
            .map_err(|e| DbError::corrupt("variant options", e.to_string()))?;
        let tax_rate_bps = u32::try_from(self.tax_rate_bps)
            .map_err(|e| DbError::corrupt("variant tax rate", e.to_string()))?;

        Ok(VariantSnapshot {
            variant_id: self.variant_id,
            product_id: self.product_id,
            category_id: self.category_id,
            product_name: self.product_name,
            sku: self.sku,
            barcode: self.barcode,
            image_url: self.image_url,
            options,
            unit_price_cents: self.price_cents,
            tax_rate_bps,
            inventory_on_hand: self.inventory_on_hand,
            attached_discount: None,
        })
    }
}

// =============================================================================
// Fixture Inputs
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub id: String,
    pub store_id: String,
    pub category_id: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewVariant {
    pub id: String,
    pub product_id: String,
    pub sku: String,
    pub barcode: Option<String>,
    pub image_url: Option<String>,
    pub options: OptionMap,
    pub price_cents: i64,
    pub tax_rate_bps: u32,
    pub inventory_on_hand: i64,
}

impl NewVariant {
    pub fn new(
        id: impl Into<String>,
        product_id: impl Into<String>,
        sku: impl Into<String>,
        price_cents: i64,
        tax_rate_bps: u32,
        inventory_on_hand: i64,
    ) -> Self {
        NewVariant {
            id: id.into(),
            product_id: product_id.into(),
            sku: sku.into(),
            barcode: None,
            image_url: None,
            options: OptionMap::new(),
            price_cents,
            tax_rate_bps,
            inventory_on_hand,
        }
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for catalog reads.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    /// Creates a new CatalogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    /// Loads one snapshot per cart line, in cart order.
    ///
    /// ## Errors
    /// `NotFound` when a variant is missing, deleted, inactive, belongs to a
    /// different product than the cart claims, or to another store.
    pub async fn load_snapshots(
        &self,
        store_id: &str,
        lines: &[CartLine],
        channel: Channel,
        now: DateTime<Utc>,
    ) -> DbResult<Vec<VariantSnapshot>> {
        debug!(store_id = %store_id, lines = lines.len(), "Loading variant snapshots");

        let mut snapshots = Vec::with_capacity(lines.len());
        for line in lines {
            let row: Option<VariantRow> = sqlx::query_as(
                r#"
                SELECT
                    v.id AS variant_id,
                    v.product_id,
                    p.category_id,
                    p.name AS product_name,
                    v.sku,
                    v.barcode,
                    v.image_url,
                    v.options_json,
                    v.price_cents,
                    v.tax_rate_bps,
                    v.inventory_on_hand
                FROM variants v
                JOIN products p ON p.id = v.product_id
                WHERE v.id = ?1
                  AND v.product_id = ?2
                  AND p.store_id = ?3
                  AND v.deleted_at IS NULL
                  AND p.deleted_at IS NULL
                  AND v.is_active = 1
                  AND p.is_active = 1
                "#,
            )
            .bind(&line.variant_id)
            .bind(&line.product_id)
            .bind(store_id)
            .fetch_optional(&self.pool)
            .await?;

            let row = row.ok_or_else(|| DbError::not_found("Variant", line.variant_id.clone()))?;
            let mut snapshot = row.into_snapshot()?;

            let candidates = self
                .attached_discounts(store_id, &snapshot.variant_id, &snapshot.product_id)
                .await?;
            snapshot.attached_discount = select_attached_discount(
                &candidates,
                &snapshot.variant_id,
                &snapshot.product_id,
                now,
                channel,
            );

            snapshots.push(snapshot);
        }

        Ok(snapshots)
    }

    /// All discounts attached to a variant or its product, active or not.
    pub async fn attached_discounts(
        &self,
        store_id: &str,
        variant_id: &str,
        product_id: &str,
    ) -> DbResult<Vec<DirectDiscount>> {
        let rows: Vec<DirectDiscountRow> = sqlx::query_as(
            r#"
            SELECT
                id, product_id, variant_id, rate_bps,
                enabled, available_online, available_in_store,
                valid_from, valid_to
            FROM discounts
            WHERE store_id = ?1
              AND (variant_id = ?2 OR (variant_id IS NULL AND product_id = ?3))
            ORDER BY id
            "#,
        )
        .bind(store_id)
        .bind(variant_id)
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DirectDiscountRow::into_discount).collect()
    }

    /// Whether the customer exists and belongs to the store.
    pub async fn customer_exists(&self, store_id: &str, customer_id: &str) -> DbResult<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM customers WHERE id = ?1 AND store_id = ?2 AND deleted_at IS NULL",
        )
        .bind(customer_id)
        .bind(store_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    /// Current stock of a variant.
    pub async fn inventory_of(&self, variant_id: &str) -> DbResult<i64> {
        let on_hand: Option<i64> =
            sqlx::query_scalar("SELECT inventory_on_hand FROM variants WHERE id = ?1")
                .bind(variant_id)
                .fetch_optional(&self.pool)
                .await?;

        on_hand.ok_or_else(|| DbError::not_found("Variant", variant_id))
    }

    /// Store currency, `None` if the store does not exist.
    pub async fn store_currency(&self, store_id: &str) -> DbResult<Option<String>> {
        let currency: Option<String> =
            sqlx::query_scalar("SELECT currency FROM stores WHERE id = ?1")
                .bind(store_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(currency)
    }

    // =========================================================================
    // Fixtures
    // =========================================================================

    pub async fn insert_store(&self, id: &str, name: &str, currency: &str) -> DbResult<()> {
        sqlx::query("INSERT INTO stores (id, name, currency, created_at) VALUES (?1, ?2, ?3, ?4)")
            .bind(id)
            .bind(name)
            .bind(currency)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn insert_category(
        &self,
        id: &str,
        store_id: &str,
        parent_id: Option<&str>,
        name: &str,
    ) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO categories (id, store_id, parent_id, name, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(id)
        .bind(store_id)
        .bind(parent_id)
        .bind(name)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn insert_product(&self, product: &NewProduct) -> DbResult<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO products (id, store_id, category_id, name, is_active, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5)
            "#,
        )
        .bind(&product.id)
        .bind(&product.store_id)
        .bind(&product.category_id)
        .bind(&product.name)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn insert_variant(&self, variant: &NewVariant) -> DbResult<()> {
        let now = Utc::now();
        let options_json = serde_json::to_string(&variant.options)?;

        sqlx::query(
            r#"
            INSERT INTO variants (
                id, product_id, sku, barcode, image_url, options_json,
                price_cents, tax_rate_bps, inventory_on_hand,
                is_active, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6,
                ?7, ?8, ?9,
                1, ?10, ?10
            )
            "#,
        )
        .bind(&variant.id)
        .bind(&variant.product_id)
        .bind(&variant.sku)
        .bind(&variant.barcode)
        .bind(&variant.image_url)
        .bind(options_json)
        .bind(variant.price_cents)
        .bind(variant.tax_rate_bps as i64)
        .bind(variant.inventory_on_hand)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn insert_customer(&self, id: &str, store_id: &str, name: &str) -> DbResult<()> {
        sqlx::query("INSERT INTO customers (id, store_id, name, created_at) VALUES (?1, ?2, ?3, ?4)")
            .bind(id)
            .bind(store_id)
            .bind(name)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Changes a variant's catalog price (later orders only).
    pub async fn set_variant_price(&self, variant_id: &str, price_cents: i64) -> DbResult<()> {
        let result = sqlx::query("UPDATE variants SET price_cents = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(variant_id)
            .bind(price_cents)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Variant", variant_id));
        }

        Ok(())
    }

    /// Soft-deletes a product; its variants stop resolving.
    pub async fn delete_product(&self, product_id: &str) -> DbResult<()> {
        let result = sqlx::query("UPDATE products SET deleted_at = ?2, updated_at = ?2 WHERE id = ?1")
            .bind(product_id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", product_id));
        }

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
