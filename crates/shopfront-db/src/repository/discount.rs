//! # Discount Repository
//!
//! Loads attached discounts and discount codes, and writes fixtures.
//!
//! Code lookup is case-insensitive (`COLLATE NOCASE`) and scoped to the
//! store; the usage counter itself is only ever incremented inside the
//! order commit transaction (see `order.rs`).

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use shopfront_core::{Availability, DirectDiscount, DiscountCode, DiscountRate};

fn rate_from_row(entity: &str, bps: i64) -> DbResult<DiscountRate> {
    let bps = u32::try_from(bps).map_err(|e| DbError::corrupt(entity, e.to_string()))?;
    DiscountRate::from_bps(bps).map_err(|e| DbError::corrupt(entity, e.to_string()))
}

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, FromRow)]
pub(crate) struct DirectDiscountRow {
    id: String,
    product_id: Option<String>,
    variant_id: Option<String>,
    rate_bps: i64,
    enabled: bool,
    available_online: bool,
    available_in_store: bool,
    valid_from: Option<DateTime<Utc>>,
    valid_to: Option<DateTime<Utc>>,
}

impl DirectDiscountRow {
    pub(crate) fn into_discount(self) -> DbResult<DirectDiscount> {
        Ok(DirectDiscount {
            rate: rate_from_row("discount", self.rate_bps)?,
            id: self.id,
            product_id: self.product_id,
            variant_id: self.variant_id,
            availability: Availability {
                enabled: self.enabled,
                available_online: self.available_online,
                available_in_store: self.available_in_store,
                valid_from: self.valid_from,
                valid_to: self.valid_to,
            },
        })
    }
}

#[derive(Debug, FromRow)]
struct DiscountCodeRow {
    id: String,
    code: String,
    rate_bps: i64,
    enabled: bool,
    available_online: bool,
    available_in_store: bool,
    valid_from: Option<DateTime<Utc>>,
    valid_to: Option<DateTime<Utc>>,
    usage_limit: Option<i64>,
    used_count: i64,
    category_id: Option<String>,
}

/// An attached discount together with the store that owns it.
#[derive(Debug, Clone)]
pub struct NewDiscount {
    pub store_id: String,
    pub discount: DirectDiscount,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for discount reads and fixtures.
#[derive(Debug, Clone)]
pub struct DiscountRepository {
    pool: SqlitePool,
}

impl DiscountRepository {
    /// Creates a new DiscountRepository.
    pub fn new(pool: SqlitePool) -> Self {
        DiscountRepository { pool }
    }

    /// Looks up a code by its text, ignoring case and surrounding spaces.
    pub async fn find_code(&self, store_id: &str, code: &str) -> DbResult<Option<DiscountCode>> {
        let code = code.trim();
        debug!(store_id = %store_id, code = %code, "Looking up discount code");

        let row: Option<DiscountCodeRow> = sqlx::query_as(
            r#"
            SELECT
                id, code, rate_bps,
                enabled, available_online, available_in_store,
                valid_from, valid_to,
                usage_limit, used_count, category_id
            FROM discount_codes
            WHERE store_id = ?1 AND code = ?2 COLLATE NOCASE
            "#,
        )
        .bind(store_id)
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let product_ids: Vec<String> = sqlx::query_scalar(
            "SELECT product_id FROM discount_code_products WHERE code_id = ?1 ORDER BY product_id",
        )
        .bind(&row.id)
        .fetch_all(&self.pool)
        .await?;

        let variant_ids: Vec<String> = sqlx::query_scalar(
            "SELECT variant_id FROM discount_code_variants WHERE code_id = ?1 ORDER BY variant_id",
        )
        .bind(&row.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(DiscountCode {
            rate: rate_from_row("discount code", row.rate_bps)?,
            id: row.id,
            code: row.code,
            availability: Availability {
                enabled: row.enabled,
                available_online: row.available_online,
                available_in_store: row.available_in_store,
                valid_from: row.valid_from,
                valid_to: row.valid_to,
            },
            usage_limit: row.usage_limit,
            used_count: row.used_count,
            variant_ids,
            product_ids,
            category_id: row.category_id,
        }))
    }

    /// Current redemption count of a code.
    pub async fn used_count(&self, code_id: &str) -> DbResult<i64> {
        let count: Option<i64> =
            sqlx::query_scalar("SELECT used_count FROM discount_codes WHERE id = ?1")
                .bind(code_id)
                .fetch_optional(&self.pool)
                .await?;

        count.ok_or_else(|| DbError::not_found("Discount code", code_id))
    }

    // =========================================================================
    // Fixtures
    // =========================================================================

    /// Inserts a code with its product and variant targets in one transaction.
    pub async fn insert_code(&self, store_id: &str, code: &DiscountCode) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO discount_codes (
                id, store_id, code, rate_bps,
                enabled, available_online, available_in_store,
                valid_from, valid_to,
                usage_limit, used_count, category_id, created_at
            ) VALUES (
                ?1, ?2, ?3, ?4,
                ?5, ?6, ?7,
                ?8, ?9,
                ?10, ?11, ?12, ?13
            )
            "#,
        )
        .bind(&code.id)
        .bind(store_id)
        .bind(code.code.trim())
        .bind(code.rate.bps() as i64)
        .bind(code.availability.enabled)
        .bind(code.availability.available_online)
        .bind(code.availability.available_in_store)
        .bind(code.availability.valid_from)
        .bind(code.availability.valid_to)
        .bind(code.usage_limit)
        .bind(code.used_count)
        .bind(&code.category_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        for product_id in &code.product_ids {
            sqlx::query("INSERT INTO discount_code_products (code_id, product_id) VALUES (?1, ?2)")
                .bind(&code.id)
                .bind(product_id)
                .execute(&mut *tx)
                .await?;
        }

        for variant_id in &code.variant_ids {
            sqlx::query("INSERT INTO discount_code_variants (code_id, variant_id) VALUES (?1, ?2)")
                .bind(&code.id)
                .bind(variant_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn insert_discount(&self, new: &NewDiscount) -> DbResult<()> {
        let d = &new.discount;

        sqlx::query(
            r#"
            INSERT INTO discounts (
                id, store_id, product_id, variant_id, rate_bps,
                enabled, available_online, available_in_store,
                valid_from, valid_to, created_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7, ?8,
                ?9, ?10, ?11
            )
            "#,
        )
        .bind(&d.id)
        .bind(&new.store_id)
        .bind(&d.product_id)
        .bind(&d.variant_id)
        .bind(d.rate.bps() as i64)
        .bind(d.availability.enabled)
        .bind(d.availability.available_online)
        .bind(d.availability.available_in_store)
        .bind(d.availability.valid_from)
        .bind(d.availability.valid_to)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
