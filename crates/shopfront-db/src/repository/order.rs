//! # Order Repository
//!
//! The settlement commit and order reads.
//!
//! ## Commit Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   SINGLE TRANSACTION (commit)                           │
//! │                                                                         │
//! │  1. For each variant, sorted by id:                                     │
//! │       UPDATE variants                                                   │
//! │          SET inventory_on_hand = inventory_on_hand - :qty               │
//! │        WHERE id = :variant AND inventory_on_hand >= :qty                │
//! │       0 rows → StockConflict (a concurrent order won)                   │
//! │                                                                         │
//! │     The first statement is a write, so the transaction holds SQLite's  │
//! │     writer lock from here on and every read below is serialized.       │
//! │                                                                         │
//! │  2. Next order number for the store and day: YYYYMMDD-NNNN              │
//! │  3. INSERT orders, order_lines, payments                                │
//! │  4. Discount code: used_count + 1                                       │
//! │       WHERE usage_limit IS NULL OR used_count < usage_limit             │
//! │       0 rows → UsageLimitReached                                        │
//! │  5. INSERT notifications (ORDER_PLACED)                                 │
//! │                                                                         │
//! │  COMMIT ← all five or none. Any early return drops the transaction,     │
//! │           which rolls it back.                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::repository::notification::{insert_entry, NotificationEntry};
use shopfront_core::{
    Channel, DiscountSource, OptionMap, Order, OrderLine, OrderPlacedEvent, OrderStatus,
    OrderTotals, Payment, PaymentMethod, PaymentState, PaymentStatus,
};

// =============================================================================
// Input
// =============================================================================

/// A fully priced and reconciled order, ready to commit.
///
/// The order number is assigned inside the transaction.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: String,
    pub store_id: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub source: Channel,
    pub customer_id: Option<String>,
    pub operator_id: Option<String>,
    pub currency: String,
    pub totals: OrderTotals,
    pub discount_code: Option<String>,
    pub discount_code_id: Option<String>,
    pub order_discount: Option<String>,
    pub idempotency_key: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub lines: Vec<OrderLine>,
    pub payments: Vec<Payment>,
}

impl NewOrder {
    /// Quantity to take off each variant, ordered by variant id.
    ///
    /// A fixed lock order across all commits keeps concurrent decrements
    /// from interleaving differently per transaction.
    pub fn decrements(&self) -> BTreeMap<&str, i64> {
        let mut decrements = BTreeMap::new();
        for line in &self.lines {
            *decrements.entry(line.variant_id.as_str()).or_insert(0) += line.quantity;
        }
        decrements
    }

    fn into_order(self, order_number: String) -> Order {
        Order {
            id: self.id,
            store_id: self.store_id,
            order_number,
            status: self.status,
            payment_status: self.payment_status,
            source: self.source,
            customer_id: self.customer_id,
            operator_id: self.operator_id,
            currency: self.currency,
            subtotal_excl_tax_cents: self.totals.subtotal_excl_tax.cents(),
            tax_cents: self.totals.tax.cents(),
            discount_total_cents: self.totals.discount_total.cents(),
            total_cents: self.totals.total.cents(),
            discount_code: self.discount_code,
            discount_code_id: self.discount_code_id,
            order_discount: self.order_discount,
            idempotency_key: self.idempotency_key,
            notes: self.notes,
            created_at: self.created_at,
            lines: self.lines,
            payments: self.payments,
        }
    }
}

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, FromRow)]
struct OrderRow {
    id: String,
    store_id: String,
    order_number: String,
    status: OrderStatus,
    payment_status: PaymentStatus,
    source: Channel,
    customer_id: Option<String>,
    operator_id: Option<String>,
    currency: String,
    subtotal_excl_tax_cents: i64,
    tax_cents: i64,
    discount_total_cents: i64,
    total_cents: i64,
    discount_code: Option<String>,
    discount_code_id: Option<String>,
    order_discount: Option<String>,
    idempotency_key: Option<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct OrderLineRow {
    id: String,
    order_id: String,
    product_id: String,
    variant_id: String,
    product_name: String,
    sku: String,
    barcode: Option<String>,
    image_url: Option<String>,
    options_json: String,
    tax_rate_bps: i64,
    original_unit_price_cents: i64,
    quantity: i64,
    discount_bps: i64,
    discount_source: DiscountSource,
    discount_cents: i64,
    unit_price_cents: i64,
    line_total_cents: i64,
    line_excl_tax_cents: i64,
    line_tax_cents: i64,
    created_at: DateTime<Utc>,
}

impl OrderLineRow {
    fn into_line(self) -> DbResult<OrderLine> {
        let options: OptionMap = serde_json::from_str(&self.options_json)
            .map_err(|e| DbError::corrupt("order line options", e.to_string()))?;
        let tax_rate_bps = u32::try_from(self.tax_rate_bps)
            .map_err(|e| DbError::corrupt("order line tax rate", e.to_string()))?;
        let discount_bps = u32::try_from(self.discount_bps)
            .map_err(|e| DbError::corrupt("order line discount", e.to_string()))?;

        Ok(OrderLine {
            id: self.id,
            order_id: self.order_id,
            product_id: self.product_id,
            variant_id: self.variant_id,
            product_name: self.product_name,
            sku: self.sku,
            barcode: self.barcode,
            image_url: self.image_url,
            options,
            tax_rate_bps,
            original_unit_price_cents: self.original_unit_price_cents,
            quantity: self.quantity,
            discount_bps,
            discount_source: self.discount_source,
            discount_cents: self.discount_cents,
            unit_price_cents: self.unit_price_cents,
            line_total_cents: self.line_total_cents,
            line_excl_tax_cents: self.line_excl_tax_cents,
            line_tax_cents: self.line_tax_cents,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct PaymentRow {
    id: String,
    order_id: String,
    method: PaymentMethod,
    amount_cents: i64,
    cash_given_cents: Option<i64>,
    cash_change_cents: Option<i64>,
    check_number: Option<String>,
    check_bank: Option<String>,
    check_date: Option<NaiveDate>,
    reference: Option<String>,
    state: PaymentState,
    created_at: DateTime<Utc>,
}

impl From<PaymentRow> for Payment {
    fn from(row: PaymentRow) -> Self {
        Payment {
            id: row.id,
            order_id: row.order_id,
            method: row.method,
            amount_cents: row.amount_cents,
            cash_given_cents: row.cash_given_cents,
            cash_change_cents: row.cash_change_cents,
            check_number: row.check_number,
            check_bank: row.check_bank,
            check_date: row.check_date,
            reference: row.reference,
            state: row.state,
            created_at: row.created_at,
        }
    }
}

const ORDER_COLUMNS: &str = r#"
    id, store_id, order_number, status, payment_status, source,
    customer_id, operator_id, currency,
    subtotal_excl_tax_cents, tax_cents, discount_total_cents, total_cents,
    discount_code, discount_code_id, order_discount,
    idempotency_key, notes, created_at
"#;

// =============================================================================
// Repository
// =============================================================================

/// Repository for order operations.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Atomically commits a settled order.
    ///
    /// ## Errors
    /// - `StockConflict` if any variant no longer has enough stock
    /// - `UsageLimitReached` if the code was used up concurrently
    /// - `UniqueViolation` on a duplicate idempotency key or order number
    ///
    /// On any error nothing is written.
    pub async fn commit(&self, new: NewOrder) -> DbResult<Order> {
        debug!(
            order_id = %new.id,
            store_id = %new.store_id,
            lines = new.lines.len(),
            payments = new.payments.len(),
            "Committing order"
        );

        let mut tx = self.pool.begin().await?;

        // 1. Inventory: check and decrement in one statement per variant
        for (variant_id, quantity) in new.decrements() {
            let result = sqlx::query(
                r#"
                UPDATE variants SET
                    inventory_on_hand = inventory_on_hand - ?2,
                    updated_at = ?3
                WHERE id = ?1 AND inventory_on_hand >= ?2
                "#,
            )
            .bind(variant_id)
            .bind(quantity)
            .bind(new.created_at)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                warn!(variant_id = %variant_id, requested = quantity, "Stock conflict at commit");
                return Err(DbError::StockConflict {
                    variant_id: variant_id.to_string(),
                    requested: quantity,
                });
            }
        }

        // 2. Order number
        let order_number = next_order_number(&mut tx, &new.store_id, new.created_at).await?;

        // 3. Order, lines, payments
        insert_order(&mut tx, &new, &order_number).await?;

        for (position, line) in new.lines.iter().enumerate() {
            insert_line(&mut tx, line, position as i64).await?;
        }

        for (position, payment) in new.payments.iter().enumerate() {
            insert_payment(&mut tx, payment, position as i64).await?;
        }

        // 4. Discount code usage
        if let Some(code_id) = &new.discount_code_id {
            let result = sqlx::query(
                r#"
                UPDATE discount_codes SET used_count = used_count + 1
                WHERE id = ?1 AND (usage_limit IS NULL OR used_count < usage_limit)
                "#,
            )
            .bind(code_id)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                warn!(code_id = %code_id, "Discount code exhausted at commit");
                return Err(DbError::UsageLimitReached {
                    code_id: code_id.clone(),
                });
            }
        }

        // 5. Notification
        let event = OrderPlacedEvent {
            order_id: new.id.clone(),
            order_number: order_number.clone(),
            store_id: new.store_id.clone(),
            channel: new.source,
            total_cents: new.totals.total.cents(),
            payment_status: new.payment_status,
            customer_id: new.customer_id.clone(),
        };
        let entry = NotificationEntry::new(
            &new.store_id,
            OrderPlacedEvent::KIND,
            &new.id,
            serde_json::to_string(&event)?,
            new.created_at,
        );
        insert_entry(&mut tx, &entry).await?;

        tx.commit().await?;

        info!(
            order_id = %new.id,
            order_number = %order_number,
            total_cents = new.totals.total.cents(),
            "Order committed"
        );

        Ok(new.into_order(order_number))
    }

    /// Gets an order with its lines and payments, scoped to the store.
    pub async fn get_by_id(&self, store_id: &str, id: &str) -> DbResult<Option<Order>> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {} FROM orders WHERE store_id = ?1 AND id = ?2",
            ORDER_COLUMNS
        ))
        .bind(store_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    /// Finds the order an earlier submission with this key produced.
    pub async fn find_by_idempotency_key(
        &self,
        store_id: &str,
        key: &str,
    ) -> DbResult<Option<Order>> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {} FROM orders WHERE store_id = ?1 AND idempotency_key = ?2",
            ORDER_COLUMNS
        ))
        .bind(store_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    /// Number of orders a store has.
    pub async fn count_for_store(&self, store_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE store_id = ?1")
            .bind(store_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn hydrate(&self, row: OrderRow) -> DbResult<Order> {
        let lines: Vec<OrderLineRow> = sqlx::query_as(
            r#"
            SELECT
                id, order_id, product_id, variant_id, product_name, sku,
                barcode, image_url, options_json, tax_rate_bps,
                original_unit_price_cents, quantity, discount_bps,
                discount_source, discount_cents, unit_price_cents,
                line_total_cents, line_excl_tax_cents, line_tax_cents,
                created_at
            FROM order_lines
            WHERE order_id = ?1
            ORDER BY position
            "#,
        )
        .bind(&row.id)
        .fetch_all(&self.pool)
        .await?;

        let payments: Vec<PaymentRow> = sqlx::query_as(
            r#"
            SELECT
                id, order_id, method, amount_cents,
                cash_given_cents, cash_change_cents,
                check_number, check_bank, check_date,
                reference, state, created_at
            FROM payments
            WHERE order_id = ?1
            ORDER BY position
            "#,
        )
        .bind(&row.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Order {
            id: row.id,
            store_id: row.store_id,
            order_number: row.order_number,
            status: row.status,
            payment_status: row.payment_status,
            source: row.source,
            customer_id: row.customer_id,
            operator_id: row.operator_id,
            currency: row.currency,
            subtotal_excl_tax_cents: row.subtotal_excl_tax_cents,
            tax_cents: row.tax_cents,
            discount_total_cents: row.discount_total_cents,
            total_cents: row.total_cents,
            discount_code: row.discount_code,
            discount_code_id: row.discount_code_id,
            order_discount: row.order_discount,
            idempotency_key: row.idempotency_key,
            notes: row.notes,
            created_at: row.created_at,
            lines: lines
                .into_iter()
                .map(OrderLineRow::into_line)
                .collect::<DbResult<Vec<_>>>()?,
            payments: payments.into_iter().map(Payment::from).collect(),
        })
    }
}

// =============================================================================
// Transaction Steps
// =============================================================================

/// Next order number for the store on the order's (UTC) day.
///
/// ## Format
/// `YYYYMMDD-NNNN`, e.g. `20240615-0007`. The sequence restarts daily and
/// widens past 9999 rather than wrapping.
async fn next_order_number(
    conn: &mut SqliteConnection,
    store_id: &str,
    created_at: DateTime<Utc>,
) -> DbResult<String> {
    let day = created_at.format("%Y%m%d").to_string();

    let last: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT MAX(CAST(substr(order_number, 10) AS INTEGER))
        FROM orders
        WHERE store_id = ?1 AND order_number LIKE ?2
        "#,
    )
    .bind(store_id)
    .bind(format!("{}-%", day))
    .fetch_one(&mut *conn)
    .await?;

    Ok(format_order_number(&day, last.unwrap_or(0) + 1))
}

fn format_order_number(day: &str, sequence: i64) -> String {
    format!("{}-{:04}", day, sequence)
}

async fn insert_order(
    conn: &mut SqliteConnection,
    new: &NewOrder,
    order_number: &str,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO orders (
            id, store_id, order_number, status, payment_status, source,
            customer_id, operator_id, currency,
            subtotal_excl_tax_cents, tax_cents, discount_total_cents, total_cents,
            discount_code, discount_code_id, order_discount,
            idempotency_key, notes, created_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6,
            ?7, ?8, ?9,
            ?10, ?11, ?12, ?13,
            ?14, ?15, ?16,
            ?17, ?18, ?19
        )
        "#,
    )
    .bind(&new.id)
    .bind(&new.store_id)
    .bind(order_number)
    .bind(new.status)
    .bind(new.payment_status)
    .bind(new.source)
    .bind(&new.customer_id)
    .bind(&new.operator_id)
    .bind(&new.currency)
    .bind(new.totals.subtotal_excl_tax.cents())
    .bind(new.totals.tax.cents())
    .bind(new.totals.discount_total.cents())
    .bind(new.totals.total.cents())
    .bind(&new.discount_code)
    .bind(&new.discount_code_id)
    .bind(&new.order_discount)
    .bind(&new.idempotency_key)
    .bind(&new.notes)
    .bind(new.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn insert_line(conn: &mut SqliteConnection, line: &OrderLine, position: i64) -> DbResult<()> {
    let options_json = serde_json::to_string(&line.options)?;

    sqlx::query(
        r#"
        INSERT INTO order_lines (
            id, order_id, position, product_id, variant_id, product_name, sku,
            barcode, image_url, options_json, tax_rate_bps,
            original_unit_price_cents, quantity, discount_bps,
            discount_source, discount_cents, unit_price_cents,
            line_total_cents, line_excl_tax_cents, line_tax_cents,
            created_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7,
            ?8, ?9, ?10, ?11,
            ?12, ?13, ?14,
            ?15, ?16, ?17,
            ?18, ?19, ?20,
            ?21
        )
        "#,
    )
    .bind(&line.id)
    .bind(&line.order_id)
    .bind(position)
    .bind(&line.product_id)
    .bind(&line.variant_id)
    .bind(&line.product_name)
    .bind(&line.sku)
    .bind(&line.barcode)
    .bind(&line.image_url)
    .bind(options_json)
    .bind(line.tax_rate_bps as i64)
    .bind(line.original_unit_price_cents)
    .bind(line.quantity)
    .bind(line.discount_bps as i64)
    .bind(line.discount_source)
    .bind(line.discount_cents)
    .bind(line.unit_price_cents)
    .bind(line.line_total_cents)
    .bind(line.line_excl_tax_cents)
    .bind(line.line_tax_cents)
    .bind(line.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn insert_payment(
    conn: &mut SqliteConnection,
    payment: &Payment,
    position: i64,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO payments (
            id, order_id, position, method, amount_cents,
            cash_given_cents, cash_change_cents,
            check_number, check_bank, check_date,
            reference, state, created_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5,
            ?6, ?7,
            ?8, ?9, ?10,
            ?11, ?12, ?13
        )
        "#,
    )
    .bind(&payment.id)
    .bind(&payment.order_id)
    .bind(position)
    .bind(payment.method)
    .bind(payment.amount_cents)
    .bind(payment.cash_given_cents)
    .bind(payment.cash_change_cents)
    .bind(&payment.check_number)
    .bind(&payment.check_bank)
    .bind(payment.check_date)
    .bind(&payment.reference)
    .bind(payment.state)
    .bind(payment.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
