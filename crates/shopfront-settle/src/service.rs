//! # Settlement Service
//!
//! Drives one order through the settlement stages.
//!
//! ## Stages
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  settle_order(request)                                                  │
//! │       │                                                                 │
//! │       ├── idempotency key seen before? ──► return that order            │
//! │       ▼                                                                 │
//! │  Validating         fresh snapshots, customer check, stock pre-check    │
//! │       ▼                                                                 │
//! │  Pricing            discount resolution, per-line and order totals      │
//! │       ▼                                                                 │
//! │  ReconcilingPayment instruments vs. total                               │
//! │       ▼                                                                 │
//! │  Committing         one transaction: decrement, insert, count, notify   │
//! │       │                                                                 │
//! │       ├── lost a stock race ──► back to Validating (once by default)    │
//! │       ▼                                                                 │
//! │  Committed                                                              │
//! │                                                                         │
//! │  Any other failure ──► Failed. Nothing was written.                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The stock pre-check in `Validating` only gives early, friendly errors.
//! The conditional decrement inside the commit transaction is what
//! prevents overselling.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use ts_rs::TS;
use uuid::Uuid;

use crate::config::SettlementConfig;
use crate::error::SettlementError;
use shopfront_core::validation::{normalize_cart, normalize_discount_code, validate_id, validate_notes};
use shopfront_core::{
    price_order, reconcile, resolve_discounts, CartLine, Channel, Clock, CodeRequest, CoreError,
    DiscountCode, DiscountRejection, Money, Order, OrderDiscount, OrderStatus, PaymentInput,
    PaymentStatus, PaymentTender, ResolvedLine, SettlementStage, SystemClock,
};
use shopfront_db::{Database, DbError, NewOrder};

// =============================================================================
// Request
// =============================================================================

/// One settlement submission.
///
/// `store_id` and `operator_id` come from the authenticated session and are
/// trusted as given.
///
/// ## Payments
/// Either `payments` (split tender, possibly empty) or the older single
/// `payment`, whose amount defaults to the order total. Not both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SettleRequest {
    pub store_id: String,
    pub channel: Channel,
    pub cart: Vec<CartLine>,
    #[serde(default)]
    pub payment: Option<PaymentTender>,
    #[serde(default)]
    pub payments: Option<Vec<PaymentTender>>,
    #[serde(default)]
    pub discount_code: Option<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub operator_id: Option<String>,
    /// Manual cashier discount on the whole order.
    #[serde(default)]
    pub order_discount: Option<OrderDiscount>,
    /// Repeating a key returns the order the first submission created.
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl SettleRequest {
    pub fn new(store_id: impl Into<String>, channel: Channel, cart: Vec<CartLine>) -> Self {
        SettleRequest {
            store_id: store_id.into(),
            channel,
            cart,
            payment: None,
            payments: None,
            discount_code: None,
            customer_id: None,
            operator_id: None,
            order_discount: None,
            idempotency_key: None,
            notes: None,
        }
    }

    pub fn with_payments(mut self, payments: Vec<PaymentTender>) -> Self {
        self.payments = Some(payments);
        self
    }

    /// Single legacy instrument.
    pub fn with_payment(mut self, payment: PaymentTender) -> Self {
        self.payment = Some(payment);
        self
    }

    pub fn with_discount_code(mut self, code: impl Into<String>) -> Self {
        self.discount_code = Some(code.into());
        self
    }

    pub fn with_customer(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    pub fn with_operator(mut self, operator_id: impl Into<String>) -> Self {
        self.operator_id = Some(operator_id.into());
        self
    }

    pub fn with_order_discount(mut self, discount: OrderDiscount) -> Self {
        self.order_discount = Some(discount);
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    fn payment_input(&self) -> Result<PaymentInput, SettlementError> {
        match (&self.payment, &self.payments) {
            (Some(_), Some(_)) => Err(SettlementError::invalid(
                "Send either payment or payments, not both",
            )),
            (Some(tender), None) => Ok(PaymentInput::Legacy(tender.clone())),
            (None, Some(tenders)) => Ok(PaymentInput::Split(tenders.clone())),
            (None, None) => Ok(PaymentInput::none()),
        }
    }
}

/// A request after input validation.
#[derive(Debug, Clone)]
struct ValidRequest {
    store_id: String,
    channel: Channel,
    cart: Vec<CartLine>,
    payments: PaymentInput,
    discount_code: Option<String>,
    customer_id: Option<String>,
    operator_id: Option<String>,
    order_discount: Option<OrderDiscount>,
    idempotency_key: Option<String>,
    notes: Option<String>,
}

fn optional_id(field: &str, value: Option<&str>) -> Result<Option<String>, SettlementError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(id) => Ok(Some(validate_id(field, id).map_err(CoreError::from)?)),
        None => Ok(None),
    }
}

// =============================================================================
// Attempt Outcome
// =============================================================================

/// The line whose stock a concurrent order took.
#[derive(Debug, Clone)]
struct ConflictedLine {
    product_id: String,
    variant_id: String,
    sku: String,
    requested: i64,
}

#[derive(Debug)]
enum AttemptFailure {
    /// Lost a race at commit; safe to start over from fresh snapshots.
    Conflict(Option<ConflictedLine>),
    Failed(SettlementError),
}

impl From<SettlementError> for AttemptFailure {
    fn from(err: SettlementError) -> Self {
        AttemptFailure::Failed(err)
    }
}

impl From<CoreError> for AttemptFailure {
    fn from(err: CoreError) -> Self {
        AttemptFailure::Failed(err.into())
    }
}

impl From<DbError> for AttemptFailure {
    fn from(err: DbError) -> Self {
        AttemptFailure::Failed(err.into())
    }
}

// =============================================================================
// Service
// =============================================================================

/// Settles orders against one database.
///
/// Holds no per-order state; share it freely between requests.
#[derive(Debug, Clone)]
pub struct SettlementService {
    db: Database,
    clock: Arc<dyn Clock>,
    config: SettlementConfig,
}

impl SettlementService {
    /// Creates a service that reads the wall clock.
    pub fn new(db: Database, config: SettlementConfig) -> Self {
        Self::with_clock(db, config, Arc::new(SystemClock))
    }

    /// Creates a service with an explicit time source.
    pub fn with_clock(db: Database, config: SettlementConfig, clock: Arc<dyn Clock>) -> Self {
        SettlementService { db, clock, config }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    /// Loads a committed order of the store.
    pub async fn get_order(&self, store_id: &str, order_id: &str) -> Result<Order, SettlementError> {
        self.db
            .orders()
            .get_by_id(store_id, order_id)
            .await?
            .ok_or_else(|| SettlementError::not_found("Order", order_id))
    }

    /// Settles one order.
    ///
    /// ## Returns
    /// The persisted order, including its number, lines and payments.
    ///
    /// ## Errors
    /// See [`SettlementError`]. On any error the store is left untouched.
    pub async fn settle_order(&self, request: SettleRequest) -> Result<Order, SettlementError> {
        let request = self.validate_request(request)?;

        debug!(
            store_id = %request.store_id,
            channel = %request.channel,
            lines = request.cart.len(),
            "Settling order"
        );

        if let Some(existing) = self.earlier_submission(&request).await? {
            info!(
                order_number = %existing.order_number,
                idempotency_key = ?request.idempotency_key,
                "Returning order of an earlier submission"
            );
            return Ok(existing);
        }

        self.check_store(&request.store_id).await?;

        let mut stage = SettlementStage::default();
        let mut conflicts = 0;
        loop {
            match self.attempt(&request, &mut stage).await {
                Ok(order) => return Ok(order),
                Err(AttemptFailure::Conflict(line)) => {
                    if let Some(existing) = self.settled_by_duplicate(&request, stage).await {
                        return Ok(existing);
                    }
                    if conflicts < self.config.conflict_retries {
                        conflicts += 1;
                        warn!(
                            store_id = %request.store_id,
                            variant_id = line.as_ref().map(|l| l.variant_id.as_str()).unwrap_or("-"),
                            retry = conflicts,
                            "Lost commit race, retrying from fresh snapshots"
                        );
                        stage = self.enter(stage, SettlementStage::Validating)?;
                        continue;
                    }
                    let err = self.conflict_exhausted(line).await;
                    self.fail(stage, &err);
                    return Err(err);
                }
                Err(AttemptFailure::Failed(err)) => {
                    // A duplicate that committed first also drains stock and code usage.
                    if let Some(existing) = self.settled_by_duplicate(&request, stage).await {
                        return Ok(existing);
                    }
                    self.fail(stage, &err);
                    return Err(err);
                }
            }
        }
    }

    // =========================================================================
    // Stages
    // =========================================================================

    async fn attempt(
        &self,
        request: &ValidRequest,
        stage: &mut SettlementStage,
    ) -> Result<Order, AttemptFailure> {
        let now = self.clock.now();
        let store_id = request.store_id.as_str();

        // Validating
        let snapshots = self
            .db
            .catalog()
            .load_snapshots(store_id, &request.cart, request.channel, now)
            .await?;

        if let Some(customer_id) = &request.customer_id {
            if !self.db.catalog().customer_exists(store_id, customer_id).await? {
                return Err(SettlementError::not_found("Customer", customer_id).into());
            }
        }

        let lines: Vec<ResolvedLine> = snapshots
            .into_iter()
            .zip(&request.cart)
            .map(|(snapshot, cart_line)| ResolvedLine {
                snapshot,
                quantity: cart_line.quantity,
            })
            .collect();

        for line in &lines {
            if line.snapshot.shortfall(line.quantity) > 0 {
                return Err(CoreError::InsufficientInventory {
                    product_id: line.snapshot.product_id.clone(),
                    variant_id: line.snapshot.variant_id.clone(),
                    sku: line.snapshot.sku.clone(),
                    available: line.snapshot.inventory_on_hand,
                    requested: line.quantity,
                }
                .into());
            }
        }

        // Pricing
        *stage = self.enter(*stage, SettlementStage::Pricing)?;

        let code: Option<DiscountCode> = match &request.discount_code {
            Some(entered) => self.db.discounts().find_code(store_id, entered).await?,
            None => None,
        };
        let code_request = request.discount_code.as_deref().map(|entered| CodeRequest {
            entered,
            found: code.as_ref(),
        });

        let discounts = resolve_discounts(
            lines.iter().map(|l| &l.snapshot),
            code_request,
            request.channel,
            now,
        )?;
        let priced = price_order(&lines, &discounts, request.order_discount.as_ref())?;

        debug!(
            total_cents = priced.totals.total.cents(),
            tax_cents = priced.totals.tax.cents(),
            discount_cents = priced.totals.discount_total.cents(),
            code_lines = discounts.code_line_count(),
            "Order priced"
        );

        // ReconcilingPayment
        *stage = self.enter(*stage, SettlementStage::ReconcilingPayment)?;

        let reconciliation = reconcile(
            priced.totals.total,
            &request.payments,
            Money::from_cents(self.config.payment_tolerance_cents),
        )?;

        // Committing
        *stage = self.enter(*stage, SettlementStage::Committing)?;

        let order_id = Uuid::new_v4().to_string();
        let status = if request.channel == Channel::InStore
            && reconciliation.payment_status == PaymentStatus::Completed
        {
            OrderStatus::Completed
        } else {
            OrderStatus::Pending
        };

        let new_order = NewOrder {
            id: order_id.clone(),
            store_id: store_id.to_string(),
            status,
            payment_status: reconciliation.payment_status,
            source: request.channel,
            customer_id: request.customer_id.clone(),
            operator_id: request.operator_id.clone(),
            currency: self.config.currency.clone(),
            totals: priced.totals,
            discount_code: discounts.code.as_ref().map(|c| c.code.clone()),
            discount_code_id: discounts.code.as_ref().map(|c| c.id.clone()),
            order_discount: request.order_discount.map(|d| d.to_string()),
            idempotency_key: request.idempotency_key.clone(),
            notes: request.notes.clone(),
            created_at: now,
            lines: priced
                .lines
                .iter()
                .zip(&lines)
                .map(|(priced_line, line)| {
                    priced_line.to_order_line(
                        &line.snapshot,
                        Uuid::new_v4().to_string(),
                        &order_id,
                        now,
                    )
                })
                .collect(),
            payments: reconciliation
                .payments
                .iter()
                .map(|p| p.to_payment(Uuid::new_v4().to_string(), &order_id, now))
                .collect(),
        };

        match self.db.orders().commit(new_order).await {
            Ok(order) => {
                *stage = self.enter(*stage, SettlementStage::Committed)?;
                info!(
                    store_id = %order.store_id,
                    order_number = %order.order_number,
                    total_cents = order.total_cents,
                    payment_status = ?order.payment_status,
                    "Order settled"
                );
                Ok(order)
            }
            Err(DbError::StockConflict {
                variant_id,
                requested,
            }) => {
                let line = lines.iter().find(|l| l.snapshot.variant_id == variant_id);
                Err(AttemptFailure::Conflict(Some(ConflictedLine {
                    product_id: line.map(|l| l.snapshot.product_id.clone()).unwrap_or_default(),
                    sku: line.map(|l| l.snapshot.sku.clone()).unwrap_or_default(),
                    variant_id,
                    requested,
                })))
            }
            Err(err) if err.is_conflict() => Err(AttemptFailure::Conflict(None)),
            Err(DbError::UsageLimitReached { .. }) => {
                let entered = request.discount_code.clone().unwrap_or_default();
                let limit = code.and_then(|c| c.usage_limit).unwrap_or(0);
                Err(CoreError::DiscountInvalid {
                    code: entered,
                    reason: DiscountRejection::UsageExhausted { limit },
                }
                .into())
            }
            Err(err) if err.is_unique_violation_on("idempotency_key") => {
                // A concurrent submission with the same key committed first.
                let key = request.idempotency_key.as_deref().unwrap_or_default();
                let existing = self
                    .db
                    .orders()
                    .find_by_idempotency_key(store_id, key)
                    .await?
                    .ok_or_else(|| SettlementError::Internal("Settlement failed".to_string()))?;
                *stage = self.enter(*stage, SettlementStage::Committed)?;
                info!(
                    order_number = %existing.order_number,
                    idempotency_key = %key,
                    "Concurrent duplicate submission, returning winner"
                );
                Ok(existing)
            }
            Err(err) => Err(err.into()),
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn validate_request(&self, request: SettleRequest) -> Result<ValidRequest, SettlementError> {
        let payments = request.payment_input()?;
        let store_id = validate_id("store_id", &request.store_id).map_err(CoreError::from)?;
        let cart = normalize_cart(
            &request.cart,
            self.config.max_cart_lines,
            self.config.max_line_quantity,
        )?;

        if let Some(discount) = &request.order_discount {
            discount.validate().map_err(CoreError::from)?;
        }

        Ok(ValidRequest {
            store_id,
            channel: request.channel,
            cart,
            payments,
            discount_code: normalize_discount_code(request.discount_code.as_deref())
                .map_err(CoreError::from)?,
            customer_id: optional_id("customer_id", request.customer_id.as_deref())?,
            operator_id: optional_id("operator_id", request.operator_id.as_deref())?,
            order_discount: request.order_discount,
            idempotency_key: optional_id("idempotency_key", request.idempotency_key.as_deref())?,
            notes: validate_notes(request.notes.as_deref()).map_err(CoreError::from)?,
        })
    }

    /// The order an earlier submission with the same idempotency key created.
    async fn earlier_submission(
        &self,
        request: &ValidRequest,
    ) -> Result<Option<Order>, SettlementError> {
        match &request.idempotency_key {
            Some(key) => Ok(self
                .db
                .orders()
                .find_by_idempotency_key(&request.store_id, key)
                .await?),
            None => Ok(None),
        }
    }

    /// Looks for a concurrent submission with the same idempotency key that
    /// committed while this one was in flight.
    ///
    /// Lookup errors are logged and treated as "none"; the caller then
    /// reports its own failure.
    async fn settled_by_duplicate(
        &self,
        request: &ValidRequest,
        stage: SettlementStage,
    ) -> Option<Order> {
        let existing = match self.earlier_submission(request).await {
            Ok(existing) => existing?,
            Err(err) => {
                warn!(error = %err, "Idempotency lookup after failed attempt failed");
                return None;
            }
        };
        info!(
            stage = %stage,
            order_number = %existing.order_number,
            idempotency_key = ?request.idempotency_key,
            "Concurrent duplicate submission, returning winner"
        );
        Some(existing)
    }

    /// The store must exist and settle in the configured currency.
    async fn check_store(&self, store_id: &str) -> Result<(), SettlementError> {
        let currency = self
            .db
            .catalog()
            .store_currency(store_id)
            .await?
            .ok_or_else(|| SettlementError::not_found("Store", store_id))?;

        if !currency.eq_ignore_ascii_case(&self.config.currency) {
            return Err(SettlementError::invalid(format!(
                "Store {} settles in {}, this service in {}",
                store_id, currency, self.config.currency
            )));
        }
        Ok(())
    }

    /// Retries are used up; report the line that kept losing.
    async fn conflict_exhausted(&self, line: Option<ConflictedLine>) -> SettlementError {
        let Some(line) = line else {
            return SettlementError::ConcurrencyConflict {
                variant_id: String::new(),
            };
        };

        match self.db.catalog().inventory_of(&line.variant_id).await {
            Ok(available) => SettlementError::InsufficientInventory {
                product_id: line.product_id,
                variant_id: line.variant_id,
                sku: line.sku,
                available,
                requested: line.requested,
            },
            Err(err) => err.into(),
        }
    }

    fn enter(
        &self,
        from: SettlementStage,
        to: SettlementStage,
    ) -> Result<SettlementStage, SettlementError> {
        let stage = from.transition(to)?;
        debug!(from = %from, to = %to, "Settlement stage");
        Ok(stage)
    }

    fn fail(&self, stage: SettlementStage, err: &SettlementError) {
        match stage.fail() {
            Ok(_) => debug!(stage = %stage, kind = ?err.kind(), error = %err, "Settlement failed"),
            Err(_) => warn!(stage = %stage, error = %err, "Failure after terminal stage"),
        }
    }
}
