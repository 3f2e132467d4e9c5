//! # Domain Types
//!
//! Core domain types used throughout Shopfront settlement.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  INPUT (untrusted)        READ FRESH              PERSISTED (immutable) │
//! │  ┌───────────────┐   ┌──────────────────┐   ┌────────────────────────┐  │
//! │  │  CartLine     │──►│ VariantSnapshot  │──►│ Order                  │  │
//! │  │  product_id   │   │ unit_price (incl)│   │ ├── OrderLine[]        │  │
//! │  │  variant_id   │   │ tax_rate_bps     │   │ │   (full snapshot)    │  │
//! │  │  quantity     │   │ inventory        │   │ └── Payment[]          │  │
//! │  └───────────────┘   │ attached discount│   └────────────────────────┘  │
//! │                      └──────────────────┘                               │
//! │                                                                         │
//! │  Rates are basis points: TaxRate(1900) = 19%, DiscountRate(1000) = 10%  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::discount::AttachedDiscount;
use crate::error::ValidationError;
use crate::money::Money;

/// Free-form per-variant option bag (color, size, ...), ordered by key.
pub type OptionMap = BTreeMap<String, String>;

// =============================================================================
// Rates
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// 1 basis point = 0.01%; 1900 bps = 19%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Creates a tax rate from a percentage (for convenience).
    pub fn from_percentage(pct: f64) -> Self {
        TaxRate((pct * 100.0).round() as u32)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

/// Discount rate in basis points, always within `0..=10000` (0% to 100%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DiscountRate(u32);

impl DiscountRate {
    /// Creates a discount rate, rejecting anything above 100%.
    pub fn from_bps(bps: u32) -> Result<Self, ValidationError> {
        if bps > 10_000 {
            return Err(ValidationError::OutOfRange {
                field: "discount rate".to_string(),
                min: 0,
                max: 10_000,
            });
        }
        Ok(DiscountRate(bps))
    }

    /// No discount.
    #[inline]
    pub const fn none() -> Self {
        DiscountRate(0)
    }

    /// 100% off.
    #[inline]
    pub const fn full() -> Self {
        DiscountRate(10_000)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}

// =============================================================================
// Enumerations
// =============================================================================

/// Sales context of an order. Gates discount availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Web storefront checkout.
    Online,
    /// Point of sale in a physical store.
    InStore,
    /// Order taken by staff over the phone.
    Phone,
}

impl Channel {
    /// Whether discounts flagged "available in store" apply to this channel.
    ///
    /// Phone orders are keyed in by staff, so they follow in-store availability.
    pub const fn uses_in_store_availability(&self) -> bool {
        matches!(self, Channel::InStore | Channel::Phone)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Channel::Online => "online",
            Channel::InStore => "in_store",
            Channel::Phone => "phone",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Awaiting fulfilment or payment clearance.
    #[default]
    Pending,
    /// Handed over and fully paid.
    Completed,
    /// Cancelled by a later lifecycle operation.
    Cancelled,
}

/// Aggregate payment status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// At least one instrument (a check) has not cleared.
    #[default]
    Pending,
    /// Every instrument settled.
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Check,
    Transfer,
    Other,
}

impl PaymentMethod {
    pub const fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Check => "check",
            PaymentMethod::Transfer => "transfer",
            PaymentMethod::Other => "other",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sub-status of a single payment instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    /// Check handed over, clearance not yet confirmed.
    Received,
    /// Funds settled.
    Completed,
}

/// Where the discount on an order line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DiscountSource {
    #[default]
    None,
    /// Discount attached directly to the variant.
    Variant,
    /// Discount attached directly to the product.
    Product,
    /// Discount code entered at checkout.
    Code,
}

// =============================================================================
// Cart Input
// =============================================================================

/// A line of the client-supplied cart. Untrusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: String,
    pub variant_id: String,
    pub quantity: i64,
}

impl CartLine {
    pub fn new(product_id: impl Into<String>, variant_id: impl Into<String>, quantity: i64) -> Self {
        CartLine {
            product_id: product_id.into(),
            variant_id: variant_id.into(),
            quantity,
        }
    }
}

// =============================================================================
// Variant Snapshot
// =============================================================================

/// Current catalog state of one variant, read fresh for a settlement attempt.
///
/// Carries everything the order line snapshot needs so nothing is read
/// twice from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantSnapshot {
    pub variant_id: String,
    pub product_id: String,
    pub category_id: Option<String>,
    pub product_name: String,
    pub sku: String,
    pub barcode: Option<String>,
    pub image_url: Option<String>,
    pub options: OptionMap,
    /// Tax-inclusive unit price in cents.
    pub unit_price_cents: i64,
    pub tax_rate_bps: u32,
    pub inventory_on_hand: i64,
    /// Active discount attached to the variant or product, if any.
    pub attached_discount: Option<AttachedDiscount>,
}

impl VariantSnapshot {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn tax_rate(&self) -> TaxRate {
        TaxRate::from_bps(self.tax_rate_bps)
    }

    /// Units missing to fulfil `quantity`, or 0 when stock suffices.
    pub fn shortfall(&self, quantity: i64) -> i64 {
        (quantity - self.inventory_on_hand).max(0)
    }
}

// =============================================================================
// Order Line
// =============================================================================

/// A settled order line. Write-once: frozen at settlement so later catalog
/// edits never alter historical orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderLine {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    pub variant_id: String,
    pub product_name: String,
    pub sku: String,
    pub barcode: Option<String>,
    pub image_url: Option<String>,
    pub options: OptionMap,
    pub tax_rate_bps: u32,
    /// Catalog unit price (tax-inclusive) before any discount.
    pub original_unit_price_cents: i64,
    pub quantity: i64,
    pub discount_bps: u32,
    pub discount_source: DiscountSource,
    /// Amount taken off this line by the line discount.
    pub discount_cents: i64,
    /// Effective unit price after the line discount (display value).
    pub unit_price_cents: i64,
    /// Tax-inclusive line total after the line discount.
    pub line_total_cents: i64,
    pub line_excl_tax_cents: i64,
    pub line_tax_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl OrderLine {
    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.line_total_cents)
    }
}

// =============================================================================
// Payment
// =============================================================================

/// A persisted payment instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Payment {
    pub id: String,
    pub order_id: String,
    pub method: PaymentMethod,
    pub amount_cents: i64,
    /// Cash handed over by the customer.
    pub cash_given_cents: Option<i64>,
    /// Derived server-side: `cash_given - amount`.
    pub cash_change_cents: Option<i64>,
    pub check_number: Option<String>,
    pub check_bank: Option<String>,
    #[ts(as = "Option<String>")]
    pub check_date: Option<NaiveDate>,
    /// External reference (card auth code, transfer id, ...).
    pub reference: Option<String>,
    pub state: PaymentState,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Payment {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Order
// =============================================================================

/// A settled order with its line and payment snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Order {
    pub id: String,
    pub store_id: String,
    /// Unique per store: `YYYYMMDD-NNNN`.
    pub order_number: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub source: Channel,
    pub customer_id: Option<String>,
    pub operator_id: Option<String>,
    pub currency: String,
    pub subtotal_excl_tax_cents: i64,
    pub tax_cents: i64,
    /// Everything taken off the undiscounted gross (line + order-level).
    pub discount_total_cents: i64,
    pub total_cents: i64,
    /// Literal code string as entered, kept for the record.
    pub discount_code: Option<String>,
    pub discount_code_id: Option<String>,
    /// Human-readable description of a manual order-level discount.
    pub order_discount: Option<String>,
    pub idempotency_key: Option<String>,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    pub lines: Vec<OrderLine>,
    pub payments: Vec<Payment>,
}

impl Order {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    /// Sum of all recorded payment amounts.
    pub fn total_paid(&self) -> Money {
        self.payments.iter().map(Payment::amount).sum()
    }
}

// =============================================================================
// Notification Event
// =============================================================================

/// Payload emitted once per committed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct OrderPlacedEvent {
    pub order_id: String,
    pub order_number: String,
    pub store_id: String,
    pub channel: Channel,
    pub total_cents: i64,
    pub payment_status: PaymentStatus,
    pub customer_id: Option<String>,
}

impl OrderPlacedEvent {
    /// Outbox kind for this event.
    pub const KIND: &'static str = "ORDER_PLACED";
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tax_rate_from_percentage() {
        let rate = TaxRate::from_percentage(19.0);
        assert_eq!(rate.bps(), 1900);
        assert!((rate.percentage() - 19.0).abs() < 0.001);
    }

    #[test]
    fn test_discount_rate_bounds() {
        assert!(DiscountRate::from_bps(0).is_ok());
        assert!(DiscountRate::from_bps(10_000).is_ok());
        assert!(DiscountRate::from_bps(10_001).is_err());
        assert_eq!(DiscountRate::full().bps(), 10_000);
    }

    #[test]
    fn test_channel_availability() {
        assert!(!Channel::Online.uses_in_store_availability());
        assert!(Channel::InStore.uses_in_store_availability());
        assert!(Channel::Phone.uses_in_store_availability());
    }

    #[test]
    fn test_channel_serde() {
        let json = serde_json::to_string(&Channel::InStore).unwrap();
        assert_eq!(json, "\"in_store\"");
        let parsed: Channel = serde_json::from_str("\"phone\"").unwrap();
        assert_eq!(parsed, Channel::Phone);
    }

    #[test]
    fn test_shortfall() {
        let snapshot = VariantSnapshot {
            variant_id: "v1".to_string(),
            product_id: "p1".to_string(),
            category_id: None,
            product_name: "Mug".to_string(),
            sku: "MUG-1".to_string(),
            barcode: None,
            image_url: None,
            options: OptionMap::new(),
            unit_price_cents: 1000,
            tax_rate_bps: 1900,
            inventory_on_hand: 3,
            attached_discount: None,
        };
        assert_eq!(snapshot.shortfall(5), 2);
        assert_eq!(snapshot.shortfall(3), 0);
    }
}
