//! # Pricing & Tax Engine
//!
//! Turns resolved lines plus their discounts into line and order totals.
//!
//! ## Per-Line Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  gross      = unit_price (tax-incl) × quantity                          │
//! │  line_total = round(gross × (1 - discount))                             │
//! │  excl       = round(line_total / (1 + tax_rate))                        │
//! │  tax        = line_total - excl                                         │
//! │                                                                         │
//! │  subtotal_excl_tax = Σ excl        tax = Σ tax                          │
//! │  total             = subtotal_excl_tax + tax      (exact, no rounding)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Order-Level Discount
//! A manual cashier discount applies to the pre-tax subtotal; tax is scaled
//! by the same ratio so the receipt stays proportional. The total is again
//! the sum of the two rounded parts.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::discount::{DiscountResolution, LineDiscount};
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::{div_round_half_even, Money, BPS_SCALE};
use crate::types::{DiscountRate, OrderLine, VariantSnapshot};

// =============================================================================
// Inputs
// =============================================================================

/// A validated cart line paired with its fresh catalog snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLine {
    pub snapshot: VariantSnapshot,
    pub quantity: i64,
}

/// Manual discount on the whole order, entered by a cashier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrderDiscount {
    /// Percentage of the pre-tax subtotal, in basis points.
    Percent { bps: u32 },
    /// Flat amount off the pre-tax subtotal, capped at the subtotal.
    Amount { cents: i64 },
}

impl OrderDiscount {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match *self {
            OrderDiscount::Percent { bps } => {
                DiscountRate::from_bps(bps)?;
            }
            OrderDiscount::Amount { cents } if cents < 0 => {
                return Err(ValidationError::OutOfRange {
                    field: "order discount amount".to_string(),
                    min: 0,
                    max: i64::MAX,
                });
            }
            OrderDiscount::Amount { .. } => {}
        }
        Ok(())
    }

    /// Returns `(adjusted_subtotal, adjusted_tax)`.
    fn apply(&self, subtotal: Money, tax: Money) -> (Money, Money) {
        match *self {
            OrderDiscount::Percent { bps } => {
                let bps = bps.min(10_000) as i128;
                let off = div_round_half_even(subtotal.cents() as i128 * bps, BPS_SCALE);
                let adjusted = subtotal - Money::from_cents(off as i64);
                let remaining = (BPS_SCALE - bps) as i64;
                (adjusted, tax.scale(remaining, BPS_SCALE as i64))
            }
            OrderDiscount::Amount { cents } => {
                let off = Money::from_cents(cents.max(0)).min(subtotal);
                let adjusted = subtotal - off;
                (adjusted, tax.scale(adjusted.cents(), subtotal.cents()))
            }
        }
    }
}

impl fmt::Display for OrderDiscount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderDiscount::Percent { bps } => {
                write!(f, "{}.{:02}% off", bps / 100, bps % 100)
            }
            OrderDiscount::Amount { cents } => {
                write!(f, "{} off", Money::from_cents(*cents))
            }
        }
    }
}

// =============================================================================
// Outputs
// =============================================================================

/// Price breakdown of one line, index-aligned with the input lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricedLine {
    pub quantity: i64,
    pub discount: LineDiscount,
    pub original_unit_price: Money,
    /// Undiscounted `unit_price × quantity`.
    pub gross: Money,
    pub discount_amount: Money,
    /// Effective unit price for display: `line_total / quantity`, rounded.
    pub unit_price: Money,
    pub line_total: Money,
    pub line_excl_tax: Money,
    pub line_tax: Money,
}

impl PricedLine {
    /// Freezes this line and its snapshot into a persisted order line.
    pub fn to_order_line(
        &self,
        snapshot: &VariantSnapshot,
        id: impl Into<String>,
        order_id: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> OrderLine {
        OrderLine {
            id: id.into(),
            order_id: order_id.into(),
            product_id: snapshot.product_id.clone(),
            variant_id: snapshot.variant_id.clone(),
            product_name: snapshot.product_name.clone(),
            sku: snapshot.sku.clone(),
            barcode: snapshot.barcode.clone(),
            image_url: snapshot.image_url.clone(),
            options: snapshot.options.clone(),
            tax_rate_bps: snapshot.tax_rate_bps,
            original_unit_price_cents: self.original_unit_price.cents(),
            quantity: self.quantity,
            discount_bps: self.discount.rate.bps(),
            discount_source: self.discount.source,
            discount_cents: self.discount_amount.cents(),
            unit_price_cents: self.unit_price.cents(),
            line_total_cents: self.line_total.cents(),
            line_excl_tax_cents: self.line_excl_tax.cents(),
            line_tax_cents: self.line_tax.cents(),
            created_at,
        }
    }
}

/// Order-level money figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderTotals {
    pub subtotal_excl_tax: Money,
    pub tax: Money,
    /// Undiscounted gross minus total: line and order-level discounts.
    pub discount_total: Money,
    pub total: Money,
}

/// The outcome of pricing a cart.
#[derive(Debug, Clone, PartialEq)]
pub struct PricedOrder {
    pub lines: Vec<PricedLine>,
    pub totals: OrderTotals,
}

// =============================================================================
// Engine
// =============================================================================

/// Prices a single line.
pub fn price_line(line: &ResolvedLine, discount: LineDiscount) -> PricedLine {
    let original_unit_price = line.snapshot.unit_price();
    let gross = original_unit_price.multiply_quantity(line.quantity);
    let line_total = gross.apply_discount(discount.rate);
    let (line_excl_tax, line_tax) = line_total.split_inclusive_tax(line.snapshot.tax_rate());
    let unit_price = if line.quantity > 0 {
        Money::from_cents(div_round_half_even(
            line_total.cents() as i128,
            line.quantity as i128,
        ) as i64)
    } else {
        Money::zero()
    };

    PricedLine {
        quantity: line.quantity,
        discount,
        original_unit_price,
        gross,
        discount_amount: gross - line_total,
        unit_price,
        line_total,
        line_excl_tax,
        line_tax,
    }
}

/// Prices the whole order.
///
/// `discounts.lines` must be index-aligned with `lines`.
///
/// ## Errors
/// - `EmptyCart` when there is nothing to price
/// - `Validation` for non-positive quantities, a misaligned discount
///   resolution, or an out-of-range order discount
pub fn price_order(
    lines: &[ResolvedLine],
    discounts: &DiscountResolution,
    order_discount: Option<&OrderDiscount>,
) -> CoreResult<PricedOrder> {
    if lines.is_empty() {
        return Err(CoreError::EmptyCart);
    }
    if discounts.lines.len() != lines.len() {
        return Err(ValidationError::InvalidFormat {
            field: "discounts".to_string(),
            reason: format!(
                "{} discounts for {} lines",
                discounts.lines.len(),
                lines.len()
            ),
        }
        .into());
    }
    if let Some(line) = lines.iter().find(|l| l.quantity <= 0) {
        return Err(ValidationError::MustBePositive {
            field: format!("quantity of {}", line.snapshot.variant_id),
        }
        .into());
    }
    if let Some(discount) = order_discount {
        discount.validate()?;
    }

    let priced: Vec<PricedLine> = lines
        .iter()
        .zip(discounts.lines.iter())
        .map(|(line, discount)| price_line(line, *discount))
        .collect();

    let gross: Money = priced.iter().map(|l| l.gross).sum();
    let subtotal: Money = priced.iter().map(|l| l.line_excl_tax).sum();
    let tax: Money = priced.iter().map(|l| l.line_tax).sum();

    let (subtotal_excl_tax, tax) = match order_discount {
        Some(discount) => discount.apply(subtotal, tax),
        None => (subtotal, tax),
    };
    let total = subtotal_excl_tax + tax;

    Ok(PricedOrder {
        lines: priced,
        totals: OrderTotals {
            subtotal_excl_tax,
            tax,
            discount_total: gross - total,
            total,
        },
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
