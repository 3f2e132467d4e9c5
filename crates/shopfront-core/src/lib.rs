//! # shopfront-core: Pure Settlement Logic for Shopfront
//!
//! Decides what an order costs and whether it may be paid. Every function
//! here is pure: catalog rows come in as snapshots, time comes in through
//! a [`Clock`], and nothing touches the database.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Shopfront Settlement                               │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              shopfront-settle (orchestrator, CLI)               │   │
//! │  │   Validating ─► Pricing ─► ReconcilingPayment ─► Committing     │   │
//! │  └───────────────┬───────────────────────────────────┬─────────────┘   │
//! │                  │                                   │                  │
//! │  ┌───────────────▼───────────────────┐   ┌───────────▼─────────────┐   │
//! │  │   ★ shopfront-core (THIS CRATE) ★ │   │      shopfront-db       │   │
//! │  │                                   │   │  snapshots, discount    │   │
//! │  │  discount ─► pricing ─► payment   │   │  codes, atomic commit,  │   │
//! │  │  money • types • settlement       │   │  notification outbox    │   │
//! │  │                                   │   │                         │   │
//! │  │  NO I/O • NO DATABASE • NO CLOCK  │   │  SQLite (sqlx)          │   │
//! │  └───────────────────────────────────┘   └─────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Cart lines, variant snapshots, persisted orders
//! - [`money`] - Integer money with half-to-even rounding
//! - [`discount`] - Attached discounts, discount codes, per-line resolution
//! - [`pricing`] - Tax-inclusive decomposition and order totals
//! - [`payment`] - Split-tender reconciliation
//! - [`settlement`] - Settlement stage machine
//! - [`validation`] - Input checks and cart normalization
//! - [`clock`] - Injectable time source
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use shopfront_core::money::Money;
//! use shopfront_core::types::TaxRate;
//!
//! // 100.00 × 2 at 19% tax-inclusive
//! let line_total = Money::from_cents(10000).multiply_quantity(2);
//! let (excl, tax) = line_total.split_inclusive_tax(TaxRate::from_bps(1900));
//!
//! assert_eq!(excl.cents(), 16807);
//! assert_eq!(tax.cents(), 3193);
//! assert_eq!(excl + tax, line_total);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod clock;
pub mod discount;
pub mod error;
pub mod money;
pub mod payment;
pub mod pricing;
pub mod settlement;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use clock::{Clock, FixedClock, SystemClock};
pub use discount::{
    resolve_discounts, select_attached_discount, AttachedDiscount, Availability, CodeRequest,
    DirectDiscount, DiscountCode, DiscountLevel, DiscountRejection, DiscountResolution,
    DiscountScope, LineDiscount,
};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use payment::{reconcile, PaymentInput, PaymentTender, Reconciliation};
pub use pricing::{price_order, OrderDiscount, OrderTotals, PricedOrder, ResolvedLine};
pub use settlement::SettlementStage;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum distinct lines in a single cart.
pub const MAX_CART_LINES: usize = 100;

/// Maximum quantity of a single variant in a cart.
///
/// Catches typos like 1000 instead of 10 at the till.
pub const MAX_LINE_QUANTITY: i64 = 999;

/// Allowed difference between payments and total, in cents.
pub const PAYMENT_TOLERANCE_CENTS: i64 = 1;
