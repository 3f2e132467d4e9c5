//! # Error Types
//!
//! Domain-specific error types for shopfront-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  shopfront-core (this file)                                             │
//! │  ├── CoreError        - Business rule violations                        │
//! │  └── ValidationError  - Input validation failures                       │
//! │                                                                         │
//! │  shopfront-db                                                           │
//! │  └── DbError          - Database operation failures                     │
//! │                                                                         │
//! │  shopfront-settle                                                       │
//! │  └── SettlementError  - What the caller sees (one kind per failure)     │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError ─┐                                   │
//! │                         DbError ────┴─► SettlementError → caller        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::discount::DiscountRejection;
use crate::money::Money;
use crate::settlement::SettlementStage;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations raised while pricing and reconciling an order.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Requested quantity exceeds stock on hand.
    ///
    /// ## User Workflow
    /// ```text
    /// Cart: MUG-RED × 5
    ///      │
    ///      ▼
    /// Snapshot: inventory_on_hand = 3
    ///      │
    ///      ▼
    /// InsufficientInventory { sku: "MUG-RED", available: 3, requested: 5 }
    ///      │
    ///      ▼
    /// Cashier sees: "short by 2"
    /// ```
    #[error(
        "Insufficient inventory for {sku} (variant {variant_id}): available {available}, requested {requested}"
    )]
    InsufficientInventory {
        product_id: String,
        variant_id: String,
        sku: String,
        available: i64,
        requested: i64,
    },

    /// A discount code cannot be redeemed for this cart.
    #[error("Discount code '{code}' rejected: {reason}")]
    DiscountInvalid {
        code: String,
        reason: DiscountRejection,
    },

    /// Payment instruments do not add up to the order total.
    ///
    /// `delta = total - paid`: positive means short, negative means overpaid.
    #[error("Payments total {paid} but order total is {total} (difference {delta})")]
    PaymentMismatch {
        total: Money,
        paid: Money,
        delta: Money,
    },

    /// A single payment instrument is malformed.
    #[error("Invalid payment: {reason}")]
    InvalidPayment { reason: String },

    /// Cart has no lines left to price.
    #[error("Cart is empty")]
    EmptyCart,

    /// Cart has more distinct lines than allowed.
    #[error("Cart cannot have more than {max} lines")]
    CartTooLarge { max: usize },

    /// The settlement state machine was driven out of order.
    #[error("Cannot move settlement from {from:?} to {to:?}")]
    InvalidStageTransition {
        from: SettlementStage,
        to: SettlementStage,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Units missing for an inventory failure, 0 for anything else.
    pub fn shortfall(&self) -> i64 {
        match self {
            CoreError::InsufficientInventory {
                available,
                requested,
                ..
            } => (requested - available).max(0),
            _ => 0,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: String },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    #[error("{field} must be positive")]
    MustBePositive { field: String },

    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inventory_message_and_shortfall() {
        let err = CoreError::InsufficientInventory {
            product_id: "p1".to_string(),
            variant_id: "v1".to_string(),
            sku: "MUG-RED".to_string(),
            available: 3,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient inventory for MUG-RED (variant v1): available 3, requested 5"
        );
        assert_eq!(err.shortfall(), 2);
    }

    #[test]
    fn test_payment_mismatch_message() {
        let err = CoreError::PaymentMismatch {
            total: Money::from_cents(15000),
            paid: Money::from_cents(14000),
            delta: Money::from_cents(1000),
        };
        assert_eq!(
            err.to_string(),
            "Payments total 140.00 but order total is 150.00 (difference 10.00)"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "variant_id".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
