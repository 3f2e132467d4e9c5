//! # Settlement Error Type
//!
//! The one error type callers of [`settle_order`] see.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Settlement                             │
//! │                                                                         │
//! │  settle_order(request)                                                  │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  Validating / Pricing / ReconcilingPayment                       │  │
//! │  │    CoreError::InsufficientInventory ──► INSUFFICIENT_INVENTORY   │  │
//! │  │    CoreError::DiscountInvalid ────────► DISCOUNT_INVALID         │  │
//! │  │    CoreError::PaymentMismatch ────────► PAYMENT_MISMATCH         │  │
//! │  │    CoreError::Validation ─────────────► INVALID_REQUEST          │  │
//! │  │    DbError::NotFound ─────────────────► NOT_FOUND                │  │
//! │  │                                                                  │  │
//! │  │  Committing                                                      │  │
//! │  │    DbError::StockConflict ────────────► CONCURRENCY_CONFLICT     │  │
//! │  │         (retried; a second loss becomes INSUFFICIENT_INVENTORY)  │  │
//! │  │    DbError::QueryFailed etc. ─────────► INTERNAL (logged)        │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! │  Every failure leaves the store exactly as it was.                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`settle_order`]: crate::SettlementService::settle_order

use serde::Serialize;
use thiserror::Error;
use ts_rs::TS;

use shopfront_core::{CoreError, DiscountRejection, Money};
use shopfront_db::DbError;

/// Why a settlement failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettlementError {
    /// Product, variant, customer or order missing, or owned by another store.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Not enough stock; `requested - available` units are missing.
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

    #[error("Discount code '{code}' rejected: {reason}")]
    DiscountInvalid {
        code: String,
        reason: DiscountRejection,
    },

    /// `delta = total - paid`: positive is short, negative is overpaid.
    #[error("Payments total {paid} but order total is {total} (difference {delta})")]
    PaymentMismatch {
        total: Money,
        paid: Money,
        delta: Money,
    },

    /// A concurrent order took the stock between pre-check and commit.
    #[error("Stock for variant {variant_id} was taken by a concurrent order")]
    ConcurrencyConflict { variant_id: String },

    /// Malformed input: empty cart, bad quantity, bad payment instrument.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Storage failure. The message is generic; details are logged.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Machine-readable error kind.
///
/// ## Usage in Frontend
/// ```typescript
/// switch (error.kind) {
///   case 'INSUFFICIENT_INVENTORY':
///   case 'CONCURRENCY_CONFLICT':
///     await refreshCart();
///     break;
///   case 'PAYMENT_MISMATCH':
///     showCorrection(error.message);
///     break;
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    InsufficientInventory,
    DiscountInvalid,
    PaymentMismatch,
    ConcurrencyConflict,
    InvalidRequest,
    Internal,
}

/// Serialized form of a [`SettlementError`].
///
/// ```json
/// {
///   "kind": "PAYMENT_MISMATCH",
///   "message": "Payments total 140.00 but order total is 150.00 (difference 10.00)",
///   "deltaCents": 1000
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    pub message: String,
    /// Signed correction for `PAYMENT_MISMATCH`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta_cents: Option<i64>,
    /// Missing units for `INSUFFICIENT_INVENTORY`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shortfall: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<DiscountRejection>,
}

impl SettlementError {
    pub fn not_found(entity: &str, id: &str) -> Self {
        SettlementError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        SettlementError::InvalidRequest(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SettlementError::NotFound { .. } => ErrorKind::NotFound,
            SettlementError::InsufficientInventory { .. } => ErrorKind::InsufficientInventory,
            SettlementError::DiscountInvalid { .. } => ErrorKind::DiscountInvalid,
            SettlementError::PaymentMismatch { .. } => ErrorKind::PaymentMismatch,
            SettlementError::ConcurrencyConflict { .. } => ErrorKind::ConcurrencyConflict,
            SettlementError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            SettlementError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Units missing for an inventory failure, 0 otherwise.
    pub fn shortfall(&self) -> i64 {
        match self {
            SettlementError::InsufficientInventory {
                available,
                requested,
                ..
            } => (requested - available).max(0),
            _ => 0,
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            kind: self.kind(),
            message: self.to_string(),
            delta_cents: match self {
                SettlementError::PaymentMismatch { delta, .. } => Some(delta.cents()),
                _ => None,
            },
            shortfall: match self {
                SettlementError::InsufficientInventory { .. } => Some(self.shortfall()),
                _ => None,
            },
            rejection: match self {
                SettlementError::DiscountInvalid { reason, .. } => Some(reason.clone()),
                _ => None,
            },
        }
    }
}

/// Converts business rule violations.
impl From<CoreError> for SettlementError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InsufficientInventory {
                product_id,
                variant_id,
                sku,
                available,
                requested,
            } => SettlementError::InsufficientInventory {
                product_id,
                variant_id,
                sku,
                available,
                requested,
            },
            CoreError::DiscountInvalid { code, reason } => {
                SettlementError::DiscountInvalid { code, reason }
            }
            CoreError::PaymentMismatch { total, paid, delta } => {
                SettlementError::PaymentMismatch { total, paid, delta }
            }
            CoreError::InvalidPayment { reason } => {
                SettlementError::invalid(format!("Invalid payment: {}", reason))
            }
            CoreError::EmptyCart => SettlementError::invalid("Cart is empty"),
            CoreError::CartTooLarge { max } => {
                SettlementError::invalid(format!("Cart cannot have more than {} lines", max))
            }
            CoreError::Validation(e) => SettlementError::invalid(e.to_string()),
            CoreError::InvalidStageTransition { from, to } => {
                tracing::error!(from = %from, to = %to, "Settlement stage machine misused");
                SettlementError::Internal("Settlement failed".to_string())
            }
        }
    }
}

/// Converts database errors.
impl From<DbError> for SettlementError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => SettlementError::NotFound { entity, id },
            DbError::StockConflict { variant_id, .. } => {
                SettlementError::ConcurrencyConflict { variant_id }
            }
            DbError::UniqueViolation { field, value } => SettlementError::invalid(format!(
                "{} '{}' already exists",
                field, value
            )),
            DbError::ForeignKeyViolation { message } => {
                tracing::error!("Foreign key violation: {}", message);
                SettlementError::invalid("Invalid reference")
            }
            other => {
                // Log the actual error but return a generic message
                tracing::error!("Database operation failed: {}", other);
                SettlementError::Internal("Database operation failed".to_string())
            }
        }
    }
}
