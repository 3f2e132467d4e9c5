//! # Validation Module
//!
//! Input checks that run before any catalog read.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Request shape (serde)                                         │
//! │  ├── Channel is one of online / in_store / phone                        │
//! │  └── Numbers are numbers                                                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                   │
//! │  ├── Non-empty ids, quantity bounds, cart size                          │
//! │  └── Duplicate variants merged into one line                            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                             │
//! │  ├── CHECK (inventory_on_hand >= 0)                                     │
//! │  ├── UNIQUE order numbers and idempotency keys                          │
//! │  └── Write-once triggers on order lines and payments                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::CartLine;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest accepted identifier (store, product, variant, customer, ...).
pub const MAX_ID_LEN: usize = 64;

/// Longest accepted discount code.
pub const MAX_CODE_LEN: usize = 64;

/// Longest accepted free-text note on an order.
pub const MAX_NOTES_LEN: usize = 1000;

// =============================================================================
// String Validators
// =============================================================================

/// Validates an identifier and returns it trimmed.
///
/// ```rust
/// use shopfront_core::validation::validate_id;
///
/// assert_eq!(validate_id("variant_id", " v-1 ").unwrap(), "v-1");
/// assert!(validate_id("variant_id", "   ").is_err());
/// ```
pub fn validate_id(field: &str, id: &str) -> ValidationResult<String> {
    let id = id.trim();

    if id.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if id.len() > MAX_ID_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_ID_LEN,
        });
    }

    Ok(id.to_string())
}

/// Trims a discount code; blank means "no code".
pub fn normalize_discount_code(code: Option<&str>) -> ValidationResult<Option<String>> {
    let Some(code) = code.map(str::trim).filter(|c| !c.is_empty()) else {
        return Ok(None);
    };

    if code.len() > MAX_CODE_LEN {
        return Err(ValidationError::TooLong {
            field: "discount code".to_string(),
            max: MAX_CODE_LEN,
        });
    }

    Ok(Some(code.to_string()))
}

/// Validates an optional note and returns it trimmed, `None` when blank.
pub fn validate_notes(notes: Option<&str>) -> ValidationResult<Option<String>> {
    let Some(notes) = notes.map(str::trim).filter(|n| !n.is_empty()) else {
        return Ok(None);
    };

    if notes.len() > MAX_NOTES_LEN {
        return Err(ValidationError::TooLong {
            field: "notes".to_string(),
            max: MAX_NOTES_LEN,
        });
    }

    Ok(Some(notes.to_string()))
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity against `1..=max`.
///
/// ```rust
/// use shopfront_core::validation::validate_quantity;
///
/// assert!(validate_quantity(5, 999).is_ok());
/// assert!(validate_quantity(0, 999).is_err());
/// assert!(validate_quantity(1000, 999).is_err());
/// ```
pub fn validate_quantity(qty: i64, max: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > max {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max,
        });
    }

    Ok(())
}

/// Validates a tax rate in basis points (0% to 100%).
pub fn validate_tax_rate_bps(bps: u32) -> ValidationResult<()> {
    if bps > 10_000 {
        return Err(ValidationError::OutOfRange {
            field: "tax_rate".to_string(),
            min: 0,
            max: 10_000,
        });
    }

    Ok(())
}

/// Validates a catalog price in cents. Zero is allowed (free items).
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: "price".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

// =============================================================================
// Cart Normalization
// =============================================================================

/// Validates a client cart and merges repeated variants into one line.
///
/// ## Rules
/// - at least one line, at most `max_lines` distinct variants
/// - ids are trimmed and must be non-empty
/// - each merged quantity is within `1..=max_quantity`
/// - a variant may only appear under one product id
///
/// Line order follows the first occurrence of each variant.
pub fn normalize_cart(
    lines: &[CartLine],
    max_lines: usize,
    max_quantity: i64,
) -> CoreResult<Vec<CartLine>> {
    if lines.is_empty() {
        return Err(CoreError::EmptyCart);
    }

    let mut merged: Vec<CartLine> = Vec::with_capacity(lines.len());
    for line in lines {
        let product_id = validate_id("product_id", &line.product_id)?;
        let variant_id = validate_id("variant_id", &line.variant_id)?;
        validate_quantity(line.quantity, max_quantity)?;

        match merged.iter_mut().find(|m| m.variant_id == variant_id) {
            Some(existing) if existing.product_id != product_id => {
                return Err(ValidationError::InvalidFormat {
                    field: "cart".to_string(),
                    reason: format!(
                        "variant {} listed under products {} and {}",
                        variant_id, existing.product_id, product_id
                    ),
                }
                .into());
            }
            Some(existing) => {
                existing.quantity += line.quantity;
                validate_quantity(existing.quantity, max_quantity)?;
            }
            None => merged.push(CartLine::new(product_id, variant_id, line.quantity)),
        }
    }

    if merged.len() > max_lines {
        return Err(CoreError::CartTooLarge { max: max_lines });
    }

    Ok(merged)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_id() {
        assert_eq!(validate_id("store_id", "store-1").unwrap(), "store-1");
        assert!(validate_id("store_id", "").is_err());
        assert!(validate_id("store_id", &"x".repeat(65)).is_err());
    }

    #[test]
    fn test_normalize_discount_code() {
        assert_eq!(normalize_discount_code(None).unwrap(), None);
        assert_eq!(normalize_discount_code(Some("  ")).unwrap(), None);
        assert_eq!(
            normalize_discount_code(Some(" summer10 ")).unwrap(),
            Some("summer10".to_string())
        );
        assert!(normalize_discount_code(Some(&"A".repeat(65))).is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1, 999).is_ok());
        assert!(validate_quantity(999, 999).is_ok());
        assert!(validate_quantity(0, 999).is_err());
        assert!(validate_quantity(-1, 999).is_err());
        assert!(validate_quantity(1000, 999).is_err());
    }

    #[test]
    fn test_validate_tax_rate_bps() {
        assert!(validate_tax_rate_bps(0).is_ok());
        assert!(validate_tax_rate_bps(1900).is_ok());
        assert!(validate_tax_rate_bps(10_001).is_err());
    }

    #[test]
    fn test_normalize_cart_merges_duplicates() {
        let cart = vec![
            CartLine::new("p1", "v1", 2),
            CartLine::new("p2", "v2", 1),
            CartLine::new(" p1", "v1 ", 3),
        ];
        let merged = normalize_cart(&cart, 100, 999).unwrap();
        assert_eq!(
            merged,
            vec![CartLine::new("p1", "v1", 5), CartLine::new("p2", "v2", 1)]
        );
    }

    #[test]
    fn test_normalize_cart_rejections() {
        assert!(matches!(
            normalize_cart(&[], 100, 999),
            Err(CoreError::EmptyCart)
        ));
        assert!(matches!(
            normalize_cart(&[CartLine::new("p1", "v1", 0)], 100, 999),
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            normalize_cart(
                &[CartLine::new("p1", "v1", 600), CartLine::new("p1", "v1", 600)],
                100,
                999
            ),
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            normalize_cart(
                &[CartLine::new("p1", "v1", 1), CartLine::new("p2", "v1", 1)],
                100,
                999
            ),
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            normalize_cart(
                &[CartLine::new("p1", "v1", 1), CartLine::new("p2", "v2", 1)],
                1,
                999
            ),
            Err(CoreError::CartTooLarge { max: 1 })
        ));
    }
}
