//! # Discount Resolution
//!
//! Decides which discount, if any, applies to each cart line.
//!
//! ## Resolution Order (most specific wins, never stacked)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  For each line:                                                         │
//! │                                                                         │
//! │  1. Attached discount on the VARIANT   ──► apply, done                  │
//! │  2. Attached discount on the PRODUCT   ──► apply, done                  │
//! │  3. Discount code covers the line?     ──► apply code rate              │
//! │        target specificity:                                              │
//! │          variant list → product list → category → whole cart           │
//! │  4. Otherwise                          ──► 0%                           │
//! │                                                                         │
//! │  A code that ends up covering no line is REJECTED, never silently       │
//! │  applied as 0%: the cashier/customer must hear about it before paying.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::types::{Channel, DiscountRate, DiscountSource, VariantSnapshot};

// =============================================================================
// Availability
// =============================================================================

/// When and where a discount may be used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub enabled: bool,
    pub available_online: bool,
    pub available_in_store: bool,
    /// Inclusive lower bound; `None` means "since forever".
    pub valid_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound; `None` means "no expiry".
    pub valid_to: Option<DateTime<Utc>>,
}

impl Availability {
    /// Always-on availability for every channel.
    pub fn always() -> Self {
        Availability {
            enabled: true,
            available_online: true,
            available_in_store: true,
            valid_from: None,
            valid_to: None,
        }
    }

    /// Checks enablement, the date window, and the channel, in that order.
    pub fn check(&self, now: DateTime<Utc>, channel: Channel) -> Result<(), DiscountRejection> {
        if !self.enabled {
            return Err(DiscountRejection::Disabled);
        }
        if let Some(from) = self.valid_from {
            if now < from {
                return Err(DiscountRejection::NotYetValid { from });
            }
        }
        if let Some(to) = self.valid_to {
            if now > to {
                return Err(DiscountRejection::Expired { to });
            }
        }
        let allowed = if channel.uses_in_store_availability() {
            self.available_in_store
        } else {
            self.available_online
        };
        if !allowed {
            return Err(DiscountRejection::ChannelNotAllowed { channel });
        }
        Ok(())
    }

    pub fn is_active(&self, now: DateTime<Utc>, channel: Channel) -> bool {
        self.check(now, channel).is_ok()
    }
}

// =============================================================================
// Rejection Reasons
// =============================================================================

/// Why a discount code was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DiscountRejection {
    NotFound,
    Disabled,
    NotYetValid {
        #[ts(as = "String")]
        from: DateTime<Utc>,
    },
    Expired {
        #[ts(as = "String")]
        to: DateTime<Utc>,
    },
    ChannelNotAllowed { channel: Channel },
    UsageExhausted { limit: i64 },
    NotApplicable,
}

impl fmt::Display for DiscountRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscountRejection::NotFound => f.write_str("code does not exist"),
            DiscountRejection::Disabled => f.write_str("code is not active"),
            DiscountRejection::NotYetValid { from } => {
                write!(f, "code is not valid before {}", from.format("%Y-%m-%d %H:%M"))
            }
            DiscountRejection::Expired { to } => {
                write!(f, "code expired on {}", to.format("%Y-%m-%d %H:%M"))
            }
            DiscountRejection::ChannelNotAllowed { channel } => {
                write!(f, "code is not available for {} orders", channel)
            }
            DiscountRejection::UsageExhausted { limit } => {
                write!(f, "code has reached its usage limit of {}", limit)
            }
            DiscountRejection::NotApplicable => {
                f.write_str("code does not apply to any item in cart")
            }
        }
    }
}

// =============================================================================
// Attached (Direct) Discounts
// =============================================================================

/// How specific an attached discount is. Variant beats product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountLevel {
    Product,
    Variant,
}

impl DiscountLevel {
    pub fn source(&self) -> DiscountSource {
        match self {
            DiscountLevel::Variant => DiscountSource::Variant,
            DiscountLevel::Product => DiscountSource::Product,
        }
    }
}

/// A discount row attached directly to a product or one of its variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectDiscount {
    pub id: String,
    pub product_id: Option<String>,
    pub variant_id: Option<String>,
    pub rate: DiscountRate,
    pub availability: Availability,
}

impl DirectDiscount {
    /// The level at which this discount targets the given variant, if at all.
    pub fn level_for(&self, variant_id: &str, product_id: &str) -> Option<DiscountLevel> {
        match (&self.variant_id, &self.product_id) {
            (Some(v), _) if v == variant_id => Some(DiscountLevel::Variant),
            (None, Some(p)) if p == product_id => Some(DiscountLevel::Product),
            _ => None,
        }
    }
}

/// The attached discount chosen for a variant snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachedDiscount {
    pub discount_id: String,
    pub rate: DiscountRate,
    pub level: DiscountLevel,
}

/// Picks the active attached discount for a variant.
///
/// Variant-level beats product-level; among equals the highest rate wins.
pub fn select_attached_discount(
    candidates: &[DirectDiscount],
    variant_id: &str,
    product_id: &str,
    now: DateTime<Utc>,
    channel: Channel,
) -> Option<AttachedDiscount> {
    candidates
        .iter()
        .filter(|d| d.availability.is_active(now, channel))
        .filter_map(|d| {
            d.level_for(variant_id, product_id).map(|level| AttachedDiscount {
                discount_id: d.id.clone(),
                rate: d.rate,
                level,
            })
        })
        .max_by(|a, b| (a.level, a.rate).cmp(&(b.level, b.rate)))
}

// =============================================================================
// Discount Codes
// =============================================================================

/// What a code targets, most specific first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscountScope {
    Variants(BTreeSet<String>),
    Products(BTreeSet<String>),
    Category(String),
    All,
}

impl DiscountScope {
    pub fn covers(&self, line: &VariantSnapshot) -> bool {
        match self {
            DiscountScope::Variants(ids) => ids.contains(&line.variant_id),
            DiscountScope::Products(ids) => ids.contains(&line.product_id),
            DiscountScope::Category(id) => line.category_id.as_deref() == Some(id.as_str()),
            DiscountScope::All => true,
        }
    }

    pub fn is_targeted(&self) -> bool {
        !matches!(self, DiscountScope::All)
    }
}

/// A store discount code as loaded from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscountCode {
    pub id: String,
    /// Canonical spelling as configured by the merchant.
    pub code: String,
    pub rate: DiscountRate,
    pub availability: Availability,
    pub usage_limit: Option<i64>,
    pub used_count: i64,
    pub variant_ids: Vec<String>,
    pub product_ids: Vec<String>,
    pub category_id: Option<String>,
}

impl DiscountCode {
    /// Target scope by specificity: variants → products → category → all.
    pub fn scope(&self) -> DiscountScope {
        if !self.variant_ids.is_empty() {
            DiscountScope::Variants(self.variant_ids.iter().cloned().collect())
        } else if !self.product_ids.is_empty() {
            DiscountScope::Products(self.product_ids.iter().cloned().collect())
        } else if let Some(category) = &self.category_id {
            DiscountScope::Category(category.clone())
        } else {
            DiscountScope::All
        }
    }

    /// Checks everything about the code itself, independent of the cart.
    pub fn check_redeemable(
        &self,
        now: DateTime<Utc>,
        channel: Channel,
    ) -> Result<(), DiscountRejection> {
        self.availability.check(now, channel)?;
        if let Some(limit) = self.usage_limit {
            if self.used_count >= limit {
                return Err(DiscountRejection::UsageExhausted { limit });
            }
        }
        Ok(())
    }
}

/// A code entered at checkout and what the lookup found for it.
#[derive(Debug, Clone, Copy)]
pub struct CodeRequest<'a> {
    /// As typed by the customer or cashier.
    pub entered: &'a str,
    pub found: Option<&'a DiscountCode>,
}

// =============================================================================
// Resolution Output
// =============================================================================

/// The discount applied to one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LineDiscount {
    pub rate: DiscountRate,
    pub source: DiscountSource,
}

/// A redeemed code, kept for the usage counter and the order record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedCode {
    pub id: String,
    pub code: String,
}

/// Per-line discounts, index-aligned with the snapshots that were resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscountResolution {
    pub lines: Vec<LineDiscount>,
    pub code: Option<AppliedCode>,
}

impl DiscountResolution {
    /// Number of lines the redeemed code actually discounts.
    pub fn code_line_count(&self) -> usize {
        self.lines
            .iter()
            .filter(|l| l.source == DiscountSource::Code)
            .count()
    }
}

// =============================================================================
// Resolver
// =============================================================================

/// Resolves the discount for every line of the cart.
///
/// ## Errors
/// `CoreError::DiscountInvalid` when a code was entered but is unknown,
/// inactive, outside its window, unavailable for the channel, exhausted,
/// or ends up covering no line.
pub fn resolve_discounts<'s, I>(
    lines: I,
    code: Option<CodeRequest<'_>>,
    channel: Channel,
    now: DateTime<Utc>,
) -> CoreResult<DiscountResolution>
where
    I: IntoIterator<Item = &'s VariantSnapshot>,
{
    let lines: Vec<&VariantSnapshot> = lines.into_iter().collect();
    let mut resolved: Vec<LineDiscount> = lines
        .iter()
        .map(|line| match &line.attached_discount {
            Some(attached) => LineDiscount {
                rate: attached.rate,
                source: attached.level.source(),
            },
            None => LineDiscount::default(),
        })
        .collect();

    let Some(request) = code else {
        return Ok(DiscountResolution {
            lines: resolved,
            code: None,
        });
    };

    let reject = |reason: DiscountRejection| CoreError::DiscountInvalid {
        code: request.entered.to_string(),
        reason,
    };

    let discount_code = request.found.ok_or_else(|| reject(DiscountRejection::NotFound))?;
    discount_code.check_redeemable(now, channel).map_err(reject)?;

    let scope = discount_code.scope();
    let mut covered_any = false;
    for (line, slot) in lines.iter().zip(resolved.iter_mut()) {
        if !scope.covers(line) {
            continue;
        }
        // An attached discount is more specific than any code.
        if slot.source != DiscountSource::None {
            continue;
        }
        *slot = LineDiscount {
            rate: discount_code.rate,
            source: DiscountSource::Code,
        };
        covered_any = true;
    }

    if !covered_any {
        return Err(reject(DiscountRejection::NotApplicable));
    }

    Ok(DiscountResolution {
        lines: resolved,
        code: Some(AppliedCode {
            id: discount_code.id.clone(),
            code: discount_code.code.clone(),
        }),
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
