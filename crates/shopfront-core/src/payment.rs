//! # Payment Reconciliation
//!
//! Checks that the payment instruments offered for an order add up to its
//! total and derives the server-side fields (cash change, check state).
//!
//! ## Split Tender Example
//! ```text
//! Total: 150.00
//!
//!   cash   100.00  (given 120.00 → change 20.00)   Completed
//!   check   50.00  (#004211)                        Received
//!   ─────────────
//!   paid   150.00  delta 0.00  ✓
//!
//! Order payment status: Pending (a check has not cleared yet)
//! ```
//!
//! `delta = total - paid`: positive means the customer is short, negative
//! means overpaid. Anything beyond the tolerance is a `PaymentMismatch`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{Payment, PaymentMethod, PaymentState, PaymentStatus};

// =============================================================================
// Input
// =============================================================================

/// One payment instrument as supplied by the client. Untrusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PaymentTender {
    pub method: PaymentMethod,
    /// Missing on a legacy single tender means "the full total".
    #[serde(default)]
    pub amount_cents: Option<i64>,
    #[serde(default)]
    pub cash_given_cents: Option<i64>,
    #[serde(default)]
    pub check_number: Option<String>,
    #[serde(default)]
    pub check_bank: Option<String>,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub check_date: Option<NaiveDate>,
    #[serde(default)]
    pub reference: Option<String>,
}

impl PaymentTender {
    pub fn new(method: PaymentMethod, amount_cents: i64) -> Self {
        PaymentTender {
            method,
            amount_cents: Some(amount_cents),
            cash_given_cents: None,
            check_number: None,
            check_bank: None,
            check_date: None,
            reference: None,
        }
    }

    pub fn cash(amount_cents: i64) -> Self {
        Self::new(PaymentMethod::Cash, amount_cents)
    }

    pub fn card(amount_cents: i64) -> Self {
        Self::new(PaymentMethod::Card, amount_cents)
    }

    pub fn check(amount_cents: i64, number: impl Into<String>) -> Self {
        PaymentTender {
            check_number: Some(number.into()),
            ..Self::new(PaymentMethod::Check, amount_cents)
        }
    }

    pub fn with_cash_given(mut self, cents: i64) -> Self {
        self.cash_given_cents = Some(cents);
        self
    }
}

/// The two accepted payment shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentInput {
    /// Older clients send a single instrument, possibly without an amount.
    Legacy(PaymentTender),
    Split(Vec<PaymentTender>),
}

impl PaymentInput {
    pub fn none() -> Self {
        PaymentInput::Split(Vec::new())
    }
}

// =============================================================================
// Output
// =============================================================================

/// A validated instrument, ready to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciledPayment {
    pub method: PaymentMethod,
    pub amount: Money,
    pub cash_given: Option<Money>,
    pub cash_change: Option<Money>,
    pub check_number: Option<String>,
    pub check_bank: Option<String>,
    pub check_date: Option<NaiveDate>,
    pub reference: Option<String>,
    pub state: PaymentState,
}

impl ReconciledPayment {
    pub fn to_payment(
        &self,
        id: impl Into<String>,
        order_id: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Payment {
        Payment {
            id: id.into(),
            order_id: order_id.into(),
            method: self.method,
            amount_cents: self.amount.cents(),
            cash_given_cents: self.cash_given.map(|m| m.cents()),
            cash_change_cents: self.cash_change.map(|m| m.cents()),
            check_number: self.check_number.clone(),
            check_bank: self.check_bank.clone(),
            check_date: self.check_date,
            reference: self.reference.clone(),
            state: self.state,
            created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub payments: Vec<ReconciledPayment>,
    pub paid: Money,
    pub payment_status: PaymentStatus,
}

// =============================================================================
// Reconciler
// =============================================================================

fn invalid(reason: impl Into<String>) -> CoreError {
    CoreError::InvalidPayment {
        reason: reason.into(),
    }
}

fn overflow() -> CoreError {
    invalid("payment amounts are out of range")
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Validates payment instruments against `total`.
///
/// ## Rules
/// - non-cash instruments need a positive amount (zero only when total is 0)
/// - cash may be 0 only when the other instruments cover the total; zero
///   cash entries are dropped
/// - checks need a check number and start as `Received`
/// - `|total - paid|` must not exceed `tolerance`
pub fn reconcile(total: Money, input: &PaymentInput, tolerance: Money) -> CoreResult<Reconciliation> {
    let tenders: Vec<(PaymentTender, Money)> = match input {
        PaymentInput::Legacy(tender) => {
            let amount = tender.amount_cents.map(Money::from_cents).unwrap_or(total);
            vec![(tender.clone(), amount)]
        }
        PaymentInput::Split(tenders) => tenders
            .iter()
            .map(|t| (t.clone(), Money::from_cents(t.amount_cents.unwrap_or(0))))
            .collect(),
    };

    let non_cash_paid = Money::checked_sum(
        tenders
            .iter()
            .filter(|(t, _)| t.method != PaymentMethod::Cash)
            .map(|(_, amount)| *amount),
    )
    .ok_or_else(overflow)?;

    let mut payments = Vec::with_capacity(tenders.len());
    for (tender, amount) in tenders {
        if amount.is_negative() {
            return Err(invalid(format!(
                "{} amount cannot be negative",
                tender.method
            )));
        }

        if tender.method == PaymentMethod::Cash {
            if amount.is_zero() {
                let covered = non_cash_paid.checked_add(tolerance).ok_or_else(overflow)?;
                if covered < total {
                    return Err(invalid(
                        "cash amount of 0 requires other payments covering the total",
                    ));
                }
                continue;
            }
        } else if amount.is_zero() {
            if total.is_zero() {
                continue;
            }
            return Err(invalid(format!("{} amount must be positive", tender.method)));
        }

        let (cash_given, cash_change) = match (tender.method, tender.cash_given_cents) {
            (PaymentMethod::Cash, Some(given)) => {
                let given = Money::from_cents(given);
                if given < amount {
                    return Err(invalid(format!(
                        "cash given {} is less than cash amount {}",
                        given, amount
                    )));
                }
                (Some(given), Some(given - amount))
            }
            _ => (None, None),
        };

        let (check_number, state) = if tender.method == PaymentMethod::Check {
            let number = non_blank(&tender.check_number)
                .ok_or_else(|| invalid("check payments require a check number"))?;
            (Some(number), PaymentState::Received)
        } else {
            (None, PaymentState::Completed)
        };

        payments.push(ReconciledPayment {
            method: tender.method,
            amount,
            cash_given,
            cash_change,
            check_number,
            check_bank: non_blank(&tender.check_bank),
            check_date: tender.check_date,
            reference: non_blank(&tender.reference),
            state,
        });
    }

    let paid = Money::checked_sum(payments.iter().map(|p| p.amount)).ok_or_else(overflow)?;
    let delta = total - paid;
    if delta.abs() > tolerance {
        return Err(CoreError::PaymentMismatch { total, paid, delta });
    }

    let payment_status = if payments.iter().any(|p| p.state == PaymentState::Received) {
        PaymentStatus::Pending
    } else {
        PaymentStatus::Completed
    };

    Ok(Reconciliation {
        payments,
        paid,
        payment_status,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: Money = Money::from_cents(1);

    fn split(tenders: Vec<PaymentTender>) -> PaymentInput {
        PaymentInput::Split(tenders)
    }

    #[test]
    fn test_single_cash_exact() {
        let result = reconcile(
            Money::from_cents(20000),
            &split(vec![PaymentTender::cash(20000)]),
            TOLERANCE,
        )
        .unwrap();
        assert_eq!(result.paid.cents(), 20000);
        assert_eq!(result.payment_status, PaymentStatus::Completed);
        assert_eq!(result.payments[0].state, PaymentState::Completed);
    }

    #[test]
    fn test_cash_and_check_is_pending() {
        let result = reconcile(
            Money::from_cents(15000),
            &split(vec![
                PaymentTender::cash(10000),
                PaymentTender::check(5000, "004211"),
            ]),
            TOLERANCE,
        )
        .unwrap();
        assert_eq!(result.payment_status, PaymentStatus::Pending);
        assert_eq!(result.payments[1].state, PaymentState::Received);
        assert_eq!(result.payments[1].check_number.as_deref(), Some("004211"));
    }

    #[test]
    fn test_short_payment_reports_signed_delta() {
        let err = reconcile(
            Money::from_cents(15000),
            &split(vec![
                PaymentTender::cash(10000),
                PaymentTender::check(4000, "004211"),
            ]),
            TOLERANCE,
        )
        .unwrap_err();
        match err {
            CoreError::PaymentMismatch { total, paid, delta } => {
                assert_eq!(total.cents(), 15000);
                assert_eq!(paid.cents(), 14000);
                assert_eq!(delta.cents(), 1000);
            }
            other => panic!("expected PaymentMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_overpayment_is_negative_delta() {
        let err = reconcile(
            Money::from_cents(1000),
            &split(vec![PaymentTender::card(1200)]),
            TOLERANCE,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CoreError::PaymentMismatch { delta, .. } if delta.cents() == -200
        ));
    }

    #[test]
    fn test_within_tolerance_is_accepted() {
        let result = reconcile(
            Money::from_cents(1000),
            &split(vec![PaymentTender::card(999)]),
            TOLERANCE,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_legacy_tender_defaults_to_total() {
        let tender = PaymentTender {
            amount_cents: None,
            ..PaymentTender::card(0)
        };
        let result = reconcile(
            Money::from_cents(4321),
            &PaymentInput::Legacy(tender),
            TOLERANCE,
        )
        .unwrap();
        assert_eq!(result.payments[0].amount.cents(), 4321);
    }

    #[test]
    fn test_cash_change_is_derived() {
        let result = reconcile(
            Money::from_cents(1750),
            &split(vec![PaymentTender::cash(1750).with_cash_given(2000)]),
            TOLERANCE,
        )
        .unwrap();
        assert_eq!(result.payments[0].cash_change, Some(Money::from_cents(250)));

        let err = reconcile(
            Money::from_cents(1750),
            &split(vec![PaymentTender::cash(1750).with_cash_given(1000)]),
            TOLERANCE,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidPayment { .. }));
    }

    #[test]
    fn test_zero_cash_top_up() {
        let result = reconcile(
            Money::from_cents(5000),
            &split(vec![PaymentTender::card(5000), PaymentTender::cash(0)]),
            TOLERANCE,
        )
        .unwrap();
        assert_eq!(result.payments.len(), 1);

        let err = reconcile(
            Money::from_cents(5000),
            &split(vec![PaymentTender::card(3000), PaymentTender::cash(0)]),
            TOLERANCE,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidPayment { .. }));
    }

    #[test]
    fn test_non_cash_must_be_positive() {
        let err = reconcile(
            Money::from_cents(5000),
            &split(vec![PaymentTender::card(0), PaymentTender::cash(5000)]),
            TOLERANCE,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidPayment { .. }));

        let err = reconcile(
            Money::from_cents(5000),
            &split(vec![PaymentTender::cash(-100)]),
            TOLERANCE,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidPayment { .. }));
    }

    #[test]
    fn test_check_requires_number() {
        let err = reconcile(
            Money::from_cents(5000),
            &split(vec![PaymentTender::check(5000, "  ")]),
            TOLERANCE,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidPayment { .. }));
    }

    #[test]
    fn test_zero_total_accepts_empty_or_zero_payments() {
        let empty = reconcile(Money::zero(), &PaymentInput::none(), TOLERANCE).unwrap();
        assert!(empty.payments.is_empty());
        assert_eq!(empty.payment_status, PaymentStatus::Completed);

        let zero = reconcile(
            Money::zero(),
            &split(vec![PaymentTender::card(0)]),
            TOLERANCE,
        )
        .unwrap();
        assert!(zero.payments.is_empty());
    }

    #[test]
    fn test_empty_payments_with_positive_total_mismatch() {
        let err = reconcile(Money::from_cents(100), &PaymentInput::none(), TOLERANCE).unwrap_err();
        assert!(matches!(
            err,
            CoreError::PaymentMismatch { delta, .. } if delta.cents() == 100
        ));
    }

    #[test]
    fn test_amounts_overflowing_i64_are_rejected() {
        let err = reconcile(
            Money::from_cents(15000),
            &split(vec![PaymentTender::card(i64::MAX), PaymentTender::card(1)]),
            TOLERANCE,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidPayment { .. }));

        let err = reconcile(
            Money::from_cents(15000),
            &split(vec![PaymentTender::cash(i64::MAX), PaymentTender::card(1)]),
            TOLERANCE,
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidPayment { .. }));

        let err = reconcile(
            Money::from_cents(15000),
            &split(vec![PaymentTender::card(i64::MAX), PaymentTender::cash(0)]),
            Money::from_cents(1),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidPayment { .. }));
    }

    #[test]
    fn test_tender_deserializes_camel_case() {
        let json = r#"{"method":"check","amountCents":5000,"checkNumber":"77","checkDate":"2024-06-01"}"#;
        let tender: PaymentTender = serde_json::from_str(json).unwrap();
        assert_eq!(tender.method, PaymentMethod::Check);
        assert_eq!(tender.amount_cents, Some(5000));
        assert_eq!(
            tender.check_date,
            Some(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())
        );
    }
}
