//! # Balance Calculator
//!
//! Decides whether a proposed payment fully or partially settles its target,
//! and rejects amounts that cannot be applied.
//!
//! ## Decision Flow
//! ```text
//! settle(total, paid, amount)
//!      │
//!      ├── amount <= 0 ─────────────────────► InvalidAmount
//!      │
//!      ├── remaining == 0 ──────────────────► OverpaymentRejected
//!      │
//!      ├── amount > remaining + tolerance ──► OverpaymentRejected
//!      │
//!      └── new_paid  = min(paid + amount, total)
//!          new_remaining = total - new_paid
//!          status = Paid if new_remaining <= tolerance else Partial
//! ```
//!
//! The same function runs for remote and outbox-bound payments, so the
//! displayed state is identical on both paths.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::ledger::TargetSnapshot;
use crate::money::Money;
use crate::types::SettlementStatus;
use crate::SETTLEMENT_TOLERANCE;

/// Result of applying a payment to a target's balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Settlement {
    /// The amount that was applied.
    pub amount: Money,
    pub new_paid_amount: Money,
    pub new_remaining: Money,
    pub resulting_status: SettlementStatus,
}

/// Computes the settlement of `amount` against a target.
///
/// A missing `total` reads as a remaining balance of zero, so every
/// positive amount is rejected as an overpayment.
pub fn settle(total: Option<Money>, paid: Money, amount: Money) -> CoreResult<Settlement> {
    if !amount.is_positive() {
        return Err(CoreError::InvalidAmount { amount });
    }

    let total = total.unwrap_or(paid);
    let remaining = (total - paid).floor_zero();

    // Nothing left means nothing to absorb slack against.
    if remaining.is_zero() || amount > remaining + SETTLEMENT_TOLERANCE {
        return Err(CoreError::OverpaymentRejected { amount, remaining });
    }

    // Paid never exceeds total, and never moves backwards.
    let new_paid_amount = (paid + amount).min(total).max(paid);
    let new_remaining = (total - new_paid_amount).floor_zero();

    Ok(Settlement {
        amount,
        new_paid_amount,
        new_remaining,
        resulting_status: SettlementStatus::from_remaining(new_remaining),
    })
}

/// Like [`settle`], but names the target when its total is missing.
pub fn settle_snapshot(snapshot: &TargetSnapshot, amount: Money) -> CoreResult<Settlement> {
    if snapshot.total.is_none() && amount.is_positive() {
        return Err(CoreError::MalformedTarget(snapshot.target.to_string()));
    }
    settle(snapshot.total, snapshot.paid, amount)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PaymentTarget;

    fn m(major: i64) -> Money {
        Money::from_major(major)
    }

    #[test]
    fn test_partial_then_full_settlement() {
        let total = Some(m(1000));

        let first = settle(total, Money::zero(), m(400)).unwrap();
        assert_eq!(first.new_paid_amount, m(400));
        assert_eq!(first.new_remaining, m(600));
        assert_eq!(first.resulting_status, SettlementStatus::Partial);

        let second = settle(total, first.new_paid_amount, m(600)).unwrap();
        assert_eq!(second.new_paid_amount, m(1000));
        assert_eq!(second.new_remaining, Money::zero());
        assert_eq!(second.resulting_status, SettlementStatus::Paid);

        let third = settle(total, second.new_paid_amount, Money::from_cents(1));
        assert!(matches!(third, Err(CoreError::OverpaymentRejected { .. })));
    }

    #[test]
    fn test_rejects_non_positive_amounts() {
        assert!(matches!(
            settle(Some(m(100)), Money::zero(), Money::zero()),
            Err(CoreError::InvalidAmount { .. })
        ));
        assert!(matches!(
            settle(Some(m(100)), Money::zero(), Money::from_cents(-1)),
            Err(CoreError::InvalidAmount { .. })
        ));
    }

    #[test]
    fn test_overpayment_reports_remaining() {
        let err = settle(Some(m(500)), m(200), m(301)).unwrap_err();
        match err {
            CoreError::OverpaymentRejected { amount, remaining } => {
                assert_eq!(amount, m(301));
                assert_eq!(remaining, m(300));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_tolerance_absorbs_one_minor_unit() {
        // 300.01 against 300.00 remaining is accepted and clamps at the total.
        let s = settle(Some(m(500)), m(200), Money::from_cents(30_001)).unwrap();
        assert_eq!(s.new_paid_amount, m(500));
        assert_eq!(s.new_remaining, Money::zero());
        assert_eq!(s.resulting_status, SettlementStatus::Paid);

        assert!(settle(Some(m(500)), m(200), Money::from_cents(30_002)).is_err());
    }

    #[test]
    fn test_remaining_within_tolerance_is_paid() {
        let s = settle(Some(m(100)), Money::zero(), Money::from_cents(9_999)).unwrap();
        assert_eq!(s.new_remaining, Money::from_cents(1));
        assert_eq!(s.resulting_status, SettlementStatus::Paid);


        // The last cent can still be paid exactly.
        let last = settle(Some(m(100)), s.new_paid_amount, Money::from_cents(1)).unwrap();
        assert_eq!(last.new_paid_amount, m(100));
        assert_eq!(last.new_remaining, Money::zero());
        assert_eq!(last.resulting_status, SettlementStatus::Paid);
    }

    #[test]
    fn test_one_cent_total_is_payable() {
        let s = settle(Some(Money::from_cents(1)), Money::zero(), Money::from_cents(1)).unwrap();
        assert_eq!(s.new_paid_amount, Money::from_cents(1));
        assert_eq!(s.resulting_status, SettlementStatus::Paid);
    }

    #[test]
    fn test_zero_remaining_rejects_any_amount() {
        assert!(matches!(
            settle(Some(m(100)), m(100), Money::from_cents(1)),
            Err(CoreError::OverpaymentRejected { .. })
        ));
        assert!(matches!(
            settle(Some(Money::zero()), Money::zero(), Money::from_cents(1)),
            Err(CoreError::OverpaymentRejected { .. })
        ));
    }

    #[test]
    fn test_extreme_totals_do_not_overflow() {
        let total = Some(Money::from_cents(i64::MAX));
        let s = settle(total, Money::zero(), Money::from_cents(i64::MAX)).unwrap();
        assert_eq!(s.new_paid_amount, Money::from_cents(i64::MAX));
        assert_eq!(s.resulting_status, SettlementStatus::Paid);
    }

    #[test]
    fn test_sequential_payments_sum() {
        let total = Some(m(1000));
        let a = Money::from_cents(12_345);
        let b = Money::from_cents(55_555);

        let first = settle(total, Money::zero(), a).unwrap();
        let second = settle(total, first.new_paid_amount, b).unwrap();
        assert_eq!(second.new_paid_amount, a + b);
        assert_eq!(second.new_remaining, m(1000) - a - b);
    }

    #[test]
    fn test_malformed_target() {
        assert!(matches!(
            settle(None, Money::zero(), m(1)),
            Err(CoreError::OverpaymentRejected { .. })
        ));

        let snapshot = TargetSnapshot {
            target: PaymentTarget::PromissoryNote("n-1".to_string()),
            total: None,
            paid: Money::zero(),
        };
        match settle_snapshot(&snapshot, m(1)) {
            Err(CoreError::MalformedTarget(target)) => {
                assert_eq!(target, "promissory_note/n-1")
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
