//! # Ledger Accessors
//!
//! Arithmetic-safe reads over anything that carries a total and a paid
//! amount.
//!
//! ```text
//!   total ──────────────────────────────────────────┐
//!   ├──────── paid_amount ────────┤◄── remaining ──►│
//! ```
//!
//! A target with no total (malformed payload) reads as settled:
//! `remaining = 0`, `percentage_paid = 0`. Display degrades instead of
//! erroring; [`crate::balance::settle`] refuses payments against it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::types::{NoteStatus, PaymentTarget, PromissoryNote, Sale};

// =============================================================================
// Settleable
// =============================================================================

/// Something a payment can be applied to.
pub trait Settleable {
    /// Total owed, `None` when unknown.
    fn total(&self) -> Option<Money>;

    /// Amount paid so far.
    fn paid(&self) -> Money;
}

impl Settleable for Sale {
    fn total(&self) -> Option<Money> {
        self.total_amount
    }

    fn paid(&self) -> Money {
        self.paid_amount
    }
}

impl Settleable for PromissoryNote {
    fn total(&self) -> Option<Money> {
        self.amount
    }

    fn paid(&self) -> Money {
        self.paid_amount
    }
}

/// Balance snapshot of a target, taken before a payment is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TargetSnapshot {
    pub target: PaymentTarget,
    pub total: Option<Money>,
    pub paid: Money,
}

impl Settleable for TargetSnapshot {
    fn total(&self) -> Option<Money> {
        self.total
    }

    fn paid(&self) -> Money {
        self.paid
    }
}

impl From<&Sale> for TargetSnapshot {
    fn from(sale: &Sale) -> Self {
        TargetSnapshot {
            target: sale.target(),
            total: sale.total_amount,
            paid: sale.paid_amount,
        }
    }
}

impl From<&PromissoryNote> for TargetSnapshot {
    fn from(note: &PromissoryNote) -> Self {
        TargetSnapshot {
            target: note.target(),
            total: note.amount,
            paid: note.paid_amount,
        }
    }
}

// =============================================================================
// Operations
// =============================================================================

/// Outstanding balance, floored at zero.
pub fn remaining<T: Settleable + ?Sized>(target: &T) -> Money {
    match target.total() {
        Some(total) => (total - target.paid()).floor_zero(),
        None => Money::zero(),
    }
}

/// Share of the total already paid, rounded to a whole percent.
///
/// ```rust
/// use clinic_core::ledger::{percentage_paid, TargetSnapshot};
/// use clinic_core::{Money, PaymentTarget};
///
/// let snapshot = TargetSnapshot {
///     target: PaymentTarget::Sale("s-1".into()),
///     total: Some(Money::from_major(1000)),
///     paid: Money::from_major(400),
/// };
/// assert_eq!(percentage_paid(&snapshot), 40);
/// ```
pub fn percentage_paid<T: Settleable + ?Sized>(target: &T) -> u8 {
    target
        .total()
        .map(|total| total.percent_of(target.paid()))
        .unwrap_or(0)
}

/// True when the note is unpaid and its due date is strictly before `now`.
///
/// Compared on calendar dates: a note due today is not overdue.
pub fn is_overdue(note: &PromissoryNote, now: DateTime<Utc>) -> bool {
    note.status != NoteStatus::Paid && note.due_date < now.date_naive()
}

// =============================================================================
// Unit Tests
// =============================================================================
