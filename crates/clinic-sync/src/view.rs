//! # Outstanding Items View
//!
//! The per-patient list of sales and promissory notes with their derived
//! balances, as handed to the presentation adapter.
//!
//! Rows carry the backend-known balance plus any unreplayed outbox amount
//! for the same target. A row with outbox money in it is `degraded`: the
//! backend has not confirmed everything it shows.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use clinic_core::{
    percentage_paid, remaining, Money, NoteStatus, PaymentTarget, PromissoryNote, Sale,
    TargetSnapshot, SETTLEMENT_TOLERANCE,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaleRow {
    pub sale: Sale,
    pub remaining: Money,
    pub percentage_paid: u8,
    /// Outbox amount included in `sale.paid_amount`.
    pub pending_amount: Money,
    pub degraded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoteRow {
    pub note: PromissoryNote,
    pub remaining: Money,
    pub percentage_paid: u8,
    /// `Overdue` when unpaid past the due date.
    pub display_status: NoteStatus,
    pub pending_amount: Money,
    pub degraded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutstandingView {
    pub patient_id: String,
    pub sales: Vec<SaleRow>,
    pub notes: Vec<NoteRow>,
    pub generated_at: DateTime<Utc>,
}

/// Adds an outbox amount to a backend paid amount, capped at the total.
pub fn overlay_paid(paid: Money, total: Option<Money>, pending: Money) -> Money {
    let combined = paid + pending;
    match total {
        Some(total) => combined.min(total.max(paid)),
        None => combined,
    }
}

impl OutstandingView {
    pub fn build(
        patient_id: &str,
        sales: &[Sale],
        notes: &[PromissoryNote],
        pending: &BTreeMap<PaymentTarget, Money>,
        now: DateTime<Utc>,
    ) -> Self {
        let pending_for = |target: &PaymentTarget| pending.get(target).copied().unwrap_or_default();

        let sales = sales
            .iter()
            .map(|sale| {
                let pending_amount = pending_for(&sale.target());
                let mut sale = sale.clone();
                if pending_amount.is_positive() {
                    sale.paid_amount =
                        overlay_paid(sale.paid_amount, sale.total_amount, pending_amount);
                    sale.status = sale.derived_status();
                }
                SaleRow {
                    remaining: remaining(&sale),
                    percentage_paid: percentage_paid(&sale),
                    degraded: pending_amount.is_positive(),
                    pending_amount,
                    sale,
                }
            })
            .collect();

        let notes = notes
            .iter()
            .map(|note| {
                let pending_amount = pending_for(&note.target());
                let mut note = note.clone();
                if pending_amount.is_positive() {
                    note.paid_amount = overlay_paid(note.paid_amount, note.amount, pending_amount);
                    note.status = note.derived_status();
                }
                NoteRow {
                    remaining: remaining(&note),
                    percentage_paid: percentage_paid(&note),
                    display_status: note.effective_status(now),
                    degraded: pending_amount.is_positive(),
                    pending_amount,
                    note,
                }
            })
            .collect();

        OutstandingView {
            patient_id: patient_id.to_string(),
            sales,
            notes,
            generated_at: now,
        }
    }

    pub fn sale(&self, id: &str) -> Option<&SaleRow> {
        self.sales.iter().find(|row| row.sale.id == id)
    }

    pub fn note(&self, id: &str) -> Option<&NoteRow> {
        self.notes.iter().find(|row| row.note.id == id)
    }

    /// Balance snapshot of a row as displayed, for the next payment.
    pub fn snapshot(&self, target: &PaymentTarget) -> Option<TargetSnapshot> {
        match target {
            PaymentTarget::Sale(id) => self.sale(id).map(|row| TargetSnapshot::from(&row.sale)),
            PaymentTarget::PromissoryNote(id) => {
                self.note(id).map(|row| TargetSnapshot::from(&row.note))
            }
        }
    }

    /// Outbox amounts as overlaid on this view, per target.
    pub fn pending_totals(&self) -> BTreeMap<PaymentTarget, Money> {
        let sales = self
            .sales
            .iter()
            .filter(|row| row.pending_amount.is_positive())
            .map(|row| (row.sale.target(), row.pending_amount));
        let notes = self
            .notes
            .iter()
            .filter(|row| row.pending_amount.is_positive())
            .map(|row| (row.note.target(), row.pending_amount));
        sales.chain(notes).collect()
    }

    pub fn is_degraded(&self, target: &PaymentTarget) -> bool {
        match target {
            PaymentTarget::Sale(id) => self.sale(id).is_some_and(|row| row.degraded),
            PaymentTarget::PromissoryNote(id) => self.note(id).is_some_and(|row| row.degraded),
        }
    }

    pub fn has_degraded_rows(&self) -> bool {
        self.sales.iter().any(|row| row.degraded) || self.notes.iter().any(|row| row.degraded)
    }

    pub fn outstanding_sales(&self) -> impl Iterator<Item = &SaleRow> {
        self.sales.iter().filter(|row| row.remaining > SETTLEMENT_TOLERANCE)
    }

    pub fn outstanding_notes(&self) -> impl Iterator<Item = &NoteRow> {
        self.notes.iter().filter(|row| row.remaining > SETTLEMENT_TOLERANCE)
    }

    /// Sum of every outstanding balance on the view.
    pub fn total_outstanding(&self) -> Money {
        self.outstanding_sales().map(|row| row.remaining).sum::<Money>()
            + self.outstanding_notes().map(|row| row.remaining).sum::<Money>()
    }
}
