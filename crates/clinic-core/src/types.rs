//! # Domain Types
//!
//! Ledger entities shared by every Clinic Ledger crate.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │      Sale       │   │ PromissoryNote  │   │  PaymentRecord  │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id             │◄──│  sale_id (weak) │   │  id (UUID)      │       │
//! │  │  total_amount   │   │  amount         │   │  target ────────┼──► Sale XOR Note
//! │  │  paid_amount    │   │  paid_amount    │   │  amount         │       │
//! │  │  status         │   │  due_date       │   │  method         │       │
//! │  │  payment_plan   │   │  status         │   │  status         │       │
//! │  └─────────────────┘   └─────────────────┘   │  pending/source │       │
//! │                                               └─────────────────┘       │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   SaleStatus    │   │   NoteStatus    │   │ PaymentMethod   │       │
//! │  │  Open           │   │  Pending        │   │  Cash           │       │
//! │  │  Partial        │   │  Partial        │   │  Card           │       │
//! │  │  Paid           │   │  Paid           │   │  BankTransfer   │       │
//! │  └─────────────────┘   │  Overdue (der.) │   │  Check          │       │
//! │                        └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ownership
//! Sales and notes are created by external workflows and arrive from the
//! backend. This crate only ever mutates them by applying a [`Settlement`].
//! A `PaymentRecord` is created exactly once per payment action and is never
//! changed afterwards.
//!
//! [`Settlement`]: crate::balance::Settlement

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::balance::Settlement;
use crate::error::ValidationError;
use crate::money::Money;
use crate::{FALLBACK_SOURCE, SETTLEMENT_TOLERANCE};

// =============================================================================
// Settlement Status
// =============================================================================

/// Outcome of applying a payment: did the target reach full settlement?
///
/// Stored on every [`PaymentRecord`] as it was at the time of the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    /// Target fully settled.
    Paid,
    /// Target still carries an outstanding balance.
    Partial,
}

impl SettlementStatus {
    /// Derives the status from a remaining balance.
    pub fn from_remaining(remaining: Money) -> Self {
        if remaining <= SETTLEMENT_TOLERANCE {
            SettlementStatus::Paid
        } else {
            SettlementStatus::Partial
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementStatus::Paid => "paid",
            SettlementStatus::Partial => "partial",
        }
    }
}

// =============================================================================
// Sale Status
// =============================================================================

/// Settlement state of a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    /// Nothing paid yet.
    #[default]
    Open,
    /// Some but not all of the total paid.
    Partial,
    /// Fully paid.
    Paid,
}

// =============================================================================
// Note Status
// =============================================================================

/// Collection state of a promissory note.
///
/// `Overdue` is never stored by this crate; it is derived from the due date
/// by [`PromissoryNote::effective_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum NoteStatus {
    #[default]
    Pending,
    Partial,
    Paid,
    Overdue,
}

// =============================================================================
// Payment Method
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    BankTransfer,
    Check,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Check => "check",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = ValidationError;

    /// Accepts the canonical names plus the aliases the payment forms send.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cash" => Ok(PaymentMethod::Cash),
            "card" | "credit" | "credit_card" | "debit" => Ok(PaymentMethod::Card),
            "bank_transfer" | "transfer" | "eft" | "havale" => Ok(PaymentMethod::BankTransfer),
            "check" | "cheque" => Ok(PaymentMethod::Check),
            _ => Err(ValidationError::NotAllowed {
                field: "method".to_string(),
                allowed: ["cash", "card", "bank_transfer", "check"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            }),
        }
    }
}

// =============================================================================
// Payment Plan
// =============================================================================

/// Installment plan attached to a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentPlan {
    /// Number of installments (always >= 1).
    pub installment_count: u32,

    /// Per-installment amount, when the backend computed one.
    pub installment_amount: Option<Money>,
}

// =============================================================================
// Sale
// =============================================================================

/// A sale with its running payment balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Sale {
    pub id: String,

    /// Patient the sale belongs to.
    pub patient_id: Option<String>,

    /// Total owed. `None` when the backend sent a malformed sale; such a
    /// sale is displayed as settled.
    pub total_amount: Option<Money>,

    /// Sum of payments applied so far.
    pub paid_amount: Money,

    pub status: SaleStatus,

    pub payment_plan: Option<PaymentPlan>,

    #[ts(as = "Option<String>")]
    pub sale_date: Option<DateTime<Utc>>,
}

impl Sale {
    /// Derives the status from the current balance.
    pub fn derived_status(&self) -> SaleStatus {
        let remaining = crate::ledger::remaining(self);
        if remaining <= SETTLEMENT_TOLERANCE {
            SaleStatus::Paid
        } else if self.paid_amount.is_positive() {
            SaleStatus::Partial
        } else {
            SaleStatus::Open
        }
    }

    /// Applies a settlement computed for this sale.
    pub fn apply(&mut self, settlement: &Settlement) {
        self.paid_amount = settlement.new_paid_amount;
        self.status = match settlement.resulting_status {
            SettlementStatus::Paid => SaleStatus::Paid,
            SettlementStatus::Partial => SaleStatus::Partial,
        };
    }

    pub fn target(&self) -> PaymentTarget {
        PaymentTarget::Sale(self.id.clone())
    }
}

// =============================================================================
// Promissory Note
// =============================================================================

/// One due-dated installment obligation, optionally linked to a sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PromissoryNote {
    pub id: String,

    pub patient_id: Option<String>,

    /// Originating sale. Lookup only; the note does not own the sale.
    pub sale_id: Option<String>,

    /// Position within the series (1-based).
    pub note_number: u32,

    /// Size of the series.
    pub total_notes: u32,

    /// Face amount. `None` when the backend sent a malformed note.
    pub amount: Option<Money>,

    pub paid_amount: Money,

    #[ts(as = "String")]
    pub due_date: NaiveDate,

    /// Stored status (never `Overdue`, see [`NoteStatus`]).
    pub status: NoteStatus,
}

impl PromissoryNote {
    /// Derives the stored status from the current balance.
    pub fn derived_status(&self) -> NoteStatus {
        let remaining = crate::ledger::remaining(self);
        if remaining <= SETTLEMENT_TOLERANCE {
            NoteStatus::Paid
        } else if self.paid_amount.is_positive() {
            NoteStatus::Partial
        } else {
            NoteStatus::Pending
        }
    }

    /// Status as displayed: `Overdue` when unpaid past the due date.
    pub fn effective_status(&self, now: DateTime<Utc>) -> NoteStatus {
        if crate::ledger::is_overdue(self, now) {
            NoteStatus::Overdue
        } else {
            self.status
        }
    }

    /// Applies a settlement computed for this note.
    pub fn apply(&mut self, settlement: &Settlement) {
        self.paid_amount = settlement.new_paid_amount;
        self.status = match settlement.resulting_status {
            SettlementStatus::Paid => NoteStatus::Paid,
            SettlementStatus::Partial => NoteStatus::Partial,
        };
    }

    pub fn target(&self) -> PaymentTarget {
        PaymentTarget::PromissoryNote(self.id.clone())
    }
}

// =============================================================================
// Payment Target
// =============================================================================

/// What a payment is applied to: a sale XOR a promissory note.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum PaymentTarget {
    Sale(String),
    PromissoryNote(String),
}

impl PaymentTarget {
    pub fn id(&self) -> &str {
        match self {
            PaymentTarget::Sale(id) | PaymentTarget::PromissoryNote(id) => id,
        }
    }

    /// Stable kind tag, also used as the storage column value.
    pub fn kind(&self) -> &'static str {
        match self {
            PaymentTarget::Sale(_) => "sale",
            PaymentTarget::PromissoryNote(_) => "promissory_note",
        }
    }

    /// Rebuilds a target from its stored kind tag.
    pub fn from_parts(kind: &str, id: impl Into<String>) -> Result<Self, ValidationError> {
        match kind {
            "sale" => Ok(PaymentTarget::Sale(id.into())),
            "promissory_note" => Ok(PaymentTarget::PromissoryNote(id.into())),
            other => Err(ValidationError::InvalidFormat {
                field: "target_kind".to_string(),
                reason: format!("unknown target kind '{}'", other),
            }),
        }
    }
}

impl std::fmt::Display for PaymentTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind(), self.id())
    }
}

// =============================================================================
// Payment Record
// =============================================================================

/// One payment against a sale or promissory note.
///
/// Immutable after creation. When the backend cannot be reached the same
/// record is committed to the local outbox with `pending = true` and
/// `source = "frontend-fallback"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentRecord {
    /// UUID v4; doubles as the idempotency key when replaying.
    pub id: String,

    pub target: PaymentTarget,

    /// Amount paid (always > 0).
    pub amount: Money,

    pub method: PaymentMethod,

    #[ts(as = "String")]
    pub date: DateTime<Utc>,

    /// Whether the target was fully settled by this record.
    pub status: SettlementStatus,

    /// Collection reference (receipt or slip number).
    pub reference: Option<String>,

    pub notes: Option<String>,

    /// True when the record lives only in the local outbox.
    #[serde(default)]
    pub pending: bool,

    /// Origin tag for outbox records.
    pub source: Option<String>,
}

impl PaymentRecord {
    /// Creates a new confirmed-path record with a fresh id.
    pub fn new(
        target: PaymentTarget,
        amount: Money,
        method: PaymentMethod,
        status: SettlementStatus,
        date: DateTime<Utc>,
    ) -> Self {
        PaymentRecord {
            id: Uuid::new_v4().to_string(),
            target,
            amount,
            method,
            date,
            status,
            reference: None,
            notes: None,
            pending: false,
            source: None,
        }
    }

    pub fn with_reference(mut self, reference: Option<String>) -> Self {
        self.reference = reference;
        self
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }

    /// Returns the record tagged for the local outbox.
    pub fn into_fallback(mut self) -> Self {
        self.pending = true;
        self.source = Some(FALLBACK_SOURCE.to_string());
        self
    }

    pub fn is_fallback(&self) -> bool {
        self.pending && self.source.as_deref() == Some(FALLBACK_SOURCE)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
