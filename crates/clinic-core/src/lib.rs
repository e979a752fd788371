//! # clinic-core: Pure Ledger Logic for Clinic Ledger
//!
//! This crate holds the reconciliation rules for sales and promissory notes
//! as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Clinic Ledger Architecture                         │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            Presentation adapter (external)                      │   │
//! │  │    Outstanding items ──► Payment form ──► Toasts / badges       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │     clinic-sync: WriteGateway, ReconciliationOrchestrator       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ clinic-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │  ledger   │  │  balance  │  │   │
//! │  │   │   Sale    │  │   Money   │  │ remaining │  │  settle() │  │   │
//! │  │   │   Note    │  │           │  │ percent   │  │Settlement │  │   │
//! │  │   │  Record   │  │           │  │ overdue   │  │           │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Sale, PromissoryNote, PaymentRecord, etc.)
//! - [`money`] - Money type with integer arithmetic
//! - [`ledger`] - Remaining balance, percentage paid, overdue checks
//! - [`balance`] - Settlement of a proposed payment against a target
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use clinic_core::balance::settle;
//! use clinic_core::money::Money;
//! use clinic_core::types::SettlementStatus;
//!
//! let total = Money::from_major(1000);
//! let first = settle(Some(total), Money::zero(), Money::from_major(400)).unwrap();
//! assert_eq!(first.new_remaining, Money::from_major(600));
//! assert_eq!(first.resulting_status, SettlementStatus::Partial);
//!
//! let second = settle(Some(total), first.new_paid_amount, Money::from_major(600)).unwrap();
//! assert_eq!(second.resulting_status, SettlementStatus::Paid);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod balance;
pub mod error;
pub mod ledger;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use balance::{settle, settle_snapshot, Settlement};
pub use error::{CoreError, CoreResult, ValidationError};
pub use ledger::{is_overdue, percentage_paid, remaining, Settleable, TargetSnapshot};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Rounding slack when comparing balances.
///
/// One minor unit: a remaining balance at or below this counts as settled,
/// and a payment may exceed the remaining balance by at most this much.
pub const SETTLEMENT_TOLERANCE: Money = Money::from_cents(1);

/// Source tag stamped on records committed to the local outbox.
pub const FALLBACK_SOURCE: &str = "frontend-fallback";

/// Maximum length of a collection reference number.
pub const MAX_REFERENCE_LEN: usize = 100;

/// Maximum length of free-form payment notes.
pub const MAX_NOTES_LEN: usize = 500;
