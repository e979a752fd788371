//! # Error Types
//!
//! Domain-specific error types for clinic-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  clinic-core errors (this file)                                        │
//! │  ├── CoreError        - Ledger rule violations                         │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  clinic-db errors (separate crate)                                     │
//! │  └── DbError          - Outbox store failures                          │
//! │                                                                         │
//! │  clinic-sync errors (separate crate)                                   │
//! │  └── SyncError        - Remote, validation and local-store failures    │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → SyncError → presentation adapter  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every `CoreError` is raised before any network or store access, so a
//! caller seeing one knows no PaymentRecord was created.

use thiserror::Error;

use crate::money::Money;

// =============================================================================
// Core Error
// =============================================================================

/// Ledger rule violations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Payment amount is zero or negative.
    #[error("Invalid payment amount {amount}: must be greater than zero")]
    InvalidAmount { amount: Money },

    /// Payment exceeds the outstanding balance by more than the tolerance.
    ///
    /// ## User Workflow
    /// ```text
    /// Sale total 1000.00, paid 1000.00
    ///      │
    ///      ▼
    /// Pay 50.00
    ///      │
    ///      ▼
    /// OverpaymentRejected { amount: 50.00, remaining: 0.00 }
    ///      │
    ///      ▼
    /// Form stays open with an inline error
    /// ```
    #[error("Payment of {amount} exceeds remaining balance {remaining}")]
    OverpaymentRejected { amount: Money, remaining: Money },

    /// The target arrived without a total and cannot accept payments.
    #[error("Target {0} has no total amount")]
    MalformedTarget(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID, non-finite amount).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
