//! # Validation Module
//!
//! Input validation for payment submissions.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Payment form (external)                                      │
//! │  └── Immediate user feedback                                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Target id, reference and notes shape                              │
//! │  └── Wire amounts are finite                                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: balance::settle                                              │
//! │  └── Amount > 0 and within the remaining balance                       │
//! │                                                                         │
//! │  Nothing in layers 2 or 3 touches the network or the outbox.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use clinic_core::validation::{validate_reference, validate_target_id};
//!
//! validate_target_id("sale-42").unwrap();
//! assert_eq!(validate_reference(Some("  R-1 ")).unwrap(), Some("R-1".to_string()));
//! ```

use crate::error::ValidationError;
use crate::money::Money;
use crate::{MAX_NOTES_LEN, MAX_REFERENCE_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a sale or promissory-note identifier.
///
/// ## Rules
/// - Must not be empty
/// - At most 64 characters
/// - No whitespace or path separators (ids are interpolated into URLs)
pub fn validate_target_id(id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "target id".to_string(),
        });
    }

    if id.len() > 64 {
        return Err(ValidationError::TooLong {
            field: "target id".to_string(),
            max: 64,
        });
    }

    if id
        .chars()
        .any(|c| c.is_whitespace() || c == '/' || c == '?' || c == '#')
    {
        return Err(ValidationError::InvalidFormat {
            field: "target id".to_string(),
            reason: "must not contain whitespace, '/', '?' or '#'".to_string(),
        });
    }

    Ok(())
}

/// Normalises an optional free-text field: trims, maps blank to `None`,
/// enforces a maximum length.
fn normalize_optional(
    field: &str,
    value: Option<&str>,
    max: usize,
) -> ValidationResult<Option<String>> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(Some(value.to_string()))
}

/// Validates a collection reference number.
///
/// ## Returns
/// The trimmed reference, or `None` when blank.
pub fn validate_reference(reference: Option<&str>) -> ValidationResult<Option<String>> {
    normalize_optional("reference", reference, MAX_REFERENCE_LEN)
}

/// Validates free-form payment notes.
pub fn validate_notes(notes: Option<&str>) -> ValidationResult<Option<String>> {
    normalize_optional("notes", notes, MAX_NOTES_LEN)
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Converts a decimal amount entered in the form or sent by the backend.
///
/// ## Example
/// ```rust
/// use clinic_core::validation::parse_amount;
///
/// assert_eq!(parse_amount("amount", 400.5).unwrap().cents(), 40050);
/// assert!(parse_amount("amount", f64::NAN).is_err());
/// ```
pub fn parse_amount(field: &str, value: f64) -> ValidationResult<Money> {
    Money::from_major_f64(value).ok_or_else(|| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: "must be a finite number".to_string(),
    })
}

/// Validates an installment count on a payment plan.
///
/// ## Rules
/// - At least 1
/// - At most 120 (ten years of monthly notes)
pub fn validate_installment_count(count: i64) -> ValidationResult<u32> {
    if !(1..=120).contains(&count) {
        return Err(ValidationError::OutOfRange {
            field: "installment_count".to_string(),
            min: 1,
            max: 120,
        });
    }

    Ok(count as u32)
}

// =============================================================================
// UUID Validators
// =============================================================================

/// Validates a PaymentRecord id (UUID).
///
/// ## Example
/// ```rust
/// use clinic_core::validation::validate_record_id;
///
/// assert!(validate_record_id("550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_record_id("not-a-uuid").is_err());
/// ```
pub fn validate_record_id(id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "id".to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: "id".to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
