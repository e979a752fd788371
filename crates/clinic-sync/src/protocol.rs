//! # Backend Wire Protocol
//!
//! Request and response bodies exchanged with the clinic backend.
//!
//! ## Endpoints
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Backend Endpoints                                │
//! │                                                                         │
//! │  WRITES                                                                │
//! │  ──────                                                                │
//! │  POST payment-records               ◄── SalePaymentRequest             │
//! │  POST promissory-notes/{id}/collect ◄── NoteCollectionRequest          │
//! │       ───► ApiEnvelope<RemoteAck>                                      │
//! │                                                                         │
//! │  READS (refresh)                                                       │
//! │  ─────                                                                 │
//! │  GET patients/{id}/sales            ───► ApiEnvelope<Vec<RemoteSale>>  │
//! │  GET patients/{id}/promissory-notes ───► ApiEnvelope<Vec<RemoteNote>>  │
//! │  GET sales/{id}/payment-plan        ───► ApiEnvelope<RemotePaymentPlan>│
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Format
//! JSON, camelCase keys, amounts as decimal major units. Responses accept
//! snake_case aliases since older endpoints still emit them. Every response
//! is wrapped in an envelope:
//! ```json
//! { "success": true, "data": { ... } }
//! { "success": false, "error": "Sale is closed" }
//! ```
//!
//! Amounts become [`Money`] here and nowhere else.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use clinic_core::validation::{parse_amount, validate_installment_count, validate_target_id};
use clinic_core::{
    Money, NoteStatus, PaymentPlan, PaymentRecord, PaymentTarget, PromissoryNote, Sale,
    SaleStatus,
};

use crate::error::{SyncError, SyncResult};

/// Value of `paymentType` on every sale payment we send.
pub const PAYMENT_TYPE: &str = "payment";

// =============================================================================
// Envelope
// =============================================================================

/// Success/failure wrapper around every backend response.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    /// Absent on some endpoints; then the presence of `error` decides.
    #[serde(default)]
    pub success: Option<bool>,
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl<T> ApiEnvelope<T> {
    pub fn is_success(&self) -> bool {
        self.success.unwrap_or(self.error.is_none())
    }

    /// Unwraps the payload, turning `success: false` into
    /// [`SyncError::RemoteFailure`].
    pub fn into_result(self) -> SyncResult<Option<T>> {
        if self.is_success() {
            return Ok(self.data);
        }

        let reason = self
            .error
            .or(self.message)
            .unwrap_or_else(|| "request was not successful".to_string());
        Err(SyncError::RemoteFailure(reason))
    }
}

// =============================================================================
// Write Requests
// =============================================================================

/// Body of `POST payment-records`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SalePaymentRequest {
    pub sale_id: String,
    pub amount: f64,
    pub payment_method: String,
    pub payment_date: DateTime<Utc>,
    pub payment_type: &'static str,
    /// `paid` or `partial`, as computed before the write.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// PaymentRecord id; the backend drops repeats of a key it has seen.
    pub idempotency_key: String,
}

impl SalePaymentRequest {
    pub fn from_record(record: &PaymentRecord) -> SyncResult<Self> {
        let PaymentTarget::Sale(sale_id) = &record.target else {
            return Err(SyncError::InvalidPayload(format!(
                "{} is not a sale payment",
                record.target
            )));
        };

        Ok(SalePaymentRequest {
            sale_id: sale_id.clone(),
            amount: record.amount.to_major_f64(),
            payment_method: record.method.as_str().to_string(),
            payment_date: record.date,
            payment_type: PAYMENT_TYPE,
            status: record.status.as_str().to_string(),
            notes: record.notes.clone(),
            idempotency_key: record.id.clone(),
        })
    }
}

/// Body of `POST promissory-notes/{id}/collect`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteCollectionRequest {
    pub amount: f64,
    pub payment_date: DateTime<Utc>,
    pub payment_method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub idempotency_key: String,
}

impl NoteCollectionRequest {
    pub fn from_record(record: &PaymentRecord) -> SyncResult<Self> {
        if !matches!(record.target, PaymentTarget::PromissoryNote(_)) {
            return Err(SyncError::InvalidPayload(format!(
                "{} is not a promissory note collection",
                record.target
            )));
        }

        Ok(NoteCollectionRequest {
            amount: record.amount.to_major_f64(),
            payment_date: record.date,
            payment_method: record.method.as_str().to_string(),
            reference_number: record.reference.clone(),
            notes: record.notes.clone(),
            idempotency_key: record.id.clone(),
        })
    }
}

// =============================================================================
// Responses
// =============================================================================

/// Payload of a successful write.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteAck {
    #[serde(default, alias = "id", alias = "remote_id", alias = "paymentId")]
    pub remote_id: Option<String>,

    /// Target's paid amount after the write, when the endpoint reports it.
    #[serde(default, alias = "paid_amount")]
    pub paid_amount: Option<f64>,
}

/// Sale as returned by `GET patients/{id}/sales`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSale {
    pub id: String,
    #[serde(default, alias = "patient_id")]
    pub patient_id: Option<String>,
    #[serde(default, alias = "total_amount")]
    pub total_amount: Option<f64>,
    #[serde(default, alias = "paid_amount")]
    pub paid_amount: Option<f64>,
    #[serde(default, alias = "payment_plan")]
    pub payment_plan: Option<RemotePaymentPlan>,
    #[serde(default, alias = "sale_date")]
    pub sale_date: Option<DateTime<Utc>>,
}

/// Promissory note as returned by `GET patients/{id}/promissory-notes`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteNote {
    pub id: String,
    #[serde(default, alias = "patient_id")]
    pub patient_id: Option<String>,
    #[serde(default, alias = "sale_id")]
    pub sale_id: Option<String>,
    #[serde(default, alias = "note_number")]
    pub note_number: Option<u32>,
    #[serde(default, alias = "total_notes")]
    pub total_notes: Option<u32>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default, alias = "paid_amount")]
    pub paid_amount: Option<f64>,
    /// `None` when missing or unreadable; the note is then skipped.
    #[serde(default, alias = "due_date", deserialize_with = "de_due_date")]
    pub due_date: Option<NaiveDate>,
}

/// Installment plan as returned by `GET sales/{id}/payment-plan`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemotePaymentPlan {
    #[serde(alias = "installment_count")]
    pub installment_count: i64,
    #[serde(default, alias = "installment_amount")]
    pub installment_amount: Option<f64>,
}

/// Accepts a plain date or a full timestamp. Anything else reads as `None`
/// so one bad row does not fail the whole list.
fn de_due_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(serde_json::Value::as_str)
        .and_then(parse_due_date))
}

fn parse_due_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok().or_else(|| {
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|ts| ts.with_timezone(&Utc).date_naive())
    })
}

// =============================================================================
// Conversion to Domain
// =============================================================================

/// A total that is missing, unreadable or negative leaves the target
/// malformed rather than failing the whole list.
fn lenient_total(field: &str, value: Option<f64>) -> Option<Money> {
    value
        .and_then(|v| parse_amount(field, v).ok())
        .filter(|m| !m.is_negative())
}

fn paid_amount(value: Option<f64>) -> Money {
    lenient_total("paid_amount", value).unwrap_or_default()
}

impl RemoteAck {
    pub fn paid_amount(&self) -> Option<Money> {
        lenient_total("paid_amount", self.paid_amount)
    }
}

impl RemotePaymentPlan {
    pub fn into_plan(self) -> SyncResult<PaymentPlan> {
        let installment_count = validate_installment_count(self.installment_count)?;
        let installment_amount = match self.installment_amount {
            Some(v) => Some(parse_amount("installment_amount", v)?),
            None => None,
        };

        Ok(PaymentPlan {
            installment_count,
            installment_amount,
        })
    }
}

impl RemoteSale {
    /// Converts to a [`Sale`], re-deriving status from the balance.
    pub fn into_sale(self) -> SyncResult<Sale> {
        validate_target_id(&self.id)?;

        let payment_plan = self.payment_plan.map(RemotePaymentPlan::into_plan).transpose()?;

        let mut sale = Sale {
            id: self.id,
            patient_id: self.patient_id,
            total_amount: lenient_total("total_amount", self.total_amount),
            paid_amount: paid_amount(self.paid_amount),
            status: SaleStatus::Open,
            payment_plan,
            sale_date: self.sale_date,
        };
        sale.status = sale.derived_status();
        Ok(sale)
    }
}

impl RemoteNote {
    /// Converts to a [`PromissoryNote`], re-deriving status from the balance.
    pub fn into_note(self) -> SyncResult<PromissoryNote> {
        validate_target_id(&self.id)?;
        let due_date = self.due_date.ok_or_else(|| {
            SyncError::InvalidPayload(format!("promissory note {} has no readable due date", self.id))
        })?;

        let note_number = self.note_number.unwrap_or(1).max(1);
        let mut note = PromissoryNote {
            id: self.id,
            patient_id: self.patient_id,
            sale_id: self.sale_id,
            note_number,
            total_notes: self.total_notes.unwrap_or(note_number).max(note_number),
            amount: lenient_total("amount", self.amount),
            paid_amount: paid_amount(self.paid_amount),
            due_date,
            status: NoteStatus::Pending,
        };
        note.status = note.derived_status();
        Ok(note)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinic_core::{PaymentMethod, SettlementStatus};

    fn record(target: PaymentTarget) -> PaymentRecord {
        PaymentRecord::new(
            target,
            Money::from_major_minor(400, 50),
            PaymentMethod::Card,
            SettlementStatus::Partial,
            Utc::now(),
        )
        .with_reference(Some("RCPT-9".to_string()))
    }

    #[test]
    fn test_sale_payment_body() {
        let rec = record(PaymentTarget::Sale("sale-1".into()));
        let body = serde_json::to_value(SalePaymentRequest::from_record(&rec).unwrap()).unwrap();

        assert_eq!(body["saleId"], "sale-1");
        assert_eq!(body["amount"], 400.5);
        assert_eq!(body["paymentMethod"], "card");
        assert_eq!(body["paymentType"], "payment");
        assert_eq!(body["status"], "partial");
        assert_eq!(body["idempotencyKey"], rec.id.as_str());
        assert!(body.get("notes").is_none());
    }

    #[test]
    fn test_note_collection_body() {
        let rec = record(PaymentTarget::PromissoryNote("note-1".into()));
        let body =
            serde_json::to_value(NoteCollectionRequest::from_record(&rec).unwrap()).unwrap();

        assert_eq!(body["referenceNumber"], "RCPT-9");
        assert_eq!(body["paymentMethod"], "card");
        assert!(body.get("saleId").is_none());
    }

    #[test]
    fn test_requests_are_not_interchangeable() {
        let sale = record(PaymentTarget::Sale("sale-1".into()));
        let note = record(PaymentTarget::PromissoryNote("note-1".into()));

        assert!(NoteCollectionRequest::from_record(&sale).is_err());
        assert!(SalePaymentRequest::from_record(&note).is_err());
    }

    #[test]
    fn test_envelope_failure() {
        let env: ApiEnvelope<RemoteAck> =
            serde_json::from_str(r#"{"success": false, "error": "Sale is closed"}"#).unwrap();
        match env.into_result() {
            Err(SyncError::RemoteFailure(msg)) => assert_eq!(msg, "Sale is closed"),
            other => panic!("unexpected: {other:?}"),
        }

        let env: ApiEnvelope<RemoteAck> =
            serde_json::from_str(r#"{"data": {"id": "pay-1", "paidAmount": 400}}"#).unwrap();
        let ack = env.into_result().unwrap().unwrap();
        assert_eq!(ack.remote_id.as_deref(), Some("pay-1"));
        assert_eq!(ack.paid_amount(), Some(Money::from_major(400)));
    }

    #[test]
    fn test_remote_sale_conversion() {
        let raw: RemoteSale = serde_json::from_str(
            r#"{"id": "sale-1", "patientId": "p-1", "totalAmount": 1000, "paidAmount": 400,
                "paymentPlan": {"installmentCount": 3}}"#,
        )
        .unwrap();
        let sale = raw.into_sale().unwrap();

        assert_eq!(sale.total_amount, Some(Money::from_major(1000)));
        assert_eq!(sale.paid_amount, Money::from_major(400));
        assert_eq!(sale.status, SaleStatus::Partial);
        assert_eq!(sale.payment_plan.unwrap().installment_count, 3);
    }

    #[test]
    fn test_malformed_sale_is_kept() {
        let raw: RemoteSale =
            serde_json::from_str(r#"{"id": "sale-2", "total_amount": null}"#).unwrap();
        let sale = raw.into_sale().unwrap();

        assert_eq!(sale.total_amount, None);
        assert_eq!(sale.status, SaleStatus::Paid);
    }

    #[test]
    fn test_remote_note_conversion() {
        let raw: RemoteNote = serde_json::from_str(
            r#"{"id": "note-1", "note_number": 2, "totalNotes": 6, "amount": 500,
                "paidAmount": 200, "dueDate": "2026-03-01T00:00:00Z"}"#,
        )
        .unwrap();
        let note = raw.into_note().unwrap();

        assert_eq!(note.note_number, 2);
        assert_eq!(note.total_notes, 6);
        assert_eq!(note.due_date, NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
        assert_eq!(note.status, NoteStatus::Partial);
    }

    #[test]
    fn test_bad_due_date_fails_only_its_row() {
        let envelope: ApiEnvelope<Vec<RemoteNote>> = serde_json::from_str(
            r#"{"success": true, "data": [
                {"id": "note-1", "amount": 500, "dueDate": "2026-03-01"},
                {"id": "note-2", "amount": 500, "dueDate": "soon"},
                {"id": "note-3", "amount": 500, "dueDate": 20260301},
                {"id": "note-4", "amount": 500}
            ]}"#,
        )
        .unwrap();
        let notes = envelope.into_result().unwrap().unwrap_or_default();
        assert_eq!(notes.len(), 4);

        let converted: Vec<_> = notes.into_iter().map(RemoteNote::into_note).collect();
        assert!(converted[0].is_ok());
        for bad in &converted[1..] {
            assert!(matches!(bad, Err(SyncError::InvalidPayload(_))));
        }
    }

    #[test]
    fn test_zero_installment_plan_rejected() {
        let plan = RemotePaymentPlan {
            installment_count: 0,
            installment_amount: None,
        };
        assert!(matches!(plan.into_plan(), Err(SyncError::Rejected(_))));
    }
}
