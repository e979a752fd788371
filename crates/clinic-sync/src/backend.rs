//! # Payment Backend
//!
//! The remote side of the ledger as a trait, so the gateway, orchestrator
//! and replay worker all take it as an injected handle.
//! [`HttpBackend`](crate::http::HttpBackend) is the production
//! implementation; tests use in-process fakes.

use async_trait::async_trait;
use serde::Serialize;

use clinic_core::{Money, PaymentRecord, PaymentTarget};

use crate::error::SyncResult;
use crate::protocol::{
    NoteCollectionRequest, RemoteAck, RemoteNote, RemotePaymentPlan, RemoteSale,
    SalePaymentRequest,
};

/// Confirmation of a payment the backend accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Acknowledgement {
    pub remote_id: Option<String>,

    /// Target's paid amount after the write, if the backend reported it.
    /// Lets the orchestrator skip the blind refresh delay.
    pub paid_amount: Option<Money>,
}

impl From<RemoteAck> for Acknowledgement {
    fn from(ack: RemoteAck) -> Self {
        Acknowledgement {
            paid_amount: ack.paid_amount(),
            remote_id: ack.remote_id,
        }
    }
}

/// Clinic backend operations used by the reconciliation core.
#[async_trait]
pub trait PaymentBackend: Send + Sync {
    /// `POST payment-records`
    async fn record_sale_payment(&self, request: &SalePaymentRequest) -> SyncResult<Acknowledgement>;

    /// `POST promissory-notes/{id}/collect`
    async fn collect_note(
        &self,
        note_id: &str,
        request: &NoteCollectionRequest,
    ) -> SyncResult<Acknowledgement>;

    /// `GET patients/{id}/sales`
    async fn fetch_patient_sales(&self, patient_id: &str) -> SyncResult<Vec<RemoteSale>>;

    /// `GET patients/{id}/promissory-notes`
    async fn fetch_patient_notes(&self, patient_id: &str) -> SyncResult<Vec<RemoteNote>>;

    /// `GET sales/{id}/payment-plan`. `None` when the sale has no plan.
    async fn fetch_payment_plan(&self, sale_id: &str) -> SyncResult<Option<RemotePaymentPlan>>;

    /// Sends a record to the endpoint matching its target.
    async fn submit(&self, record: &PaymentRecord) -> SyncResult<Acknowledgement> {
        match &record.target {
            PaymentTarget::Sale(_) => {
                let request = SalePaymentRequest::from_record(record)?;
                self.record_sale_payment(&request).await
            }
            PaymentTarget::PromissoryNote(note_id) => {
                let request = NoteCollectionRequest::from_record(record)?;
                self.collect_note(note_id, &request).await
            }
        }
    }
}
