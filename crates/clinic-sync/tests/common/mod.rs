//! Backend double for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use clinic_sync::protocol::{
    NoteCollectionRequest, RemoteNote, RemotePaymentPlan, RemoteSale, SalePaymentRequest,
};
use clinic_sync::{Acknowledgement, PaymentBackend, SyncError, SyncResult};

/// In-memory backend that applies accepted writes to its rows and drops
/// repeated idempotency keys.
#[derive(Default)]
pub struct ClinicBackend {
    offline: AtomicBool,
    sales: Mutex<Vec<RemoteSale>>,
    notes: Mutex<Vec<RemoteNote>>,
    keys: Mutex<Vec<String>>,
}

impl ClinicBackend {
    pub fn new(sales: Vec<RemoteSale>, notes: Vec<RemoteNote>) -> Self {
        ClinicBackend {
            sales: Mutex::new(sales),
            notes: Mutex::new(notes),
            ..ClinicBackend::default()
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn accepted(&self) -> usize {
        self.keys.lock().unwrap().len()
    }

    fn reachable(&self) -> SyncResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(SyncError::ConnectionFailed("connection refused".to_string()))
        } else {
            Ok(())
        }
    }

    fn first_time(&self, key: &str) -> bool {
        let mut keys = self.keys.lock().unwrap();
        if keys.iter().any(|k| k == key) {
            return false;
        }
        keys.push(key.to_string());
        true
    }
}

pub fn sale(id: &str, total: f64, paid: f64) -> RemoteSale {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "patientId": "patient-1",
        "totalAmount": total,
        "paidAmount": paid,
    }))
    .unwrap()
}

pub fn note(id: &str, amount: f64, paid: f64, due: &str) -> RemoteNote {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "patientId": "patient-1",
        "noteNumber": 1,
        "totalNotes": 2,
        "amount": amount,
        "paidAmount": paid,
        "dueDate": due,
    }))
    .unwrap()
}

#[async_trait]
impl PaymentBackend for ClinicBackend {
    async fn record_sale_payment(&self, request: &SalePaymentRequest) -> SyncResult<Acknowledgement> {
        self.reachable()?;
        if self.first_time(&request.idempotency_key) {
            let mut sales = self.sales.lock().unwrap();
            if let Some(sale) = sales.iter_mut().find(|s| s.id == request.sale_id) {
                sale.paid_amount = Some(sale.paid_amount.unwrap_or(0.0) + request.amount);
            }
        }
        Ok(Acknowledgement {
            remote_id: Some(format!("pay-{}", request.idempotency_key)),
            paid_amount: None,
        })
    }

    async fn collect_note(
        &self,
        note_id: &str,
        request: &NoteCollectionRequest,
    ) -> SyncResult<Acknowledgement> {
        self.reachable()?;
        if self.first_time(&request.idempotency_key) {
            let mut notes = self.notes.lock().unwrap();
            if let Some(note) = notes.iter_mut().find(|n| n.id == note_id) {
                note.paid_amount = Some(note.paid_amount.unwrap_or(0.0) + request.amount);
            }
        }
        Ok(Acknowledgement::default())
    }

    async fn fetch_patient_sales(&self, _patient_id: &str) -> SyncResult<Vec<RemoteSale>> {
        self.reachable()?;
        Ok(self.sales.lock().unwrap().clone())
    }

    async fn fetch_patient_notes(&self, _patient_id: &str) -> SyncResult<Vec<RemoteNote>> {
        self.reachable()?;
        Ok(self.notes.lock().unwrap().clone())
    }

    async fn fetch_payment_plan(&self, _sale_id: &str) -> SyncResult<Option<RemotePaymentPlan>> {
        self.reachable()?;
        Ok(None)
    }
}
