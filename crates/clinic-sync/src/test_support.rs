//! In-process fakes shared by the unit tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;

use clinic_core::{Money, PaymentRecord, PaymentTarget};
use clinic_db::DbError;

use crate::backend::{Acknowledgement, PaymentBackend};
use crate::error::{SyncError, SyncResult};
use crate::protocol::{
    NoteCollectionRequest, RemoteNote, RemotePaymentPlan, RemoteSale, SalePaymentRequest,
};
use crate::store::LedgerStore;

pub fn remote_sale(id: &str, total: f64, paid: f64) -> RemoteSale {
    RemoteSale {
        id: id.to_string(),
        patient_id: Some("patient-1".to_string()),
        total_amount: Some(total),
        paid_amount: Some(paid),
        payment_plan: None,
        sale_date: None,
    }
}

pub fn remote_note(id: &str, amount: f64, paid: f64) -> RemoteNote {
    RemoteNote {
        id: id.to_string(),
        patient_id: Some("patient-1".to_string()),
        sale_id: None,
        note_number: Some(1),
        total_notes: Some(1),
        amount: Some(amount),
        paid_amount: Some(paid),
        due_date: NaiveDate::from_ymd_opt(2099, 1, 1),
    }
}

/// Backend double. Accepted writes are applied to the stored rows unless
/// `stale_reads` is set.
#[derive(Default)]
pub struct FakeBackend {
    pub offline: AtomicBool,
    pub reject_writes: AtomicBool,
    pub ack_with_balance: AtomicBool,
    pub stale_reads: AtomicBool,
    pub sales: Mutex<Vec<RemoteSale>>,
    pub notes: Mutex<Vec<RemoteNote>>,
    pub plans: Mutex<HashMap<String, RemotePaymentPlan>>,
    pub writes: Mutex<Vec<String>>,
    pub reads: AtomicUsize,
}

impl FakeBackend {
    pub fn with_rows(sales: Vec<RemoteSale>, notes: Vec<RemoteNote>) -> Self {
        FakeBackend {
            sales: Mutex::new(sales),
            notes: Mutex::new(notes),
            ..FakeBackend::default()
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Idempotency keys of every accepted write, in order.
    pub fn accepted_keys(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    fn check_reachable(&self) -> SyncResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SyncError::ConnectionFailed("connection refused".to_string()));
        }
        Ok(())
    }

    fn accept(&self, key: &str, target: &PaymentTarget, amount: f64) -> SyncResult<Acknowledgement> {
        self.check_reachable()?;
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(SyncError::RemoteFailure("write rejected".to_string()));
        }

        let mut writes = self.writes.lock().unwrap();
        let duplicate = writes.iter().any(|k| k == key);
        if !duplicate {
            writes.push(key.to_string());
        }

        let mut new_paid = None;
        let apply = !duplicate && !self.stale_reads.load(Ordering::SeqCst);
        match target {
            PaymentTarget::Sale(id) => {
                let mut sales = self.sales.lock().unwrap();
                if let Some(sale) = sales.iter_mut().find(|s| &s.id == id) {
                    let paid = sale.paid_amount.unwrap_or(0.0) + amount;
                    if apply {
                        sale.paid_amount = Some(paid);
                    }
                    new_paid = Some(paid);
                }
            }
            PaymentTarget::PromissoryNote(id) => {
                let mut notes = self.notes.lock().unwrap();
                if let Some(note) = notes.iter_mut().find(|n| &n.id == id) {
                    let paid = note.paid_amount.unwrap_or(0.0) + amount;
                    if apply {
                        note.paid_amount = Some(paid);
                    }
                    new_paid = Some(paid);
                }
            }
        }

        Ok(Acknowledgement {
            remote_id: Some(format!("remote-{key}")),
            paid_amount: new_paid
                .filter(|_| self.ack_with_balance.load(Ordering::SeqCst))
                .and_then(Money::from_major_f64),
        })
    }
}

#[async_trait]
impl PaymentBackend for FakeBackend {
    async fn record_sale_payment(&self, request: &SalePaymentRequest) -> SyncResult<Acknowledgement> {
        let target = PaymentTarget::Sale(request.sale_id.clone());
        self.accept(&request.idempotency_key, &target, request.amount)
    }

    async fn collect_note(
        &self,
        note_id: &str,
        request: &NoteCollectionRequest,
    ) -> SyncResult<Acknowledgement> {
        let target = PaymentTarget::PromissoryNote(note_id.to_string());
        self.accept(&request.idempotency_key, &target, request.amount)
    }

    async fn fetch_patient_sales(&self, _patient_id: &str) -> SyncResult<Vec<RemoteSale>> {
        self.check_reachable()?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.sales.lock().unwrap().clone())
    }

    async fn fetch_patient_notes(&self, _patient_id: &str) -> SyncResult<Vec<RemoteNote>> {
        self.check_reachable()?;
        Ok(self.notes.lock().unwrap().clone())
    }

    async fn fetch_payment_plan(&self, sale_id: &str) -> SyncResult<Option<RemotePaymentPlan>> {
        self.check_reachable()?;
        Ok(self.plans.lock().unwrap().get(sale_id).cloned())
    }
}

/// Store double that records appends in memory, failing writes or reads
/// on demand.
#[derive(Default)]
pub struct MemoryStore {
    pub fail_writes: AtomicBool,
    pub fail_reads: AtomicBool,
    pub records: Mutex<Vec<PaymentRecord>>,
}

impl MemoryStore {
    pub fn failing() -> Self {
        MemoryStore {
            fail_writes: AtomicBool::new(true),
            ..MemoryStore::default()
        }
    }

    pub fn records(&self) -> Vec<PaymentRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn append_pending(&self, record: &PaymentRecord) -> SyncResult<i64> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SyncError::LocalStoreFailed(DbError::QueryFailed(
                "disk I/O error".to_string(),
            )));
        }
        let mut records = self.records.lock().unwrap();
        records.push(record.clone());
        Ok(records.len() as i64)
    }

    async fn pending_totals(&self, _max_attempts: u32) -> SyncResult<BTreeMap<PaymentTarget, Money>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(SyncError::LocalStoreFailed(DbError::QueryFailed(
                "database is locked".to_string(),
            )));
        }
        let mut totals = BTreeMap::new();
        for record in self.records.lock().unwrap().iter() {
            *totals.entry(record.target.clone()).or_insert_with(Money::zero) += record.amount;
        }
        Ok(totals)
    }
}
