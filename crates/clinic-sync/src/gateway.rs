//! # Write Gateway
//!
//! Persists one payment: to the backend when it answers, to the local
//! outbox when it does not.
//!
//! ## Submit Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          WriteGateway::submit                           │
//! │                                                                         │
//! │  PaymentRequest                                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  1. Validate reference/notes, settle_snapshot()  ──► Err(Rejected)     │
//! │       │                                              (nothing written) │
//! │       ▼                                                                 │
//! │  2. Claim target in the in-flight set            ──► Err(InFlight)     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  3. Build PaymentRecord (status from settlement)                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  4. backend.submit(record)                                             │
//! │       │                                                                 │
//! │       ├── Ok(ack) ─────────────────────► Persistence::Remote           │
//! │       │                                                                 │
//! │       └── Err(any) ─► store.append_pending(record.into_fallback())     │
//! │                            │                                            │
//! │                            ├── Ok(seq) ─► Persistence::Local (warning) │
//! │                            └── Err ─────► Err(LocalStoreFailed)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! No inline retry: a failed backend call goes straight to the outbox and
//! the replay worker takes it from there. Either the backend or the outbox
//! holds the record, never both.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use clinic_core::validation::{validate_notes, validate_reference, validate_target_id};
use clinic_core::{
    settle_snapshot, Money, PaymentMethod, PaymentRecord, PaymentTarget, Settlement,
    TargetSnapshot,
};

use crate::backend::{Acknowledgement, PaymentBackend};
use crate::error::{SyncError, SyncResult};
use crate::store::LedgerStore;

// =============================================================================
// Request / Outcome
// =============================================================================

/// One payment action from the form.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    /// Balance of the target as currently displayed.
    pub snapshot: TargetSnapshot,
    pub amount: Money,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub notes: Option<String>,
    /// Defaults to now.
    pub date: Option<DateTime<Utc>>,
}

impl PaymentRequest {
    pub fn new(snapshot: TargetSnapshot, amount: Money, method: PaymentMethod) -> Self {
        PaymentRequest {
            snapshot,
            amount,
            method,
            reference: None,
            notes: None,
            date: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Where the record ended up.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "persisted", rename_all = "snake_case")]
pub enum Persistence {
    Remote { ack: Acknowledgement },
    Local { seq: i64, warning: String },
}

/// Result of a successful submit. A local save is still a success.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitOutcome {
    pub settlement: Settlement,
    pub record: PaymentRecord,
    pub persistence: Persistence,
}

impl SubmitOutcome {
    pub fn is_local(&self) -> bool {
        matches!(self.persistence, Persistence::Local { .. })
    }

    /// The "saved locally" message, for degraded writes.
    pub fn warning(&self) -> Option<&str> {
        match &self.persistence {
            Persistence::Local { warning, .. } => Some(warning),
            Persistence::Remote { .. } => None,
        }
    }

    pub fn acknowledgement(&self) -> Option<&Acknowledgement> {
        match &self.persistence {
            Persistence::Remote { ack } => Some(ack),
            Persistence::Local { .. } => None,
        }
    }
}

// =============================================================================
// In-flight Tracking
// =============================================================================

/// Releases the target when dropped, including on early return.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<PaymentTarget>>,
    target: PaymentTarget,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut set = self.set.lock().unwrap_or_else(|e| e.into_inner());
        set.remove(&self.target);
    }
}

// =============================================================================
// Gateway
// =============================================================================

/// Online-first, outbox-fallback payment writer.
pub struct WriteGateway {
    backend: Arc<dyn PaymentBackend>,
    store: Arc<dyn LedgerStore>,
    in_flight: Mutex<HashSet<PaymentTarget>>,
}

impl WriteGateway {
    pub fn new(backend: Arc<dyn PaymentBackend>, store: Arc<dyn LedgerStore>) -> Self {
        WriteGateway {
            backend,
            store,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Whether a submission for `target` is currently dispatched.
    pub fn is_in_flight(&self, target: &PaymentTarget) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(target)
    }

    fn claim(&self, target: &PaymentTarget) -> SyncResult<InFlightGuard<'_>> {
        let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(target.clone()) {
            return Err(SyncError::SubmissionInFlight(target.clone()));
        }
        Ok(InFlightGuard {
            set: &self.in_flight,
            target: target.clone(),
        })
    }

    /// Validates and persists one payment.
    ///
    /// ## Errors
    /// - `Rejected` for invalid input or overpayment, before any write
    /// - `SubmissionInFlight` if the target already has a write dispatched
    /// - `LocalStoreFailed` if the backend failed and the outbox did too
    pub async fn submit(&self, request: PaymentRequest) -> SyncResult<SubmitOutcome> {
        let target = request.snapshot.target.clone();
        debug!(target = %target, amount = %request.amount, method = %request.method, "Submitting payment");

        validate_target_id(target.id())?;
        let reference = validate_reference(request.reference.as_deref())?;
        let notes = validate_notes(request.notes.as_deref())?;
        let settlement = settle_snapshot(&request.snapshot, request.amount).map_err(|e| {
            debug!(target = %target, error = %e, "Payment rejected");
            SyncError::from(e)
        })?;

        let _guard = self.claim(&target)?;

        let record = PaymentRecord::new(
            target.clone(),
            request.amount,
            request.method,
            settlement.resulting_status,
            request.date.unwrap_or_else(Utc::now),
        )
        .with_reference(reference)
        .with_notes(notes);

        match self.backend.submit(&record).await {
            Ok(ack) => {
                info!(
                    target = %target,
                    record_id = %record.id,
                    remote_id = ?ack.remote_id,
                    status = %settlement.resulting_status.as_str(),
                    "Payment persisted remotely"
                );
                Ok(SubmitOutcome {
                    settlement,
                    record,
                    persistence: Persistence::Remote { ack },
                })
            }
            Err(remote_err) => {
                warn!(
                    target = %target,
                    record_id = %record.id,
                    error = %remote_err,
                    "Backend write failed, saving payment to local outbox"
                );

                let record = record.into_fallback();
                let seq = self.store.append_pending(&record).await.map_err(|e| {
                    error!(target = %target, record_id = %record.id, error = %e, "Local outbox write failed");
                    e
                })?;

                Ok(SubmitOutcome {
                    settlement,
                    record,
                    persistence: Persistence::Local {
                        seq,
                        warning: format!(
                            "Payment saved locally and will be sent when the server is reachable ({remote_err})"
                        ),
                    },
                })
            }
        }
    }
}
