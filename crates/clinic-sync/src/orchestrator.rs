//! # Reconciliation Orchestrator
//!
//! Keeps the outstanding-items view in agreement with the ledger across a
//! payment action.
//!
//! ## Payment Action State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   AwaitingInput ──pay()──► Submitting                                  │
//! │        ▲                       │                                        │
//! │        │          ┌────────────┼──────────────────┐                     │
//! │        │          ▼            ▼                  ▼                     │
//! │     Failed ◄── rejected   SettledRemote      SettledLocal              │
//! │  (form stays open)             │                  │                     │
//! │                      wait refresh_delay      re-render from             │
//! │                      (skipped if the ack     local store, row           │
//! │                       carries the balance)   marked degraded            │
//! │                      re-fetch sales+notes         │                     │
//! │                      monotonic merge              │                     │
//! │                                │                  │                     │
//! │                                └────────┬─────────┘                     │
//! │                                         ▼                               │
//! │                                ViewingOutstanding                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Monotonic Merge
//! After a remote write, the backend-known paid amount plus the payment
//! becomes a floor for that target. Queued outbox money is not part of it.
//! A re-fetch that reports less (the backend read path lagging its write
//! path) is raised to the floor; once the backend catches up the floor is
//! dropped. The outbox overlay goes on top of either.
//!
//! A payment the backend or the outbox accepted is never reported as
//! failed: if the outbox cannot be read afterwards, the view is rebuilt
//! from the last rendered outbox amounts.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use clinic_core::validation::validate_target_id;
use clinic_core::{remaining, Money, PaymentMethod, PaymentTarget, PromissoryNote, Sale};

use crate::backend::PaymentBackend;
use crate::config::{OutboxSettings, ReconcileSettings};
use crate::error::{SyncError, SyncResult};
use crate::gateway::{PaymentRequest, SubmitOutcome, WriteGateway};
use crate::store::LedgerStore;
use crate::view::{overlay_paid, OutstandingView};

// =============================================================================
// Phase
// =============================================================================

/// Where the current payment action stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    AwaitingInput,
    Submitting,
    SettledRemote,
    SettledLocal,
    Failed,
    ViewingOutstanding,
}

// =============================================================================
// Event Emitter Trait
// =============================================================================

/// Receives orchestrator events (implemented by the presentation adapter).
pub trait ReconcileEventEmitter: Send + Sync {
    fn emit_phase(&self, target: &PaymentTarget, phase: Phase);

    /// A fresh view is ready to render.
    fn emit_view(&self, view: &OutstandingView);

    /// Degraded-mode notice: payment saved locally.
    fn emit_warning(&self, target: &PaymentTarget, message: &str);

    /// Inline form error.
    fn emit_error(&self, target: &PaymentTarget, message: &str);
}

/// No-op event emitter for testing.
pub struct NoOpEmitter;

impl ReconcileEventEmitter for NoOpEmitter {
    fn emit_phase(&self, _target: &PaymentTarget, _phase: Phase) {}
    fn emit_view(&self, _view: &OutstandingView) {}
    fn emit_warning(&self, _target: &PaymentTarget, _message: &str) {}
    fn emit_error(&self, _target: &PaymentTarget, _message: &str) {}
}

// =============================================================================
// Input / Output
// =============================================================================

/// What the payment form collected.
#[derive(Debug, Clone)]
pub struct PaymentForm {
    pub target: PaymentTarget,
    pub amount: Money,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub notes: Option<String>,
}

impl PaymentForm {
    pub fn new(target: PaymentTarget, amount: Money, method: PaymentMethod) -> Self {
        PaymentForm {
            target,
            amount,
            method,
            reference: None,
            notes: None,
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

#[derive(Debug, Clone, Serialize)]
pub struct PaymentOutcome {
    pub submit: SubmitOutcome,
    /// View reopened after the write.
    pub view: OutstandingView,
    /// Whether the view came from a backend re-fetch.
    pub refreshed: bool,
}

impl PaymentOutcome {
    pub fn is_degraded(&self) -> bool {
        self.submit.is_local()
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Backend-known ledger of the loaded patient.
struct LedgerState {
    patient_id: String,
    sales: Vec<Sale>,
    notes: Vec<PromissoryNote>,
    /// Paid amounts confirmed by remote writes, not yet seen on re-fetch.
    floors: BTreeMap<PaymentTarget, Money>,
    view: OutstandingView,
}

impl LedgerState {
    /// Raises rows below their floor; drops floors the backend has reached.
    fn apply_floors(&mut self) {
        let floors = &mut self.floors;

        for sale in &mut self.sales {
            let target = sale.target();
            if let Some(&floor) = floors.get(&target) {
                if sale.paid_amount >= floor {
                    floors.remove(&target);
                } else {
                    debug!(target = %target, fetched = %sale.paid_amount, floor = %floor, "Raising stale read");
                    sale.paid_amount = floor;
                    sale.status = sale.derived_status();
                }
            }
        }

        for note in &mut self.notes {
            let target = note.target();
            if let Some(&floor) = floors.get(&target) {
                if note.paid_amount >= floor {
                    floors.remove(&target);
                } else {
                    debug!(target = %target, fetched = %note.paid_amount, floor = %floor, "Raising stale read");
                    note.paid_amount = floor;
                    note.status = note.derived_status();
                }
            }
        }
    }

    /// Backend-known paid amount and total of a cached row, without any
    /// outbox overlay.
    fn backend_balance(&self, target: &PaymentTarget) -> Option<(Money, Option<Money>)> {
        match target {
            PaymentTarget::Sale(id) => self
                .sales
                .iter()
                .find(|s| &s.id == id)
                .map(|s| (s.paid_amount, s.total_amount)),
            PaymentTarget::PromissoryNote(id) => self
                .notes
                .iter()
                .find(|n| &n.id == id)
                .map(|n| (n.paid_amount, n.amount)),
        }
    }

    fn rebuild(&mut self, pending: &BTreeMap<PaymentTarget, Money>) -> OutstandingView {
        self.view = OutstandingView::build(&self.patient_id, &self.sales, &self.notes, pending, Utc::now());
        self.view.clone()
    }
}

/// Drives load, pay and refresh for one patient at a time.
pub struct ReconciliationOrchestrator {
    gateway: WriteGateway,
    backend: Arc<dyn PaymentBackend>,
    store: Arc<dyn LedgerStore>,
    emitter: Arc<dyn ReconcileEventEmitter>,
    settings: ReconcileSettings,
    /// Outbox entries with this many failed replays drop out of the overlay.
    replay_limit: u32,
    state: RwLock<Option<LedgerState>>,
    phase: RwLock<Phase>,
}

impl ReconciliationOrchestrator {
    pub fn new(
        backend: Arc<dyn PaymentBackend>,
        store: Arc<dyn LedgerStore>,
        settings: ReconcileSettings,
    ) -> Self {
        ReconciliationOrchestrator {
            gateway: WriteGateway::new(backend.clone(), store.clone()),
            backend,
            store,
            emitter: Arc::new(NoOpEmitter),
            settings,
            replay_limit: OutboxSettings::default().max_attempts,
            state: RwLock::new(None),
            phase: RwLock::new(Phase::AwaitingInput),
        }
    }

    pub fn with_emitter(mut self, emitter: Arc<dyn ReconcileEventEmitter>) -> Self {
        self.emitter = emitter;
        self
    }

    /// Matches the overlay to the replayer's `max_attempts`.
    pub fn with_replay_limit(mut self, max_attempts: u32) -> Self {
        self.replay_limit = max_attempts;
        self
    }

    pub fn gateway(&self) -> &WriteGateway {
        &self.gateway
    }

    pub async fn phase(&self) -> Phase {
        *self.phase.read().await
    }

    /// The last rendered view, if a patient is loaded.
    pub async fn view(&self) -> Option<OutstandingView> {
        self.state.read().await.as_ref().map(|s| s.view.clone())
    }

    async fn transition(&self, target: &PaymentTarget, phase: Phase) {
        debug!(target = %target, ?phase, "Payment phase");
        *self.phase.write().await = phase;
        self.emitter.emit_phase(target, phase);
    }

    // =========================================================================
    // Load / Refresh
    // =========================================================================

    /// Fetches sales and notes, plus payment plans for outstanding sales
    /// that arrived without one. Rows that fail validation are skipped.
    async fn fetch_ledger(&self, patient_id: &str) -> SyncResult<(Vec<Sale>, Vec<PromissoryNote>)> {
        let (remote_sales, remote_notes) = tokio::try_join!(
            self.backend.fetch_patient_sales(patient_id),
            self.backend.fetch_patient_notes(patient_id),
        )?;

        let mut sales = Vec::with_capacity(remote_sales.len());
        for raw in remote_sales {
            let id = raw.id.clone();
            match raw.into_sale() {
                Ok(sale) => sales.push(sale),
                Err(e) => warn!(sale_id = %id, error = %e, "Skipping invalid sale"),
            }
        }

        for sale in sales.iter_mut().filter(|s| s.payment_plan.is_none()) {
            if remaining(&*sale).is_zero() {
                continue;
            }
            match self.backend.fetch_payment_plan(&sale.id).await {
                Ok(Some(raw)) => match raw.into_plan() {
                    Ok(plan) => sale.payment_plan = Some(plan),
                    Err(e) => warn!(sale_id = %sale.id, error = %e, "Ignoring invalid payment plan"),
                },
                Ok(None) => {}
                Err(e) => warn!(sale_id = %sale.id, error = %e, "Payment plan fetch failed"),
            }
        }

        let mut notes = Vec::with_capacity(remote_notes.len());
        for raw in remote_notes {
            let id = raw.id.clone();
            match raw.into_note() {
                Ok(note) => notes.push(note),
                Err(e) => warn!(note_id = %id, error = %e, "Skipping invalid promissory note"),
            }
        }

        Ok((sales, notes))
    }

    /// Loads a patient's sales and notes, overlaying unreplayed outbox
    /// payments.
    pub async fn load_patient(&self, patient_id: &str) -> SyncResult<OutstandingView> {
        validate_target_id(patient_id)?;
        info!(patient_id = %patient_id, "Loading patient ledger");

        let (sales, notes) = self.fetch_ledger(patient_id).await?;
        let pending = self.store.pending_totals(self.replay_limit).await?;

        let mut state = LedgerState {
            patient_id: patient_id.to_string(),
            sales,
            notes,
            floors: BTreeMap::new(),
            view: OutstandingView::build(patient_id, &[], &[], &pending, Utc::now()),
        };
        let view = state.rebuild(&pending);
        *self.state.write().await = Some(state);

        *self.phase.write().await = Phase::ViewingOutstanding;
        self.emitter.emit_view(&view);
        Ok(view)
    }

    /// Re-fetches the loaded patient and merges monotonically.
    pub async fn refresh(&self) -> SyncResult<OutstandingView> {
        let patient_id = self
            .state
            .read()
            .await
            .as_ref()
            .map(|s| s.patient_id.clone())
            .ok_or_else(|| SyncError::Internal("no patient loaded".to_string()))?;

        let (sales, notes) = self.fetch_ledger(&patient_id).await?;
        let pending = self.store.pending_totals(self.replay_limit).await?;

        let mut guard = self.state.write().await;
        let state = match guard.as_mut() {
            Some(state) if state.patient_id == patient_id => state,
            _ => return Err(SyncError::Internal("patient changed during refresh".to_string())),
        };
        state.sales = sales;
        state.notes = notes;
        state.apply_floors();
        let view = state.rebuild(&pending);
        drop(guard);

        debug!(patient_id = %patient_id, "Ledger refreshed");
        self.emitter.emit_view(&view);
        Ok(view)
    }

    /// Re-renders from cached backend state and the local outbox, no fetch.
    async fn rerender_local(&self) -> SyncResult<OutstandingView> {
        let pending = self.store.pending_totals(self.replay_limit).await?;

        let mut guard = self.state.write().await;
        let state = guard
            .as_mut()
            .ok_or_else(|| SyncError::Internal("no patient loaded".to_string()))?;
        let view = state.rebuild(&pending);
        drop(guard);

        self.emitter.emit_view(&view);
        Ok(view)
    }

    /// Falls back to the last rendered outbox amounts when the store cannot
    /// be read. `local` is a payment just queued that the old view lacks.
    async fn rerender_after_write(&self, target: &PaymentTarget, local: Option<Money>) -> OutstandingView {
        let err = match self.rerender_local().await {
            Ok(view) => return view,
            Err(e) => e,
        };
        warn!(target = %target, error = %err, "Outbox totals unavailable, rendering from cached view");

        let mut guard = self.state.write().await;
        let view = match guard.as_mut() {
            Some(state) => {
                let mut pending = state.view.pending_totals();
                if let Some(amount) = local {
                    *pending.entry(target.clone()).or_default() += amount;
                }
                state.rebuild(&pending)
            }
            None => OutstandingView::build("", &[], &[], &BTreeMap::new(), Utc::now()),
        };
        drop(guard);

        self.emitter.emit_view(&view);
        view
    }

    /// Records the backend-confirmed paid amount of `target` as a floor and
    /// applies it to the cached rows at once.
    ///
    /// The floor is the cached backend paid amount plus `amount`. Outbox
    /// money in the displayed balance stays out of it; the overlay adds that
    /// back on render.
    async fn raise_floor(&self, target: &PaymentTarget, amount: Money, acknowledged: Option<Money>) {
        let mut guard = self.state.write().await;
        let Some(state) = guard.as_mut() else {
            return;
        };
        let Some((paid, total)) = state.backend_balance(target) else {
            return;
        };

        let settled = overlay_paid(paid, total, amount);
        let confirmed = acknowledged.map_or(settled, |ack| ack.max(settled));
        let floor = state.floors.entry(target.clone()).or_insert(confirmed);
        *floor = (*floor).max(confirmed);
        state.apply_floors();
    }

    // =========================================================================
    // Pay
    // =========================================================================

    /// Runs one payment action from submit to reopened view.
    ///
    /// ## Errors
    /// Validation failures and unrecoverable local-store failures. A remote
    /// failure is not an error: the outcome is flagged degraded instead.
    pub async fn pay(&self, form: PaymentForm) -> SyncResult<PaymentOutcome> {
        let target = form.target.clone();

        let snapshot = self
            .state
            .read()
            .await
            .as_ref()
            .and_then(|s| s.view.snapshot(&target));

        let Some(snapshot) = snapshot else {
            let err = SyncError::UnknownTarget(target.clone());
            self.fail(&target, &err).await;
            return Err(err);
        };

        self.transition(&target, Phase::Submitting).await;

        let request = PaymentRequest {
            snapshot,
            amount: form.amount,
            method: form.method,
            reference: form.reference,
            notes: form.notes,
            date: None,
        };

        let outcome = match self.gateway.submit(request).await {
            Ok(outcome) => outcome,
            Err(err) => {
                self.fail(&target, &err).await;
                return Err(err);
            }
        };

        if let Some(warning) = outcome.warning() {
            self.transition(&target, Phase::SettledLocal).await;
            self.emitter.emit_warning(&target, warning);

            let view = self
                .rerender_after_write(&target, Some(outcome.settlement.amount))
                .await;
            self.transition(&target, Phase::ViewingOutstanding).await;
            return Ok(PaymentOutcome {
                submit: outcome,
                view,
                refreshed: false,
            });
        }

        self.transition(&target, Phase::SettledRemote).await;

        let acknowledged = outcome.acknowledgement().and_then(|ack| ack.paid_amount);
        self.raise_floor(&target, outcome.settlement.amount, acknowledged)
            .await;

        if acknowledged.is_some() && self.settings.skip_delay_when_acknowledged {
            debug!(target = %target, "Acknowledgement carries balance, refreshing now");
        } else {
            tokio::time::sleep(std::time::Duration::from_millis(self.settings.refresh_delay_ms)).await;
        }

        let (view, refreshed) = match self.refresh().await {
            Ok(view) => (view, true),
            Err(e) => {
                warn!(target = %target, error = %e, "Refresh after payment failed, rendering cached ledger");
                (self.rerender_after_write(&target, None).await, false)
            }
        };

        self.transition(&target, Phase::ViewingOutstanding).await;
        Ok(PaymentOutcome {
            submit: outcome,
            view,
            refreshed,
        })
    }

    async fn fail(&self, target: &PaymentTarget, err: &SyncError) {
        self.transition(target, Phase::Failed).await;
        self.emitter.emit_error(target, &err.to_string());
        self.transition(target, Phase::AwaitingInput).await;
    }
}
