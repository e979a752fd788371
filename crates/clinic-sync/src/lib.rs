//! # clinic-sync: Backend Client and Reconciliation for Clinic Ledger
//!
//! This crate owns everything that talks to the clinic backend: the
//! online-first write path with its local outbox fallback, the
//! reconciliation of the outstanding-items view after a payment, and the
//! worker that replays the outbox once the backend is back.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Clinic Ledger Sync Architecture                     │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │             ReconciliationOrchestrator                           │  │
//! │  │                                                                  │  │
//! │  │  load_patient ─► OutstandingView (pending outbox overlaid)       │  │
//! │  │  pay          ─► Submitting ─► SettledRemote | SettledLocal      │  │
//! │  │  refresh      ─► re-fetch + monotonic merge                      │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │  WriteGateway  │  │ PaymentBackend │  │  LedgerStore           │    │
//! │  │                │  │                │  │                        │    │
//! │  │ settle, submit │  │ HttpBackend    │  │ clinic_db::Database    │    │
//! │  │ or fall back   │  │ (reqwest)      │  │ outbox append/overlay  │    │
//! │  │ to the outbox  │  │                │  │                        │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  OutboxReplayer: background task, drains pending records with   │   │
//! │  │  the record id as idempotency key, exponential backoff          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`backend`] - `PaymentBackend` trait
//! - [`config`] - Ledger configuration (TOML + environment)
//! - [`error`] - Sync error types
//! - [`gateway`] - `WriteGateway`, remote write with outbox fallback
//! - [`http`] - reqwest implementation of `PaymentBackend`
//! - [`orchestrator`] - `ReconciliationOrchestrator`
//! - [`outbox`] - `OutboxReplayer`
//! - [`protocol`] - Backend wire types
//! - [`store`] - `LedgerStore` trait over the local database
//! - [`view`] - Outstanding-items view
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use clinic_sync::{HttpBackend, LedgerConfig, PaymentForm, ReconciliationOrchestrator};
//!
//! let config = LedgerConfig::load_or_default(None);
//! let db = Database::new(DbConfig::new(config.database_path())).await?;
//! let backend = Arc::new(HttpBackend::new(&config.backend)?);
//!
//! let orchestrator =
//!     ReconciliationOrchestrator::new(backend, Arc::new(db), config.reconcile.clone())
//!         .with_replay_limit(config.outbox.max_attempts);
//! orchestrator.load_patient("patient-1").await?;
//!
//! let outcome = orchestrator
//!     .pay(PaymentForm::new(target, Money::from_major(400), PaymentMethod::Cash))
//!     .await?;
//! if let Some(warning) = outcome.submit.warning() {
//!     println!("{warning}");
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod backend;
pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod orchestrator;
pub mod outbox;
pub mod protocol;
pub mod store;
pub mod view;

#[cfg(test)]
mod test_support;

// =============================================================================
// Re-exports
// =============================================================================

pub use backend::{Acknowledgement, PaymentBackend};
pub use config::{BackendSettings, LedgerConfig, OutboxSettings, ReconcileSettings, StoreSettings};
pub use error::{SyncError, SyncResult};
pub use gateway::{PaymentRequest, Persistence, SubmitOutcome, WriteGateway};
pub use http::HttpBackend;
pub use orchestrator::{
    NoOpEmitter, PaymentForm, PaymentOutcome, Phase, ReconcileEventEmitter,
    ReconciliationOrchestrator,
};
pub use outbox::{OutboxReplayer, OutboxReplayerHandle, ReplaySummary};
pub use store::LedgerStore;
pub use view::{NoteRow, OutstandingView, SaleRow};

/// Default log filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,clinic=debug,sqlx=warn";

/// Initializes the tracing subscriber for binaries.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=clinic_sync=trace` - Trace the sync crate only
/// - Default: [`DEFAULT_LOG_FILTER`]
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
