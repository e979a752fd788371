//! # clinic-db: Durable Local Store for Clinic Ledger
//!
//! SQLite storage for payments the backend could not confirm, plus the
//! bookkeeping the replay worker needs.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Clinic Ledger Data Flow                            │
//! │                                                                         │
//! │  WriteGateway (backend write failed)                                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     clinic-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ OutboxRepo    │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ PaymentRecord │    │ 001_ledger_  │  │   │
//! │  │   │               │    │   Repo        │    │   outbox.sql │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite file: <data dir>/clinic.db                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use clinic_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("clinic.db")).await?;
//! let seq = db.outbox().append(&record.into_fallback()).await?;
//! for entry in db.outbox().list_pending().await? {
//!     println!("{} {}", entry.seq, entry.record.amount);
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::outbox::{OutboxRepository, PendingPayment, ReplayState};
pub use repository::payment::PaymentRecordRepository;

/// Registered storage keys.
///
/// Every component that reads or writes local payment state goes through
/// these tables; nothing else in the schema holds payments.
pub mod keys {
    /// Every locally committed PaymentRecord.
    pub const PAYMENT_RECORDS: &str = "payment_records";

    /// Append-only queue of records awaiting backend confirmation.
    pub const PENDING_PAYMENTS: &str = "pending_payments";

    /// Replay attempts and confirmations, one row per queued record.
    pub const OUTBOX_REPLAY: &str = "outbox_replay";

    /// All keys, in dependency order.
    pub const ALL: [&str; 3] = [PAYMENT_RECORDS, PENDING_PAYMENTS, OUTBOX_REPLAY];
}
