//! # Repository Module
//!
//! Repository implementations over the registered storage keys.
//!
//! ## Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  WriteGateway / OutboxReplayer / outbox binary                         │
//! │       │                                                                 │
//! │       │  db.outbox().append(&record)                                   │
//! │       ▼                                                                 │
//! │  OutboxRepository ────────────┐                                        │
//! │  ├── append        (1 tx) ────┼──► payment_records + pending_payments  │
//! │  ├── list_pending             │                                        │
//! │  ├── list_replayable          │                                        │
//! │  ├── mark_replayed ───────────┼──► outbox_replay                       │
//! │  └── record_failure ──────────┘                                        │
//! │                                                                         │
//! │  PaymentRecordRepository (read-only)                                   │
//! │  ├── get / list_for_target / list_all                                  │
//! │  └── sum_for_target                                                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rows are read with runtime-checked `query_as` into `FromRow` structs and
//! converted to domain types at the repository boundary.

pub mod outbox;
pub mod payment;
