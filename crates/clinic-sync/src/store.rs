//! # Ledger Store
//!
//! The local side of the write path as a trait. Production uses the SQLite
//! [`Database`]; tests can inject a store that fails on demand.

use std::collections::BTreeMap;

use async_trait::async_trait;

use clinic_core::{Money, PaymentRecord, PaymentTarget};
use clinic_db::Database;

use crate::error::SyncResult;

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Commits a fallback record to the outbox. Returns its queue sequence.
    async fn append_pending(&self, record: &PaymentRecord) -> SyncResult<i64>;

    /// Unreplayed outbox amounts per target, leaving out entries with
    /// `max_attempts` failed replays behind them.
    async fn pending_totals(&self, max_attempts: u32) -> SyncResult<BTreeMap<PaymentTarget, Money>>;
}

#[async_trait]
impl LedgerStore for Database {
    async fn append_pending(&self, record: &PaymentRecord) -> SyncResult<i64> {
        Ok(self.outbox().append(record).await?)
    }

    async fn pending_totals(&self, max_attempts: u32) -> SyncResult<BTreeMap<PaymentTarget, Money>> {
        Ok(self.outbox().pending_totals(max_attempts).await?)
    }
}
