//! # Local Outbox Repository
//!
//! Durable, append-only queue of payments the backend could not confirm.
//!
//! ## Append Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  WriteGateway: backend write failed                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   SINGLE TRANSACTION                            │   │
//! │  │                                                                 │   │
//! │  │  1. INSERT INTO payment_records (... pending = 1, source = ...) │   │
//! │  │  2. INSERT INTO pending_payments (record_id, payload JSON)      │   │
//! │  │     seq = AUTOINCREMENT                                         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT ← both rows or neither                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! SQLite serialises writers, so two concurrent appends both land with
//! distinct sequence numbers. Neither table accepts UPDATE or DELETE.
//!
//! ## Replay Bookkeeping
//! Replay outcomes go to `outbox_replay`, one upserted row per record:
//! attempts, last error, and `replayed_at` once the backend confirms. The
//! queue itself is never touched, so `list_pending` stays a faithful audit
//! log and there is no `remove`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::keys;
use crate::repository::payment::insert_record;
use clinic_core::{Money, PaymentRecord, PaymentTarget};

// =============================================================================
// Types
// =============================================================================

/// Replay bookkeeping for one queued record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplayState {
    pub attempts: i64,
    pub last_error: Option<String>,
    pub attempted_at: Option<DateTime<Utc>>,
    pub replayed_at: Option<DateTime<Utc>>,
    /// Backend id assigned when the replay was accepted.
    pub remote_id: Option<String>,
}

impl ReplayState {
    pub fn is_replayed(&self) -> bool {
        self.replayed_at.is_some()
    }
}

/// One entry of the pending queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingPayment {
    /// Position in the queue (monotonically increasing).
    pub seq: i64,
    pub record: PaymentRecord,
    pub queued_at: DateTime<Utc>,
    pub replay: ReplayState,
}

#[derive(Debug, FromRow)]
struct PendingRow {
    seq: i64,
    payload: String,
    queued_at: DateTime<Utc>,
    attempts: i64,
    last_error: Option<String>,
    attempted_at: Option<DateTime<Utc>>,
    replayed_at: Option<DateTime<Utc>>,
    remote_id: Option<String>,
}

impl TryFrom<PendingRow> for PendingPayment {
    type Error = DbError;

    fn try_from(row: PendingRow) -> Result<Self, Self::Error> {
        let record: PaymentRecord = serde_json::from_str(&row.payload)
            .map_err(|e| DbError::corrupt(keys::PENDING_PAYMENTS, e))?;

        Ok(PendingPayment {
            seq: row.seq,
            record,
            queued_at: row.queued_at,
            replay: ReplayState {
                attempts: row.attempts,
                last_error: row.last_error,
                attempted_at: row.attempted_at,
                replayed_at: row.replayed_at,
                remote_id: row.remote_id,
            },
        })
    }
}

const SELECT_PENDING: &str = r#"
    SELECT p.seq, p.payload, p.queued_at,
           COALESCE(x.attempts, 0) AS attempts,
           x.last_error, x.attempted_at, x.replayed_at, x.remote_id
    FROM pending_payments p
    LEFT JOIN outbox_replay x ON x.record_id = p.record_id
"#;

// =============================================================================
// Repository
// =============================================================================

/// Repository for the local outbox.
#[derive(Debug, Clone)]
pub struct OutboxRepository {
    pool: SqlitePool,
}

impl OutboxRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OutboxRepository { pool }
    }

    /// Appends a fallback record to the payment-record set and the pending
    /// queue atomically.
    ///
    /// ## Returns
    /// The queue sequence number assigned to the record.
    ///
    /// ## Errors
    /// - `InvalidRecord` if the record is not tagged pending
    /// - `UniqueViolation` if the record id was already queued
    pub async fn append(&self, record: &PaymentRecord) -> DbResult<i64> {
        if !record.pending {
            return Err(DbError::InvalidRecord(format!(
                "record {} is not marked pending",
                record.id
            )));
        }

        let payload = serde_json::to_string(record)
            .map_err(|e| DbError::InvalidRecord(e.to_string()))?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        insert_record(&mut *tx, record).await?;

        let result = sqlx::query(
            r#"
            INSERT INTO pending_payments (record_id, payload, queued_at)
            VALUES (?1, ?2, ?3)
            "#,
        )
        .bind(&record.id)
        .bind(&payload)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        let seq = result.last_insert_rowid();
        info!(
            seq,
            record_id = %record.id,
            target = %record.target,
            amount = %record.amount,
            "Payment queued in local outbox"
        );

        Ok(seq)
    }

    /// Lists every queued record in sequence order, replayed or not.
    pub async fn list_pending(&self) -> DbResult<Vec<PendingPayment>> {
        let rows: Vec<PendingRow> = sqlx::query_as(&format!("{SELECT_PENDING} ORDER BY p.seq ASC"))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(PendingPayment::try_from).collect()
    }

    /// Lists records not yet confirmed by the backend, in sequence order.
    pub async fn list_unreplayed(&self) -> DbResult<Vec<PendingPayment>> {
        let rows: Vec<PendingRow> = sqlx::query_as(&format!(
            "{SELECT_PENDING} WHERE x.replayed_at IS NULL ORDER BY p.seq ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PendingPayment::try_from).collect()
    }

    /// Lists up to `limit` unreplayed records with fewer than
    /// `max_attempts` failed attempts, oldest first.
    pub async fn list_replayable(&self, limit: u32, max_attempts: u32) -> DbResult<Vec<PendingPayment>> {
        let rows: Vec<PendingRow> = sqlx::query_as(&format!(
            r#"{SELECT_PENDING}
            WHERE x.replayed_at IS NULL AND COALESCE(x.attempts, 0) < ?1
            ORDER BY p.seq ASC
            LIMIT ?2"#
        ))
        .bind(max_attempts)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PendingPayment::try_from).collect()
    }

    /// Unreplayed amounts grouped by target.
    ///
    /// Used to overlay outbox payments on freshly fetched backend state.
    /// Entries that used up `max_attempts` are left out: the backend keeps
    /// refusing them, so they no longer count toward the balance.
    pub async fn pending_totals(&self, max_attempts: u32) -> DbResult<BTreeMap<PaymentTarget, Money>> {
        let rows: Vec<(String, String, i64)> = sqlx::query_as(
            r#"
            SELECT r.target_kind, r.target_id, SUM(r.amount_cents)
            FROM pending_payments p
            JOIN payment_records r ON r.id = p.record_id
            LEFT JOIN outbox_replay x ON x.record_id = p.record_id
            WHERE x.replayed_at IS NULL
              AND COALESCE(x.attempts, 0) < ?1
            GROUP BY r.target_kind, r.target_id
            "#,
        )
        .bind(max_attempts)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(kind, id, cents)| {
                let target = PaymentTarget::from_parts(&kind, id)
                    .map_err(|e| DbError::corrupt(keys::PAYMENT_RECORDS, e))?;
                Ok((target, Money::from_cents(cents)))
            })
            .collect()
    }

    /// Marks a record as confirmed by the backend.
    pub async fn mark_replayed(&self, record_id: &str, remote_id: Option<&str>) -> DbResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO outbox_replay (record_id, attempts, attempted_at, replayed_at, remote_id)
            VALUES (?1, 1, ?2, ?2, ?3)
            ON CONFLICT (record_id) DO UPDATE SET
                attempts = attempts + 1,
                attempted_at = excluded.attempted_at,
                replayed_at = excluded.replayed_at,
                remote_id = excluded.remote_id
            "#,
        )
        .bind(record_id)
        .bind(now)
        .bind(remote_id)
        .execute(&self.pool)
        .await;

        map_unknown_record(result, record_id)?;
        debug!(record_id = %record_id, "Outbox record replayed");
        Ok(())
    }

    /// Records a failed replay attempt.
    pub async fn record_failure(&self, record_id: &str, error: &str) -> DbResult<i64> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO outbox_replay (record_id, attempts, last_error, attempted_at)
            VALUES (?1, 1, ?2, ?3)
            ON CONFLICT (record_id) DO UPDATE SET
                attempts = attempts + 1,
                last_error = excluded.last_error,
                attempted_at = excluded.attempted_at
            "#,
        )
        .bind(record_id)
        .bind(error)
        .bind(now)
        .execute(&self.pool)
        .await;

        map_unknown_record(result, record_id)?;

        let attempts: i64 =
            sqlx::query_scalar("SELECT attempts FROM outbox_replay WHERE record_id = ?1")
                .bind(record_id)
                .fetch_one(&self.pool)
                .await?;

        warn!(record_id = %record_id, attempts, error = %error, "Outbox replay attempt failed");
        Ok(attempts)
    }

    /// Counts records not yet confirmed by the backend.
    pub async fn count_unreplayed(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM pending_payments p
            LEFT JOIN outbox_replay x ON x.record_id = p.record_id
            WHERE x.replayed_at IS NULL
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Counts unreplayed records that have used up their attempts.
    pub async fn count_exhausted(&self, max_attempts: u32) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM outbox_replay WHERE replayed_at IS NULL AND attempts >= ?1",
        )
        .bind(max_attempts)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

/// A replay row for a record that was never queued fails the foreign key.
fn map_unknown_record(
    result: Result<sqlx::sqlite::SqliteQueryResult, sqlx::Error>,
    record_id: &str,
) -> DbResult<()> {
    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(e)) if e.message().contains("FOREIGN KEY") => {
            Err(DbError::not_found("PendingPayment", record_id))
        }
        Err(e) => Err(e.into()),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use clinic_core::{PaymentMethod, SettlementStatus};

    fn fallback(target: PaymentTarget, major: i64) -> PaymentRecord {
        PaymentRecord::new(
            target,
            Money::from_major(major),
            PaymentMethod::Cash,
            SettlementStatus::Partial,
            Utc::now(),
        )
        .into_fallback()
    }

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_append_writes_both_keys() {
        let db = db().await;
        let note = PaymentTarget::PromissoryNote("note-1".to_string());
        let record = fallback(note.clone(), 300);

        let seq = db.outbox().append(&record).await.unwrap();
        assert!(seq > 0);

        let pending = db.outbox().list_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].record, record);
        assert_eq!(pending[0].replay, ReplayState::default());

        let stored = db.payment_records().get(&record.id).await.unwrap();
        assert!(stored.pending);
        assert_eq!(stored.source.as_deref(), Some("frontend-fallback"));
    }

    #[tokio::test]
    async fn test_append_rejects_non_pending_record() {
        let db = db().await;
        let record = PaymentRecord::new(
            PaymentTarget::Sale("sale-1".to_string()),
            Money::from_major(10),
            PaymentMethod::Card,
            SettlementStatus::Partial,
            Utc::now(),
        );

        let result = db.outbox().append(&record).await;
        assert!(matches!(result, Err(DbError::InvalidRecord(_))));
        assert_eq!(db.payment_records().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_append_leaves_no_partial_write() {
        let db = db().await;
        let record = fallback(PaymentTarget::Sale("sale-1".to_string()), 10);

        db.outbox().append(&record).await.unwrap();
        let again = db.outbox().append(&record).await;
        assert!(matches!(again, Err(DbError::UniqueViolation { .. })));

        assert_eq!(db.outbox().list_pending().await.unwrap().len(), 1);
        assert_eq!(db.payment_records().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_pending_is_ordered_by_sequence() {
        let db = db().await;
        let sale = PaymentTarget::Sale("sale-1".to_string());
        let first = fallback(sale.clone(), 1);
        let second = fallback(sale.clone(), 2);
        let third = fallback(sale, 3);

        for r in [&first, &second, &third] {
            db.outbox().append(r).await.unwrap();
        }

        let pending = db.outbox().list_pending().await.unwrap();
        let ids: Vec<_> = pending.iter().map(|p| p.record.id.clone()).collect();
        assert_eq!(ids, vec![first.id, second.id, third.id]);
        assert!(pending.windows(2).all(|w| w[0].seq < w[1].seq));
    }

    #[tokio::test]
    async fn test_replay_bookkeeping() {
        let db = db().await;
        let outbox = db.outbox();
        let sale = PaymentTarget::Sale("sale-1".to_string());
        let a = fallback(sale.clone(), 100);
        let b = fallback(sale.clone(), 50);
        outbox.append(&a).await.unwrap();
        outbox.append(&b).await.unwrap();

        assert_eq!(outbox.record_failure(&a.id, "connection refused").await.unwrap(), 1);
        assert_eq!(outbox.record_failure(&a.id, "timeout").await.unwrap(), 2);
        outbox.mark_replayed(&b.id, Some("remote-77")).await.unwrap();

        let unreplayed = outbox.list_unreplayed().await.unwrap();
        assert_eq!(unreplayed.len(), 1);
        assert_eq!(unreplayed[0].record.id, a.id);
        assert_eq!(unreplayed[0].replay.attempts, 2);
        assert_eq!(unreplayed[0].replay.last_error.as_deref(), Some("timeout"));

        // Full log still holds both entries.
        let all = outbox.list_pending().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].replay.remote_id.as_deref(), Some("remote-77"));
        assert!(all[1].replay.is_replayed());

        assert_eq!(outbox.count_unreplayed().await.unwrap(), 1);
        assert!(outbox.list_replayable(10, 2).await.unwrap().is_empty());
        assert_eq!(outbox.list_replayable(10, 3).await.unwrap().len(), 1);
        assert_eq!(outbox.count_exhausted(2).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_pending_totals_exclude_replayed() {
        let db = db().await;
        let outbox = db.outbox();
        let sale = PaymentTarget::Sale("sale-1".to_string());
        let note = PaymentTarget::PromissoryNote("note-1".to_string());

        let s1 = fallback(sale.clone(), 100);
        let s2 = fallback(sale.clone(), 40);
        let n1 = fallback(note.clone(), 300);
        for r in [&s1, &s2, &n1] {
            outbox.append(r).await.unwrap();
        }
        outbox.mark_replayed(&s1.id, None).await.unwrap();

        let totals = outbox.pending_totals(10).await.unwrap();
        assert_eq!(totals.get(&sale), Some(&Money::from_major(40)));
        assert_eq!(totals.get(&note), Some(&Money::from_major(300)));
    }

    #[tokio::test]
    async fn test_pending_totals_exclude_exhausted() {
        let db = db().await;
        let outbox = db.outbox();
        let sale = PaymentTarget::Sale("sale-1".to_string());

        let refused = fallback(sale.clone(), 100);
        let queued = fallback(sale.clone(), 40);
        outbox.append(&refused).await.unwrap();
        outbox.append(&queued).await.unwrap();

        outbox.record_failure(&refused.id, "Sale is closed").await.unwrap();
        assert_eq!(
            outbox.pending_totals(2).await.unwrap().get(&sale),
            Some(&Money::from_major(140))
        );

        outbox.record_failure(&refused.id, "Sale is closed").await.unwrap();
        assert_eq!(
            outbox.pending_totals(2).await.unwrap().get(&sale),
            Some(&Money::from_major(40))
        );

        // Still in the log and counted as exhausted.
        assert_eq!(outbox.count_unreplayed().await.unwrap(), 2);
        assert_eq!(outbox.count_exhausted(2).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_replay_state_for_unknown_record() {
        let db = db().await;
        let result = db.outbox().mark_replayed("missing", None).await;
        assert!(matches!(result, Err(DbError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_queue_is_append_only() {
        let db = db().await;
        let record = fallback(PaymentTarget::Sale("sale-1".to_string()), 10);
        db.outbox().append(&record).await.unwrap();

        let delete = sqlx::query("DELETE FROM pending_payments")
            .execute(db.pool())
            .await
            .map_err(DbError::from);
        assert!(matches!(delete, Err(DbError::AppendOnly { .. })));
    }
}
