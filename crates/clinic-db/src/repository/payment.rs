//! # Payment Record Repository
//!
//! Read access to every PaymentRecord committed locally. Writes happen only
//! through [`OutboxRepository::append`](super::outbox::OutboxRepository::append),
//! which inserts here and into the pending queue in one transaction.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, Sqlite, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::keys;
use clinic_core::{Money, PaymentMethod, PaymentRecord, PaymentTarget, SettlementStatus};

const SELECT_COLUMNS: &str = r#"
    SELECT id, target_kind, target_id, amount_cents, method, status,
           paid_at, reference, notes, pending, source
    FROM payment_records
"#;

// =============================================================================
// Row Mapping
// =============================================================================

#[derive(Debug, FromRow)]
pub(crate) struct PaymentRecordRow {
    id: String,
    target_kind: String,
    target_id: String,
    amount_cents: i64,
    method: PaymentMethod,
    status: SettlementStatus,
    paid_at: DateTime<Utc>,
    reference: Option<String>,
    notes: Option<String>,
    pending: bool,
    source: Option<String>,
}

impl TryFrom<PaymentRecordRow> for PaymentRecord {
    type Error = DbError;

    fn try_from(row: PaymentRecordRow) -> Result<Self, Self::Error> {
        let target = PaymentTarget::from_parts(&row.target_kind, row.target_id)
            .map_err(|e| DbError::corrupt(keys::PAYMENT_RECORDS, e))?;

        Ok(PaymentRecord {
            id: row.id,
            target,
            amount: Money::from_cents(row.amount_cents),
            method: row.method,
            date: row.paid_at,
            status: row.status,
            reference: row.reference,
            notes: row.notes,
            pending: row.pending,
            source: row.source,
        })
    }
}

/// Inserts one record. Runs on whatever executor the caller holds, so the
/// outbox can include it in its transaction.
pub(crate) async fn insert_record<'e, E>(executor: E, record: &PaymentRecord) -> DbResult<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO payment_records (
            id, target_kind, target_id, amount_cents, method, status,
            paid_at, reference, notes, pending, source, created_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6,
            ?7, ?8, ?9, ?10, ?11, ?12
        )
        "#,
    )
    .bind(&record.id)
    .bind(record.target.kind())
    .bind(record.target.id())
    .bind(record.amount.cents())
    .bind(record.method)
    .bind(record.status)
    .bind(record.date)
    .bind(&record.reference)
    .bind(&record.notes)
    .bind(record.pending)
    .bind(&record.source)
    .bind(Utc::now())
    .execute(executor)
    .await?;

    Ok(())
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for locally committed payment records.
#[derive(Debug, Clone)]
pub struct PaymentRecordRepository {
    pool: SqlitePool,
}

impl PaymentRecordRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PaymentRecordRepository { pool }
    }

    /// Gets a record by id.
    pub async fn get(&self, id: &str) -> DbResult<PaymentRecord> {
        let row: Option<PaymentRecordRow> =
            sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE id = ?1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.ok_or_else(|| DbError::not_found("PaymentRecord", id))?
            .try_into()
    }

    /// Lists records for a target, oldest payment first.
    pub async fn list_for_target(&self, target: &PaymentTarget) -> DbResult<Vec<PaymentRecord>> {
        debug!(target = %target, "Listing payment records");

        let rows: Vec<PaymentRecordRow> = sqlx::query_as(&format!(
            "{SELECT_COLUMNS} WHERE target_kind = ?1 AND target_id = ?2 ORDER BY paid_at ASC, rowid ASC"
        ))
        .bind(target.kind())
        .bind(target.id())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PaymentRecord::try_from).collect()
    }

    /// Lists every record in insertion order.
    pub async fn list_all(&self) -> DbResult<Vec<PaymentRecord>> {
        let rows: Vec<PaymentRecordRow> =
            sqlx::query_as(&format!("{SELECT_COLUMNS} ORDER BY rowid ASC"))
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(PaymentRecord::try_from).collect()
    }

    /// Sums the amounts recorded locally against a target.
    pub async fn sum_for_target(&self, target: &PaymentTarget) -> DbResult<Money> {
        let cents: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(amount_cents), 0)
            FROM payment_records
            WHERE target_kind = ?1 AND target_id = ?2
            "#,
        )
        .bind(target.kind())
        .bind(target.id())
        .fetch_one(&self.pool)
        .await?;

        Ok(Money::from_cents(cents))
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM payment_records")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
