//! End-to-end payment scenarios against a SQLite outbox and an in-memory
//! backend.

mod common;

use std::sync::Arc;

use clinic_core::{CoreError, Money, NoteStatus, PaymentMethod, PaymentTarget, SaleStatus};
use clinic_db::{Database, DbConfig};
use clinic_sync::{
    LedgerStore, OutboxReplayer, OutboxSettings, PaymentBackend, PaymentForm, PaymentRequest,
    ReconcileSettings, ReconciliationOrchestrator, SyncError, WriteGateway,
};

use common::{note, sale, ClinicBackend};

fn no_delay() -> ReconcileSettings {
    ReconcileSettings {
        refresh_delay_ms: 0,
        skip_delay_when_acknowledged: true,
    }
}

async fn memory_db() -> Database {
    Database::new(DbConfig::in_memory()).await.unwrap()
}

#[tokio::test]
async fn sale_settles_in_two_payments_then_rejects_a_third() {
    let db = memory_db().await;
    let backend = Arc::new(ClinicBackend::new(vec![sale("sale-1", 1000.0, 0.0)], vec![]));
    let orch = ReconciliationOrchestrator::new(backend.clone(), Arc::new(db.clone()), no_delay());
    orch.load_patient("patient-1").await.unwrap();

    let target = PaymentTarget::Sale("sale-1".to_string());

    let first = orch
        .pay(PaymentForm::new(target.clone(), Money::from_major(400), PaymentMethod::Cash))
        .await
        .unwrap();
    let row = first.view.sale("sale-1").unwrap();
    assert_eq!(row.remaining, Money::from_major(600));
    assert_eq!(row.sale.status, SaleStatus::Partial);

    let second = orch
        .pay(PaymentForm::new(target.clone(), Money::from_major(600), PaymentMethod::Card))
        .await
        .unwrap();
    let row = second.view.sale("sale-1").unwrap();
    assert_eq!(row.remaining, Money::zero());
    assert_eq!(row.sale.status, SaleStatus::Paid);
    assert_eq!(row.percentage_paid, 100);

    let third = orch
        .pay(PaymentForm::new(target, Money::from_cents(1), PaymentMethod::Cash))
        .await
        .unwrap_err();
    assert!(matches!(third, SyncError::Rejected(CoreError::OverpaymentRejected { .. })));

    // Both payments live on the backend only.
    assert_eq!(backend.accepted(), 2);
    assert_eq!(db.payment_records().count().await.unwrap(), 0);
    assert!(db.outbox().list_pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn note_collected_while_backend_down_is_queued_then_replayed() {
    let db = memory_db().await;
    let backend = Arc::new(ClinicBackend::new(
        vec![],
        vec![note("note-1", 500.0, 200.0, "2099-06-01")],
    ));
    let orch = ReconciliationOrchestrator::new(backend.clone(), Arc::new(db.clone()), no_delay());
    orch.load_patient("patient-1").await.unwrap();

    backend.set_offline(true);
    let target = PaymentTarget::PromissoryNote("note-1".to_string());
    let outcome = orch
        .pay(
            PaymentForm::new(target.clone(), Money::from_major(300), PaymentMethod::BankTransfer)
                .with_reference("SLIP-7"),
        )
        .await
        .unwrap();

    assert!(outcome.is_degraded());
    assert!(outcome.submit.warning().is_some());

    let pending = db.outbox().list_pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].record.amount, Money::from_major(300));
    assert!(pending[0].record.is_fallback());
    assert_eq!(pending[0].record.reference.as_deref(), Some("SLIP-7"));
    assert_eq!(backend.accepted(), 0);

    let row = outcome.view.note("note-1").unwrap();
    assert_eq!(row.note.paid_amount, Money::from_major(500));
    assert_eq!(row.note.status, NoteStatus::Paid);
    assert!(row.degraded);
    assert!(outcome.view.has_degraded_rows());

    // Backend returns: replay once, twice; the second pass sends nothing.
    backend.set_offline(false);
    let (replayer, _handle) =
        OutboxReplayer::new(db.clone(), backend.clone(), OutboxSettings::default());
    assert_eq!(replayer.run_once().await.unwrap().replayed, 1);
    assert_eq!(replayer.run_once().await.unwrap().attempted, 0);
    assert_eq!(backend.accepted(), 1);

    // Reload: the backend now knows the payment and nothing is degraded.
    let view = orch.load_patient("patient-1").await.unwrap();
    let row = view.note("note-1").unwrap();
    assert_eq!(row.note.paid_amount, Money::from_major(500));
    assert!(!row.degraded);

    // The queue stays as an audit log.
    assert_eq!(db.outbox().list_pending().await.unwrap().len(), 1);
}

#[tokio::test]
async fn refused_replays_drop_out_of_the_balance() {
    let db = memory_db().await;
    let backend = Arc::new(ClinicBackend::new(vec![sale("sale-1", 1000.0, 400.0)], vec![]));
    let orch = ReconciliationOrchestrator::new(backend.clone(), Arc::new(db.clone()), no_delay())
        .with_replay_limit(2);
    orch.load_patient("patient-1").await.unwrap();

    backend.set_offline(true);
    let outcome = orch
        .pay(PaymentForm::new(
            PaymentTarget::Sale("sale-1".to_string()),
            Money::from_major(100),
            PaymentMethod::Cash,
        ))
        .await
        .unwrap();
    assert_eq!(outcome.view.sale("sale-1").unwrap().sale.paid_amount, Money::from_major(500));

    // The backend refuses the queued payment on every replay.
    backend.set_offline(false);
    let record_id = outcome.submit.record.id.clone();
    db.outbox().record_failure(&record_id, "Sale is closed").await.unwrap();
    let view = orch.load_patient("patient-1").await.unwrap();
    assert!(view.sale("sale-1").unwrap().degraded);

    db.outbox().record_failure(&record_id, "Sale is closed").await.unwrap();
    let view = orch.load_patient("patient-1").await.unwrap();
    let row = view.sale("sale-1").unwrap();
    assert_eq!(row.sale.paid_amount, Money::from_major(400));
    assert_eq!(row.remaining, Money::from_major(600));
    assert!(!row.degraded);

    // Kept in the log for inspection.
    assert_eq!(db.outbox().count_exhausted(2).await.unwrap(), 1);
}

#[tokio::test]
async fn concurrent_fallback_writes_are_both_kept() {
    let db = memory_db().await;
    let backend = Arc::new(ClinicBackend::default());
    backend.set_offline(true);
    let store: Arc<dyn LedgerStore> = Arc::new(db.clone());
    let backend: Arc<dyn PaymentBackend> = backend;
    let gateway = WriteGateway::new(backend, store);

    let request = |id: &str, major: i64| {
        PaymentRequest::new(
            clinic_core::TargetSnapshot {
                target: PaymentTarget::Sale(id.to_string()),
                total: Some(Money::from_major(1000)),
                paid: Money::zero(),
            },
            Money::from_major(major),
            PaymentMethod::Cash,
        )
    };

    let (a, b) = tokio::join!(
        gateway.submit(request("sale-a", 10)),
        gateway.submit(request("sale-b", 20)),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert!(a.is_local() && b.is_local());

    let pending = db.outbox().list_pending().await.unwrap();
    assert_eq!(pending.len(), 2);
    assert_ne!(pending[0].seq, pending[1].seq);
    assert_eq!(db.payment_records().count().await.unwrap(), 2);
}

#[tokio::test]
async fn outbox_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger").join("clinic.db");

    let record_id = {
        let db = Database::new(DbConfig::new(&path)).await.unwrap();
        let backend = Arc::new(ClinicBackend::default());
        backend.set_offline(true);
        let gateway = WriteGateway::new(backend, Arc::new(db.clone()));

        let outcome = gateway
            .submit(PaymentRequest::new(
                clinic_core::TargetSnapshot {
                    target: PaymentTarget::Sale("sale-1".to_string()),
                    total: Some(Money::from_major(100)),
                    paid: Money::zero(),
                },
                Money::from_major(100),
                PaymentMethod::Check,
            ))
            .await
            .unwrap();
        db.close().await;
        outcome.record.id
    };

    let db = Database::new(DbConfig::new(&path)).await.unwrap();
    let pending = db.outbox().list_unreplayed().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].record.id, record_id);
    assert_eq!(
        db.outbox()
            .pending_totals(10)
            .await
            .unwrap()
            .get(&PaymentTarget::Sale("sale-1".to_string())),
        Some(&Money::from_major(100))
    );
}
