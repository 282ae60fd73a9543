mod common;

use common::{account, charge_refunded, checkout_completed, ingestor, sign};
use roids_ledger::application::ledger::Ledger;
use roids_ledger::application::refund::RefundOutcome;
use roids_ledger::application::webhook::Ack;
use roids_ledger::domain::amount::Balance;
use roids_ledger::domain::entry::EntryKind;
use rust_decimal_macros::dec;
use std::sync::Arc;

async fn purchased(ledger: &Ledger) {
    let body = checkout_completed("evt_1", "user_1", 2000, "pi_1");
    ingestor(ledger)
        .ingest(body.as_bytes(), Some(&sign(&body)))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_refund_twice_reverses_once() {
    let ledger = Ledger::in_memory();
    purchased(&ledger).await;

    let first = ledger.refund("pi_1").await.unwrap();
    let second = ledger.refund("pi_1").await.unwrap();

    let (RefundOutcome::Committed(a), RefundOutcome::AlreadyRefunded(b)) = (first, second) else {
        panic!("expected a refund followed by already-refunded");
    };
    assert_eq!(a.entry_id, b.entry_id);
    assert_eq!(a.signed_amount, Balance::new(dec!(-2000)));
    assert_eq!(
        ledger.get_balance(&account("user_1")).await.unwrap(),
        Balance::ZERO
    );
}

#[tokio::test]
async fn test_webhook_and_manual_refund_share_the_anchor() {
    let ledger = Ledger::in_memory();
    purchased(&ledger).await;

    let body = charge_refunded("evt_r1", "pi_1");
    let ack = ingestor(&ledger)
        .ingest(body.as_bytes(), Some(&sign(&body)))
        .await
        .unwrap();
    let Ack::Applied(entry) = ack else {
        panic!("expected the refund to apply");
    };
    assert_eq!(entry.kind, EntryKind::Refund);
    assert_eq!(entry.subject_ref.as_deref(), Some("ch_pi_1"));

    assert!(matches!(
        ledger.refund("pi_1").await.unwrap(),
        RefundOutcome::AlreadyRefunded(_)
    ));
    let replay = ingestor(&ledger)
        .ingest(body.as_bytes(), Some(&sign(&body)))
        .await
        .unwrap();
    assert_eq!(replay.label(), "duplicate");
    assert_eq!(
        ledger.get_balance(&account("user_1")).await.unwrap(),
        Balance::ZERO
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_refunds_commit_once() {
    let ledger = Arc::new(Ledger::in_memory());
    purchased(&ledger).await;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.refund("pi_1").await.unwrap() })
        })
        .collect();

    let mut committed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            RefundOutcome::Committed(_) => committed += 1,
            RefundOutcome::AlreadyRefunded(_) => {}
            RefundOutcome::NotFound => panic!("purchase exists"),
        }
    }
    assert_eq!(committed, 1);
    assert_eq!(
        ledger.full_history(&account("user_1")).await.unwrap().len(),
        2
    );
}

#[tokio::test]
async fn test_refund_of_unknown_purchase_is_not_found() {
    let ledger = Ledger::in_memory();
    assert_eq!(ledger.refund("pi_missing").await.unwrap(), RefundOutcome::NotFound);
}
