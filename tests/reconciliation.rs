//! End-to-end pipeline scenarios: raw envelope bytes in, ledger rows and
//! side effects out. The memory ledger store and recording side-effect
//! fakes make every assertion observable.

use std::sync::Arc;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::json;

use banksync::classify::extract_counterparty;
use banksync::coordinator::testutil::{RecordingPush, RecordingSink};
use banksync::reconcile::MemLedgerStore;
use banksync::resolve::testutil::{FakeAccountDirectory, FakeTransferDirectory};
use banksync::{
    CorrelationResolver, DispatchOutcome, Dispatcher, ReconcileOutcome, Reconciler,
    SideEffectCoordinator,
};

struct Harness {
    dispatcher: Dispatcher,
    store: Arc<MemLedgerStore>,
    sink: Arc<RecordingSink>,
    push: Arc<RecordingPush>,
}

fn harness() -> Harness {
    let store = Arc::new(MemLedgerStore::new());
    let sink = Arc::new(RecordingSink::default());
    let push = Arc::new(RecordingPush::default());
    let coordinator = Arc::new(SideEffectCoordinator::new(sink.clone(), push.clone()));
    let resolver = CorrelationResolver::new(
        Arc::new(FakeAccountDirectory::default()),
        Arc::new(FakeTransferDirectory::default()),
    );
    let dispatcher = Dispatcher::new(resolver, Reconciler::new(store.clone()), coordinator);
    Harness {
        dispatcher,
        store,
        sink,
        push,
    }
}

/// Build raw envelope bytes the way the bank serializes them
fn envelope(id: &str, kind: &str, action: &str, data: serde_json::Value) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "id": id,
        "entityId": "BZ-100",
        "entityType": "business",
        "bankName": "partnerbank",
        "type": kind,
        "action": action,
        "version": "1.0",
        "created": "2024-03-01T12:00:00Z",
        "data": data,
    }))
    .unwrap()
}

fn card_auth(notification_id: &str, bank_txn: &str, amount: f64) -> Vec<u8> {
    envelope(
        notification_id,
        "transaction",
        "pending",
        json!({
            "bankTransactionId": bank_txn,
            "type": "purchase",
            "accountId": "AC-1",
            "codeType": "authApproved",
            "amount": amount,
            "currency": "usd",
            "cardTransaction": {
                "cardId": "CD-1",
                "entryMode": "POS",
                "merchantName": "Blue Bottle Coffee"
            },
            "transactionDate": "2024-03-01T12:00:00Z"
        }),
    )
}

fn card_settlement(notification_id: &str, bank_txn: &str, amount: f64) -> Vec<u8> {
    envelope(
        notification_id,
        "transaction",
        "posted",
        json!({
            "bankTransactionId": bank_txn,
            "type": "purchase",
            "accountId": "AC-1",
            "codeType": "debitPosted",
            "amount": amount,
            "currency": "usd",
            "cardTransaction": {
                "cardId": "CD-1",
                "entryMode": "POS",
                "merchantName": "Blue Bottle Coffee"
            },
            "transactionDate": "2024-03-01T18:00:00Z"
        }),
    )
}

#[tokio::test]
async fn replayed_auth_touches_ledger_once() {
    let h = harness();

    let first = h.dispatcher.dispatch(&card_auth("NT-1", "CT-1", 4.50)).await.unwrap();
    assert_eq!(first, DispatchOutcome::Reconciled(ReconcileOutcome::Inserted));

    // Same notification id redelivered verbatim
    let replay = h.dispatcher.dispatch(&card_auth("NT-1", "CT-1", 4.50)).await.unwrap();
    assert_eq!(replay, DispatchOutcome::Reconciled(ReconcileOutcome::Ignored));

    assert_eq!(h.store.pending_count(), 1);
    assert_eq!(h.sink.entries.lock().unwrap().len(), 1);
    assert_eq!(h.push.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn settlement_promotes_under_the_same_public_id() {
    let h = harness();

    h.dispatcher.dispatch(&card_auth("NT-1", "CT-2", 12.00)).await.unwrap();
    let pending_id = h.store.pending_rows()[0].id;

    let settled = h
        .dispatcher
        .dispatch(&card_settlement("NT-2", "CT-2", 12.00))
        .await
        .unwrap();
    assert_eq!(settled, DispatchOutcome::Reconciled(ReconcileOutcome::Promoted));

    assert_eq!(h.store.pending_count(), 0);
    let posted = h.store.posted_rows();
    assert_eq!(posted.len(), 1);
    assert_eq!(posted[0].id, pending_id);

    // The auth already paged the user; settlement of the same purchase
    // must not page again.
    assert_eq!(h.push.sent.lock().unwrap().len(), 1);
    // But both ledger mutations appear in the activity stream
    assert_eq!(h.sink.entries.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn reversal_leaves_no_rows_and_no_push() {
    let h = harness();

    h.dispatcher.dispatch(&card_auth("NT-1", "CT-3", 30.00)).await.unwrap();

    let reversal = envelope(
        "NT-2",
        "transaction",
        "update",
        json!({
            "bankTransactionId": "CT-3",
            "type": "purchase",
            "accountId": "AC-1",
            "codeType": "authReversed",
            "amount": 30.00,
            "currency": "usd",
            "transactionDate": "2024-03-01T13:00:00Z"
        }),
    );
    let outcome = h.dispatcher.dispatch(&reversal).await.unwrap();
    assert_eq!(outcome, DispatchOutcome::Reconciled(ReconcileOutcome::Deleted));

    assert_eq!(h.store.pending_count(), 0);
    assert_eq!(h.store.posted_count(), 0);
    // Only the original auth push; the reversal is silent
    assert_eq!(h.push.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn settlement_matches_hold_by_transfer_key() {
    let h = harness();

    // Hold arrives under one bank transaction id, tied to a transfer
    let hold = envelope(
        "NT-1",
        "transaction",
        "pending",
        json!({
            "bankTransactionId": "CT-HOLD",
            "type": "ach",
            "accountId": "AC-1",
            "codeType": "holdApproved",
            "amount": 250.00,
            "currency": "usd",
            "bankMoneyTransferId": "MM-1",
            "transactionDate": "2024-03-01T12:00:00Z"
        }),
    );
    h.dispatcher.dispatch(&hold).await.unwrap();
    let pending_id = h.store.pending_rows()[0].id;

    // Settlement arrives under a different bank transaction id but the
    // same (money_transfer_id, account_id) pair
    let settle = envelope(
        "NT-2",
        "transaction",
        "posted",
        json!({
            "bankTransactionId": "CT-SETTLE",
            "type": "ach",
            "accountId": "AC-1",
            "codeType": "creditPosted",
            "amount": 250.00,
            "currency": "usd",
            "bankMoneyTransferId": "MM-1",
            "transactionDate": "2024-03-02T09:00:00Z"
        }),
    );
    let outcome = h.dispatcher.dispatch(&settle).await.unwrap();
    assert_eq!(outcome, DispatchOutcome::Reconciled(ReconcileOutcome::Promoted));

    let posted = h.store.posted_rows();
    assert_eq!(posted.len(), 1);
    assert_eq!(posted[0].id, pending_id);
    // The settled id wins over the hold's
    assert_eq!(posted[0].bank_transaction_id.as_deref(), Some("CT-SETTLE"));
}

#[tokio::test]
async fn unknown_routes_do_not_break_the_stream() {
    let h = harness();

    let statement = envelope("NT-1", "statement", "generated", json!({"x": 1}));
    assert_eq!(
        h.dispatcher.dispatch(&statement).await.unwrap(),
        DispatchOutcome::Ignored
    );

    // The stream keeps flowing afterwards
    let outcome = h.dispatcher.dispatch(&card_auth("NT-2", "CT-4", 9.99)).await.unwrap();
    assert_eq!(outcome, DispatchOutcome::Reconciled(ReconcileOutcome::Inserted));
    assert_eq!(h.store.pending_count(), 1);
}

#[tokio::test]
async fn inbound_credit_notifies_with_formatted_amount() {
    let h = harness();

    let credit = envelope(
        "NT-1",
        "transaction",
        "posted",
        json!({
            "bankTransactionId": "CT-5",
            "type": "ach",
            "accountId": "AC-1",
            "codeType": "creditPosted",
            "amount": 2.20,
            "currency": "usd",
            "bankMoneyTransferId": "MM-2",
            "bankTransactionDesc": "0480 Transfer From: Wise User      TRN 8891",
            "transactionDate": "2024-03-01T12:00:00Z"
        }),
    );
    h.dispatcher.dispatch(&credit).await.unwrap();

    let pushes = h.push.sent.lock().unwrap();
    assert_eq!(pushes.len(), 1);
    assert!(pushes[0].body.contains("$2.20"), "body: {}", pushes[0].body);
    assert!(
        pushes[0].body.contains("Transfer From: Wise User"),
        "body: {}",
        pushes[0].body
    );
}

#[tokio::test]
async fn zero_amount_origination_row_is_silent() {
    let h = harness();

    let origination = envelope(
        "NT-1",
        "transaction",
        "posted",
        json!({
            "bankTransactionId": "CT-6",
            "type": "ach",
            "accountId": "AC-1",
            "codeType": "creditPosted",
            "amount": 0.0,
            "currency": "usd",
            "bankTransactionDesc": "Account Origination",
            "transactionDate": "2024-03-01T12:00:00Z"
        }),
    );
    let outcome = h.dispatcher.dispatch(&origination).await.unwrap();
    assert_eq!(outcome, DispatchOutcome::Reconciled(ReconcileOutcome::Inserted));

    // The row exists for the ledger; nobody gets paged about it
    assert_eq!(h.store.posted_count(), 1);
    assert!(h.push.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn transfer_status_stream_lands_and_settles() {
    let h = harness();

    let status_event = |id: &str, status: &str| {
        envelope(
            id,
            "moneyTransfer",
            "update",
            json!({
                "moneyTransferId": "MM-3",
                "status": status,
                "amount": 500.00,
                "currency": "usd",
                "accountId": "AC-1"
            }),
        )
    };

    h.dispatcher.dispatch(&status_event("NT-1", "validation")).await.unwrap();
    assert_eq!(h.store.pending_count(), 1);
    let pending_id = h.store.pending_rows()[0].id;

    h.dispatcher.dispatch(&status_event("NT-2", "processing")).await.unwrap();
    assert_eq!(h.store.pending_count(), 1);

    let done = h.dispatcher.dispatch(&status_event("NT-3", "completed")).await.unwrap();
    assert_eq!(done, DispatchOutcome::Reconciled(ReconcileOutcome::Promoted));
    assert_eq!(h.store.pending_count(), 0);
    assert_eq!(h.store.posted_rows()[0].id, pending_id);
}

#[test]
fn counterparty_extraction_survives_arbitrary_names() {
    let mut rng = rand::thread_rng();

    for _ in 0..200 {
        let word = |rng: &mut rand::rngs::ThreadRng| {
            let len = rng.gen_range(3..10);
            (0..len)
                .map(|_| char::from(rng.sample(Alphanumeric)))
                .collect::<String>()
        };
        let name = format!("{} {}", word(&mut rng), word(&mut rng));
        let code = rng.gen_range(1000..10000);
        let reference = rng.gen_range(1..100000);

        let desc = format!("{code} Transfer From: {name}      TRN {reference}");
        assert_eq!(
            extract_counterparty(&desc).as_deref(),
            Some(format!("Transfer From: {name}").as_str()),
            "desc: {desc}"
        );
    }

    // Degenerate inputs never panic
    assert_eq!(extract_counterparty(""), None);
    assert_eq!(extract_counterparty("    "), None);
    assert_eq!(extract_counterparty("1234"), None);
    assert_eq!(extract_counterparty("1234   "), None);
}
