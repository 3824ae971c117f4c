//! Side-Effect Coordinator
//!
//! Consumes the reconciler's output and fans it out: one activity-stream
//! entry, at most one push notification, receipts for money-request-funded
//! transfers, an optional upsert into the external transaction service, and
//! the KYC compliance side channel.
//!
//! Ordering contract: the ledger mutation has already committed by the time
//! `apply` runs. Nothing in here retries and nothing unwinds the ledger:
//! every failure is logged and swallowed. The store is the source of truth;
//! the side channels are best effort.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::classify::ActivityMessage;
use crate::money::Money;
use crate::reconcile::{
    PendingTransaction, PostedTransaction, ReconcileOutcome, Reconciliation, TransactionId,
};
use crate::resolve::TransferContext;

/// Namespace for deriving external-transaction-service keys from
/// `bank_transaction_id` (UUID v5, stable across redeliveries)
pub const TXN_SERVICE_NAMESPACE: Uuid = Uuid::from_bytes([
    0x8a, 0x1f, 0x2b, 0x77, 0x4c, 0x09, 0x45, 0xd2, 0x9e, 0x61, 0x0b, 0x3d, 0x5e, 0x24, 0x7a,
    0x90,
]);

/// Delay on compliance queue messages, giving the upstream record time to
/// land before the compliance system re-reads it
pub const COMPLIANCE_DELIVERY_DELAY: Duration = Duration::from_secs(30);

/// Append-only activity stream entry
#[derive(Debug, Clone, Serialize)]
pub struct ActivityEntry {
    pub business_id: String,
    pub transaction_id: Option<TransactionId>,
    pub activity_type: String,
    pub counterparty: String,
    pub title: String,
    pub description: String,
    pub amount: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Push notification payload
#[derive(Debug, Clone, Serialize)]
pub struct PushMessage {
    pub business_id: String,
    pub header: String,
    pub body: String,
}

/// Outbound compliance queue message (KYC status propagation)
#[derive(Debug, Clone, Serialize)]
pub struct ComplianceMessage {
    pub entity_id: String,
    /// "consumer" or "business"
    pub category: String,
    pub action: String,
    pub status: String,
}

#[async_trait]
pub trait ActivitySink: Send + Sync {
    async fn append(&self, entry: &ActivityEntry) -> anyhow::Result<()>;
}

#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(&self, push: &PushMessage) -> anyhow::Result<()>;
}

#[async_trait]
pub trait ReceiptSender: Send + Sync {
    /// Generate a receipt for a settled money request and email both parties
    async fn send(&self, request_id: &str, posted: &PostedTransaction) -> anyhow::Result<()>;

    /// Mark the request complete once the receipt went out
    async fn mark_complete(&self, request_id: &str) -> anyhow::Result<()>;
}

/// External transaction microservice; upserts are idempotent by key
#[async_trait]
pub trait TransactionService: Send + Sync {
    async fn upsert_pending(&self, key: Uuid, row: &PendingTransaction) -> anyhow::Result<()>;
    async fn upsert_posted(&self, key: Uuid, row: &PostedTransaction) -> anyhow::Result<()>;
}

/// Fire-and-forget queue publisher for the compliance side channel
#[async_trait]
pub trait QueuePublisher: Send + Sync {
    async fn publish(&self, message: &ComplianceMessage, delay: Duration) -> anyhow::Result<()>;
}

/// The coordinator proper. All collaborators optional except the activity
/// sink and push sender; a deployment without the external transaction
/// service simply skips those upserts.
pub struct SideEffectCoordinator {
    activity: Arc<dyn ActivitySink>,
    push: Arc<dyn PushSender>,
    receipts: Option<Arc<dyn ReceiptSender>>,
    transactions: Option<Arc<dyn TransactionService>>,
    compliance: Option<Arc<dyn QueuePublisher>>,
}

impl SideEffectCoordinator {
    pub fn new(activity: Arc<dyn ActivitySink>, push: Arc<dyn PushSender>) -> Self {
        Self {
            activity,
            push,
            receipts: None,
            transactions: None,
            compliance: None,
        }
    }

    pub fn with_receipts(mut self, receipts: Arc<dyn ReceiptSender>) -> Self {
        self.receipts = Some(receipts);
        self
    }

    pub fn with_transaction_service(mut self, service: Arc<dyn TransactionService>) -> Self {
        self.transactions = Some(service);
        self
    }

    pub fn with_compliance_queue(mut self, queue: Arc<dyn QueuePublisher>) -> Self {
        self.compliance = Some(queue);
        self
    }

    /// Derive the external-service key for a bank transaction id
    pub fn txn_service_key(bank_transaction_id: &str) -> Uuid {
        Uuid::new_v5(&TXN_SERVICE_NAMESPACE, bank_transaction_id.as_bytes())
    }

    /// Fan out the side effects for one reconciled notification.
    /// Never returns an error: the ledger mutation stands regardless.
    pub async fn apply(
        &self,
        business_id: &str,
        reconciliation: &Reconciliation,
        message: &ActivityMessage,
        context: Option<&TransferContext>,
    ) {
        if !reconciliation.first_delivery {
            debug!(business_id, "Replayed notification; skipping side effects");
            return;
        }
        if reconciliation.outcome == ReconcileOutcome::Ignored {
            debug!(business_id, "No ledger mutation; skipping side effects");
            return;
        }

        let (transaction_id, amount, occurred_at) = match (&reconciliation.posted, &reconciliation.pending)
        {
            (Some(posted), _) => (Some(posted.id), posted.amount, posted.transaction_date),
            (None, Some(pending)) => (Some(pending.id), pending.amount, pending.transaction_date),
            (None, None) => (None, Money::default(), Utc::now()),
        };

        let entry = ActivityEntry {
            business_id: business_id.to_string(),
            transaction_id,
            activity_type: message.activity_type.to_string(),
            counterparty: message.counterparty.clone(),
            title: message.title.clone(),
            description: message.description.clone(),
            amount,
            occurred_at,
        };
        if let Err(e) = self.activity.append(&entry).await {
            warn!(business_id, error = %e, "Activity write failed; continuing");
        }

        if !reconciliation.suppress_push {
            let push = PushMessage {
                business_id: business_id.to_string(),
                header: message.notification_header.clone(),
                body: message.notification_body.clone(),
            };
            if let Err(e) = self.push.send(&push).await {
                warn!(business_id, error = %e, "Push send failed; continuing");
            }
        }

        self.settle_money_request(reconciliation, context).await;
        self.upsert_external(reconciliation).await;
    }

    /// Money-request-funded transfer settled: receipt both parties and mark
    /// the request complete.
    async fn settle_money_request(
        &self,
        reconciliation: &Reconciliation,
        context: Option<&TransferContext>,
    ) {
        let Some(receipts) = &self.receipts else {
            return;
        };
        let Some(request) = context.and_then(|ctx| ctx.request.as_ref()) else {
            return;
        };
        let Some(posted) = &reconciliation.posted else {
            return;
        };

        if let Err(e) = receipts.send(&request.id, posted).await {
            warn!(request_id = %request.id, error = %e, "Receipt send failed; continuing");
            return;
        }
        if let Err(e) = receipts.mark_complete(&request.id).await {
            warn!(request_id = %request.id, error = %e, "Request completion failed; continuing");
        } else {
            info!(request_id = %request.id, "Money request completed");
        }
    }

    async fn upsert_external(&self, reconciliation: &Reconciliation) {
        let Some(service) = &self.transactions else {
            return;
        };

        if let Some(posted) = &reconciliation.posted {
            if let Some(bank_txn) = &posted.bank_transaction_id {
                let key = Self::txn_service_key(bank_txn);
                if let Err(e) = service.upsert_posted(key, posted).await {
                    warn!(bank_txn_id = %bank_txn, error = %e, "External upsert failed; continuing");
                }
            }
        } else if let Some(pending) = &reconciliation.pending {
            if let Some(bank_txn) = &pending.bank_transaction_id {
                let key = Self::txn_service_key(bank_txn);
                if let Err(e) = service.upsert_pending(key, pending).await {
                    warn!(bank_txn_id = %bank_txn, error = %e, "External upsert failed; continuing");
                }
            }
        }
    }

    /// Propagate a KYC status change to the compliance system
    /// (fire-and-forget, fixed delivery delay).
    pub async fn propagate_kyc(&self, entity_id: &str, category: &str, status: &str) {
        let Some(queue) = &self.compliance else {
            debug!(entity_id, "No compliance queue wired; KYC change not propagated");
            return;
        };
        let message = ComplianceMessage {
            entity_id: entity_id.to_string(),
            category: category.to_string(),
            action: "update".to_string(),
            status: status.to_string(),
        };
        if let Err(e) = queue.publish(&message, COMPLIANCE_DELIVERY_DELAY).await {
            warn!(entity_id, error = %e, "Compliance publish failed; continuing");
        }
    }

    /// Account block/unblock announcement: activity entry + push
    pub async fn announce_account_block(&self, business_id: &str, blocked: bool) {
        let title = if blocked {
            "Account blocked"
        } else {
            "Account unblocked"
        };
        let entry = ActivityEntry {
            business_id: business_id.to_string(),
            transaction_id: None,
            activity_type: "account_block".to_string(),
            counterparty: String::new(),
            title: title.to_string(),
            description: title.to_string(),
            amount: Money::default(),
            occurred_at: Utc::now(),
        };
        if let Err(e) = self.activity.append(&entry).await {
            warn!(business_id, error = %e, "Activity write failed; continuing");
        }
        let push = PushMessage {
            business_id: business_id.to_string(),
            header: title.to_string(),
            body: title.to_string(),
        };
        if let Err(e) = self.push.send(&push).await {
            warn!(business_id, error = %e, "Push send failed; continuing");
        }
    }
}

pub mod testutil {
    //! Recording fakes for the collaborator traits

    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct RecordingSink {
        pub entries: Mutex<Vec<ActivityEntry>>,
    }

    #[async_trait]
    impl ActivitySink for RecordingSink {
        async fn append(&self, entry: &ActivityEntry) -> anyhow::Result<()> {
            self.entries.lock().expect("sink lock").push(entry.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct RecordingPush {
        pub sent: Mutex<Vec<PushMessage>>,
        pub fail: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl PushSender for RecordingPush {
        async fn send(&self, push: &PushMessage) -> anyhow::Result<()> {
            if self.fail.load(std::sync::atomic::Ordering::Relaxed) {
                anyhow::bail!("push transport down");
            }
            self.sent.lock().expect("push lock").push(push.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct RecordingReceipts {
        pub sent: Mutex<Vec<String>>,
        pub completed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ReceiptSender for RecordingReceipts {
        async fn send(&self, request_id: &str, _posted: &PostedTransaction) -> anyhow::Result<()> {
            self.sent
                .lock()
                .expect("receipt lock")
                .push(request_id.to_string());
            Ok(())
        }

        async fn mark_complete(&self, request_id: &str) -> anyhow::Result<()> {
            self.completed
                .lock()
                .expect("receipt lock")
                .push(request_id.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct RecordingTxnService {
        pub upserts: Mutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl TransactionService for RecordingTxnService {
        async fn upsert_pending(&self, key: Uuid, _row: &PendingTransaction) -> anyhow::Result<()> {
            self.upserts.lock().expect("txn lock").push(key);
            Ok(())
        }

        async fn upsert_posted(&self, key: Uuid, _row: &PostedTransaction) -> anyhow::Result<()> {
            self.upserts.lock().expect("txn lock").push(key);
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct RecordingQueue {
        pub published: Mutex<Vec<(ComplianceMessage, Duration)>>,
    }

    #[async_trait]
    impl QueuePublisher for RecordingQueue {
        async fn publish(
            &self,
            message: &ComplianceMessage,
            delay: Duration,
        ) -> anyhow::Result<()> {
            self.published
                .lock()
                .expect("queue lock")
                .push((message.clone(), delay));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::*;
    use super::*;
    use crate::classify::ActivityType;
    use crate::notification::{CodeType, TransactionType};
    use crate::reconcile::{PostedStatus, TransactionSubtype};
    use rust_decimal::Decimal;

    fn posted(bank_txn: &str) -> PostedTransaction {
        PostedTransaction {
            id: TransactionId::new(),
            business_id: "BZ-1".into(),
            bank_transaction_id: Some(bank_txn.into()),
            money_transfer_id: None,
            account_id: Some("AC-1".into()),
            card_id: None,
            contact_id: None,
            amount: Money::usd(Decimal::new(220, 2)),
            transaction_type: TransactionType::Ach,
            code_type: CodeType::CreditPosted,
            status: PostedStatus::NonCardPosted,
            subtype: TransactionSubtype::AchTransfer,
            counterparty: "Acme".into(),
            title: "ACH transfer".into(),
            description: "ACH transfer: Acme $2.20".into(),
            transaction_date: Utc::now(),
        }
    }

    fn message() -> ActivityMessage {
        ActivityMessage {
            activity_type: ActivityType::AchTransfer,
            counterparty: "Acme".into(),
            title: "ACH transfer".into(),
            description: "ACH transfer: Acme $2.20".into(),
            notification_header: "ACH transfer".into(),
            notification_body: "ACH transfer: Acme $2.20".into(),
        }
    }

    fn reconciliation(posted_row: PostedTransaction) -> Reconciliation {
        Reconciliation {
            outcome: ReconcileOutcome::Inserted,
            pending: None,
            posted: Some(posted_row),
            suppress_push: false,
            first_delivery: true,
        }
    }

    #[tokio::test]
    async fn test_activity_and_push_on_insert() {
        let sink = Arc::new(RecordingSink::default());
        let push = Arc::new(RecordingPush::default());
        let coordinator = SideEffectCoordinator::new(sink.clone(), push.clone());

        coordinator
            .apply("BZ-1", &reconciliation(posted("CT-1")), &message(), None)
            .await;

        assert_eq!(sink.entries.lock().unwrap().len(), 1);
        let pushes = push.sent.lock().unwrap();
        assert_eq!(pushes.len(), 1);
        assert!(pushes[0].body.contains("$2.20"));
    }

    #[tokio::test]
    async fn test_suppressed_push_still_writes_activity() {
        let sink = Arc::new(RecordingSink::default());
        let push = Arc::new(RecordingPush::default());
        let coordinator = SideEffectCoordinator::new(sink.clone(), push.clone());

        let mut rec = reconciliation(posted("CT-2"));
        rec.suppress_push = true;
        coordinator.apply("BZ-1", &rec, &message(), None).await;

        assert_eq!(sink.entries.lock().unwrap().len(), 1);
        assert!(push.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replay_skips_all_side_effects() {
        let sink = Arc::new(RecordingSink::default());
        let push = Arc::new(RecordingPush::default());
        let coordinator = SideEffectCoordinator::new(sink.clone(), push.clone());

        let mut rec = reconciliation(posted("CT-3"));
        rec.first_delivery = false;
        coordinator.apply("BZ-1", &rec, &message(), None).await;

        assert!(sink.entries.lock().unwrap().is_empty());
        assert!(push.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_push_failure_is_swallowed() {
        let sink = Arc::new(RecordingSink::default());
        let push = Arc::new(RecordingPush::default());
        push.fail.store(true, std::sync::atomic::Ordering::Relaxed);
        let coordinator = SideEffectCoordinator::new(sink.clone(), push.clone());

        // Must not panic or error; activity already written
        coordinator
            .apply("BZ-1", &reconciliation(posted("CT-4")), &message(), None)
            .await;
        assert_eq!(sink.entries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_money_request_receipt_and_completion() {
        use crate::resolve::{Contact, PaymentMethod, PaymentRequest};

        let sink = Arc::new(RecordingSink::default());
        let push = Arc::new(RecordingPush::default());
        let receipts = Arc::new(RecordingReceipts::default());
        let coordinator =
            SideEffectCoordinator::new(sink, push).with_receipts(receipts.clone());

        let ctx = TransferContext {
            money_transfer_id: "MM-1".into(),
            contact: Some(Contact {
                id: "CN-1".into(),
                name: "Ada".into(),
            }),
            request: Some(PaymentRequest {
                id: "RQ-9".into(),
                method: PaymentMethod::BankOnline,
            }),
            monthly_interest: false,
        };
        coordinator
            .apply("BZ-1", &reconciliation(posted("CT-5")), &message(), Some(&ctx))
            .await;

        assert_eq!(receipts.sent.lock().unwrap().as_slice(), ["RQ-9"]);
        assert_eq!(receipts.completed.lock().unwrap().as_slice(), ["RQ-9"]);
    }

    #[tokio::test]
    async fn test_external_upsert_key_is_stable() {
        let key1 = SideEffectCoordinator::txn_service_key("CT-77");
        let key2 = SideEffectCoordinator::txn_service_key("CT-77");
        let key3 = SideEffectCoordinator::txn_service_key("CT-78");
        assert_eq!(key1, key2);
        assert_ne!(key1, key3);
    }

    #[tokio::test]
    async fn test_kyc_propagation_carries_fixed_delay() {
        let sink = Arc::new(RecordingSink::default());
        let push = Arc::new(RecordingPush::default());
        let queue = Arc::new(RecordingQueue::default());
        let coordinator =
            SideEffectCoordinator::new(sink, push).with_compliance_queue(queue.clone());

        coordinator.propagate_kyc("EN-1", "business", "approved").await;

        let published = queue.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0.status, "approved");
        assert_eq!(published[0].0.action, "update");
        assert_eq!(published[0].1, COMPLIANCE_DELIVERY_DELAY);
    }
}
