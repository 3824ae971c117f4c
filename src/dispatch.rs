//! Envelope Dispatcher
//!
//! Top-level entry point for one raw queue message:
//!
//! ```text
//! raw bytes ──▶ parse envelope ──▶ route (kind, action, attribute)
//!                                      │
//!                  ┌───────────────────┼──────────────────────┐
//!                  ▼                   ▼                      ▼
//!           transaction path    transfer paths       account/profile paths
//!        (resolve ▶ classify    (status-keyed         (side effects only)
//!         ▶ reconcile ▶ apply)   reconcile)
//! ```
//!
//! Unknown (kind, action, attribute) combinations are logged and ignored;
//! the bank legitimately sends event kinds this consumer does not care
//! about. A malformed envelope or payload is fatal so the queue redelivers.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::classify::{self, ClassifyInput};
use crate::coordinator::SideEffectCoordinator;
use crate::error::PipelineError;
use crate::money::Money;
use crate::notification::{
    MoneyTransferStatusNotification, NotificationAction, NotificationAttribute,
    NotificationEnvelope, NotificationType, PendingTransferNotification,
    ProfileUpdateNotification, TransactionNotification, TransactionType, TransferStatus,
};
use crate::reconcile::{LedgerEvent, ReconcileOutcome, Reconciler};
use crate::resolve::{CorrelationResolver, Owner, TransferContext};

/// What dispatching one message amounted to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The ledger state machine ran
    Reconciled(ReconcileOutcome),
    /// Side effects only (account block, profile update)
    SideEffects,
    /// Unknown route; deliberately dropped
    Ignored,
}

/// The wired pipeline
pub struct Dispatcher {
    resolver: CorrelationResolver,
    reconciler: Reconciler,
    coordinator: Arc<SideEffectCoordinator>,
}

impl Dispatcher {
    pub fn new(
        resolver: CorrelationResolver,
        reconciler: Reconciler,
        coordinator: Arc<SideEffectCoordinator>,
    ) -> Self {
        Self {
            resolver,
            reconciler,
            coordinator,
        }
    }

    /// Process one raw queue message end to end
    pub async fn dispatch(&self, raw: &[u8]) -> Result<DispatchOutcome, PipelineError> {
        let envelope = NotificationEnvelope::parse(raw)?;
        self.route(&envelope).await
    }

    async fn route(&self, envelope: &NotificationEnvelope) -> Result<DispatchOutcome, PipelineError> {
        use NotificationAction as Action;
        use NotificationAttribute as Attr;
        use NotificationType as Kind;

        match (envelope.kind, &envelope.action, &envelope.attribute) {
            (Kind::Transaction, Action::Posted | Action::Pending | Action::Update, _) => {
                self.handle_transaction(envelope).await
            }
            (Kind::MoneyTransfer, Action::Update | Action::Create, _) => {
                self.handle_money_transfer(envelope).await
            }
            (Kind::PendingTransfer, Action::Create | Action::Update, _) => {
                self.handle_pending_transfer(envelope).await
            }
            (Kind::Account, Action::Add | Action::Remove, Some(Attr::Block)) => {
                self.handle_account_block(envelope).await
            }
            (
                Kind::Consumer | Kind::Business,
                Action::Update,
                Some(Attr::Kyc | Attr::Email | Attr::Phone | Attr::Address),
            ) => self.handle_profile_update(envelope).await,
            _ => {
                warn!(
                    notification_id = %envelope.id,
                    kind = ?envelope.kind,
                    action = ?envelope.action,
                    attribute = ?envelope.attribute,
                    "No route for notification; ignoring"
                );
                Ok(DispatchOutcome::Ignored)
            }
        }
    }

    async fn resolve_owner(
        &self,
        envelope: &NotificationEnvelope,
        account_id: Option<&str>,
    ) -> Result<Owner, PipelineError> {
        Ok(self
            .resolver
            .resolve_owner(&envelope.entity_id, envelope.entity_type, account_id)
            .await?)
    }

    /// type=transaction: the full pipeline
    async fn handle_transaction(
        &self,
        envelope: &NotificationEnvelope,
    ) -> Result<DispatchOutcome, PipelineError> {
        let payload: TransactionNotification = envelope.decode_data("transaction")?;

        let owner = self
            .resolve_owner(envelope, payload.account_id.as_deref())
            .await?;
        let context = self
            .resolver
            .transfer_context(payload.bank_money_transfer_id.as_deref())
            .await?;

        let card = payload.card_transaction.as_ref();
        let has_card_leg = card.is_some() || payload.card_id.is_some();
        let counterparty = classify::resolve_counterparty(
            context.as_ref(),
            payload.bank_transaction_desc.as_deref(),
            card.and_then(|c| c.merchant_name.as_deref()),
        );

        let amount = Money::new(payload.amount, payload.currency);
        let classification = classify::classify(&ClassifyInput {
            transaction_type: &payload.transaction_type,
            code_type: &payload.code_type,
            amount,
            has_card_leg,
            entry_mode: card.and_then(|c| c.entry_mode.as_deref()),
            description: payload.bank_transaction_desc.as_deref(),
            counterparty: &counterparty,
            context: context.as_ref(),
            has_transfer: payload.bank_money_transfer_id.is_some(),
        })?;

        let event = LedgerEvent {
            notification_id: envelope.id.clone(),
            business_id: owner.business_id.clone(),
            bank_transaction_id: Some(payload.bank_transaction_id.clone()),
            money_transfer_id: payload.bank_money_transfer_id.clone(),
            account_id: payload.account_id.clone(),
            card_id: payload
                .card_id
                .clone()
                .or_else(|| card.and_then(|c| c.card_id.clone())),
            contact_id: payload
                .contact_id
                .clone()
                .or_else(|| context.as_ref().and_then(|ctx| ctx.contact.as_ref()).map(|c| c.id.clone())),
            code_type: payload.code_type.clone(),
            transaction_type: payload.transaction_type.clone(),
            amount,
            transaction_date: payload.transaction_date,
            has_card_leg,
            subtype: classification.subtype,
            counterparty: counterparty.clone(),
            title: classification.message.title.clone(),
            description: classification.message.description.clone(),
        };

        let reconciliation = self.reconciler.reconcile(&event).await?;
        // Ledger committed; side effects follow and never roll it back
        self.coordinator
            .apply(
                &owner.business_id,
                &reconciliation,
                &classification.message,
                context.as_ref(),
            )
            .await;

        info!(
            notification_id = %envelope.id,
            bank_txn_id = %payload.bank_transaction_id,
            outcome = ?reconciliation.outcome,
            activity = %classification.activity_type,
            "Transaction notification processed"
        );
        Ok(DispatchOutcome::Reconciled(reconciliation.outcome))
    }

    /// type=moneyTransfer: status-keyed reconciliation for non-card movement
    async fn handle_money_transfer(
        &self,
        envelope: &NotificationEnvelope,
    ) -> Result<DispatchOutcome, PipelineError> {
        let payload: MoneyTransferStatusNotification = envelope.decode_data("moneyTransfer")?;

        let owner = self
            .resolve_owner(envelope, payload.account_id.as_deref())
            .await?;
        let context = self
            .resolver
            .transfer_context(Some(&payload.money_transfer_id))
            .await?;

        self.reconcile_transfer(
            envelope,
            &owner,
            context.as_ref(),
            &payload.money_transfer_id,
            payload.account_id.as_deref(),
            payload.contact_id.as_deref(),
            Money::new(payload.amount, payload.currency),
            &payload.status,
        )
        .await
    }

    /// type=pendingTransfer: an announced inbound transfer; lands as a
    /// Pending row until the settlement event arrives
    async fn handle_pending_transfer(
        &self,
        envelope: &NotificationEnvelope,
    ) -> Result<DispatchOutcome, PipelineError> {
        let payload: PendingTransferNotification = envelope.decode_data("pendingTransfer")?;

        let owner = self.resolve_owner(envelope, Some(&payload.account_id)).await?;
        let context = self
            .resolver
            .transfer_context(Some(&payload.money_transfer_id))
            .await?;

        self.reconcile_transfer(
            envelope,
            &owner,
            context.as_ref(),
            &payload.money_transfer_id,
            Some(&payload.account_id),
            payload.contact_id.as_deref(),
            Money::new(payload.amount, payload.currency),
            &payload.status,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn reconcile_transfer(
        &self,
        envelope: &NotificationEnvelope,
        owner: &Owner,
        context: Option<&TransferContext>,
        money_transfer_id: &str,
        account_id: Option<&str>,
        contact_id: Option<&str>,
        amount: Money,
        status: &TransferStatus,
    ) -> Result<DispatchOutcome, PipelineError> {
        let counterparty = classify::resolve_counterparty(context, None, None);
        let transaction_type = TransactionType::Ach;
        let code_type = crate::notification::CodeType::Other("transferStatus".to_string());

        let classification = classify::classify(&ClassifyInput {
            transaction_type: &transaction_type,
            code_type: &code_type,
            amount,
            has_card_leg: false,
            entry_mode: None,
            description: None,
            counterparty: &counterparty,
            context,
            has_transfer: true,
        })?;

        let event = LedgerEvent {
            notification_id: envelope.id.clone(),
            business_id: owner.business_id.clone(),
            bank_transaction_id: None,
            money_transfer_id: Some(money_transfer_id.to_string()),
            account_id: account_id.map(String::from),
            card_id: None,
            contact_id: contact_id
                .map(String::from)
                .or_else(|| context.and_then(|ctx| ctx.contact.as_ref()).map(|c| c.id.clone())),
            code_type: if *status == TransferStatus::Completed {
                crate::notification::CodeType::CreditPosted
            } else {
                code_type
            },
            transaction_type,
            amount,
            transaction_date: envelope.created,
            has_card_leg: false,
            subtype: classification.subtype,
            counterparty: counterparty.clone(),
            title: classification.message.title.clone(),
            description: classification.message.description.clone(),
        };

        let reconciliation = self.reconciler.apply_transfer_status(&event, status).await?;
        self.coordinator
            .apply(
                &owner.business_id,
                &reconciliation,
                &classification.message,
                context,
            )
            .await;

        info!(
            notification_id = %envelope.id,
            money_transfer_id,
            status = ?status,
            outcome = ?reconciliation.outcome,
            "Transfer notification processed"
        );
        Ok(DispatchOutcome::Reconciled(reconciliation.outcome))
    }

    /// Replay guard for the routes with no ledger mutation of their own.
    /// Returns `true` when the envelope id was already processed.
    async fn replayed(&self, envelope: &NotificationEnvelope) -> Result<bool, PipelineError> {
        let replayed = self
            .reconciler
            .store()
            .already_processed(&envelope.id)
            .await?;
        if replayed {
            debug!(notification_id = %envelope.id, "Replayed notification; side effects skipped");
        }
        Ok(replayed)
    }

    async fn mark_handled(&self, envelope: &NotificationEnvelope) -> Result<(), PipelineError> {
        Ok(self.reconciler.store().mark_processed(&envelope.id).await?)
    }

    /// type=account, attribute=block: announce, no ledger mutation
    async fn handle_account_block(
        &self,
        envelope: &NotificationEnvelope,
    ) -> Result<DispatchOutcome, PipelineError> {
        if self.replayed(envelope).await? {
            return Ok(DispatchOutcome::Ignored);
        }
        let owner = self.resolve_owner(envelope, None).await?;
        let blocked = envelope.action == NotificationAction::Add;
        self.coordinator
            .announce_account_block(&owner.business_id, blocked)
            .await;
        self.mark_handled(envelope).await?;
        info!(
            notification_id = %envelope.id,
            business_id = %owner.business_id,
            blocked,
            "Account block notification processed"
        );
        Ok(DispatchOutcome::SideEffects)
    }

    /// type=consumer|business, action=update: profile changes. KYC status
    /// changes propagate to the compliance system; the rest are the
    /// directory's problem and only logged here.
    async fn handle_profile_update(
        &self,
        envelope: &NotificationEnvelope,
    ) -> Result<DispatchOutcome, PipelineError> {
        let payload: ProfileUpdateNotification = envelope.decode_data("profileUpdate")?;

        if self.replayed(envelope).await? {
            return Ok(DispatchOutcome::Ignored);
        }

        if envelope.attribute == Some(NotificationAttribute::Kyc) {
            if let Some(status) = &payload.status {
                let category = match envelope.kind {
                    NotificationType::Business => "business",
                    _ => "consumer",
                };
                self.coordinator
                    .propagate_kyc(&envelope.entity_id, category, status)
                    .await;
            }
        } else {
            info!(
                notification_id = %envelope.id,
                attribute = ?envelope.attribute,
                "Profile update acknowledged"
            );
        }
        self.mark_handled(envelope).await?;
        Ok(DispatchOutcome::SideEffects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::testutil::{RecordingPush, RecordingQueue, RecordingSink};
    use crate::reconcile::MemLedgerStore;
    use crate::resolve::testutil::{FakeAccountDirectory, FakeTransferDirectory};

    fn dispatcher() -> (Dispatcher, Arc<MemLedgerStore>, Arc<RecordingSink>, Arc<RecordingPush>)
    {
        let store = Arc::new(MemLedgerStore::new());
        let sink = Arc::new(RecordingSink::default());
        let push = Arc::new(RecordingPush::default());
        let coordinator = Arc::new(SideEffectCoordinator::new(sink.clone(), push.clone()));
        let resolver = CorrelationResolver::new(
            Arc::new(FakeAccountDirectory::default()),
            Arc::new(FakeTransferDirectory::default()),
        );
        let dispatcher = Dispatcher::new(resolver, Reconciler::new(store.clone()), coordinator);
        (dispatcher, store, sink, push)
    }

    fn envelope(id: &str, kind: &str, action: &str, data: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "id": id,
            "entityId": "BZ-1",
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

    #[tokio::test]
    async fn test_unknown_route_is_silent() {
        let (dispatcher, store, sink, push) = dispatcher();
        let raw = envelope("NT-1", "consumer", "bogus", serde_json::json!({}));
        let outcome = dispatcher.dispatch(&raw).await.unwrap();

        assert_eq!(outcome, DispatchOutcome::Ignored);
        assert_eq!(store.pending_count() + store.posted_count(), 0);
        assert!(sink.entries.lock().unwrap().is_empty());
        assert!(push.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_payload_is_fatal() {
        let (dispatcher, _, _, _) = dispatcher();
        let raw = envelope(
            "NT-2",
            "transaction",
            "posted",
            serde_json::json!({"bankTransactionId": 42}),
        );
        let err = dispatcher.dispatch(&raw).await.unwrap_err();
        assert_eq!(err.code(), "MALFORMED_PAYLOAD");
    }

    #[tokio::test]
    async fn test_transaction_posted_end_to_end() {
        let (dispatcher, store, sink, push) = dispatcher();
        let raw = envelope(
            "NT-3",
            "transaction",
            "posted",
            serde_json::json!({
                "bankTransactionId": "CT-1",
                "type": "ach",
                "accountId": "AC-1",
                "codeType": "creditPosted",
                "amount": 2.20,
                "currency": "usd",
                "bankMoneyTransferId": "MM-1",
                "bankTransactionDesc": "0480 Transfer From: Wise User      TRN 1",
                "transactionDate": "2024-03-01T12:00:00Z"
            }),
        );
        let outcome = dispatcher.dispatch(&raw).await.unwrap();

        assert_eq!(outcome, DispatchOutcome::Reconciled(ReconcileOutcome::Inserted));
        assert_eq!(store.posted_count(), 1);
        assert_eq!(sink.entries.lock().unwrap().len(), 1);
        let pushes = push.sent.lock().unwrap();
        assert_eq!(pushes.len(), 1);
        assert!(pushes[0].body.contains("$2.20"));
        assert!(pushes[0].body.contains("Transfer From: Wise User"));
    }

    #[tokio::test]
    async fn test_account_block_route() {
        let (dispatcher, store, sink, push) = dispatcher();
        let mut raw: serde_json::Value =
            serde_json::from_slice(&envelope("NT-4", "account", "add", serde_json::json!({})))
                .unwrap();
        raw["attribute"] = "block".into();
        let outcome = dispatcher
            .dispatch(&serde_json::to_vec(&raw).unwrap())
            .await
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::SideEffects);
        assert_eq!(store.pending_count() + store.posted_count(), 0);
        assert_eq!(sink.entries.lock().unwrap().len(), 1);
        assert_eq!(push.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_replayed_account_block_announces_once() {
        let (dispatcher, _, sink, push) = dispatcher();
        let mut raw: serde_json::Value =
            serde_json::from_slice(&envelope("NT-10", "account", "add", serde_json::json!({})))
                .unwrap();
        raw["attribute"] = "block".into();
        let bytes = serde_json::to_vec(&raw).unwrap();

        assert_eq!(
            dispatcher.dispatch(&bytes).await.unwrap(),
            DispatchOutcome::SideEffects
        );
        // Same envelope redelivered
        assert_eq!(
            dispatcher.dispatch(&bytes).await.unwrap(),
            DispatchOutcome::Ignored
        );
        assert_eq!(sink.entries.lock().unwrap().len(), 1);
        assert_eq!(push.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_kyc_update_publishes_to_compliance() {
        let store = Arc::new(MemLedgerStore::new());
        let sink = Arc::new(RecordingSink::default());
        let push = Arc::new(RecordingPush::default());
        let queue = Arc::new(RecordingQueue::default());
        let coordinator = Arc::new(
            SideEffectCoordinator::new(sink, push).with_compliance_queue(queue.clone()),
        );
        let resolver = CorrelationResolver::new(
            Arc::new(FakeAccountDirectory::default()),
            Arc::new(FakeTransferDirectory::default()),
        );
        let dispatcher = Dispatcher::new(resolver, Reconciler::new(store), coordinator);

        let mut raw: serde_json::Value = serde_json::from_slice(&envelope(
            "NT-5",
            "business",
            "update",
            serde_json::json!({"status": "approved"}),
        ))
        .unwrap();
        raw["attribute"] = "kyc".into();
        dispatcher
            .dispatch(&serde_json::to_vec(&raw).unwrap())
            .await
            .unwrap();

        let published = queue.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0.category, "business");
        assert_eq!(published[0].0.status, "approved");
    }

    #[tokio::test]
    async fn test_replayed_kyc_update_publishes_once() {
        let store = Arc::new(MemLedgerStore::new());
        let queue = Arc::new(RecordingQueue::default());
        let coordinator = Arc::new(
            SideEffectCoordinator::new(
                Arc::new(RecordingSink::default()),
                Arc::new(RecordingPush::default()),
            )
            .with_compliance_queue(queue.clone()),
        );
        let resolver = CorrelationResolver::new(
            Arc::new(FakeAccountDirectory::default()),
            Arc::new(FakeTransferDirectory::default()),
        );
        let dispatcher = Dispatcher::new(resolver, Reconciler::new(store), coordinator);

        let mut raw: serde_json::Value = serde_json::from_slice(&envelope(
            "NT-11",
            "business",
            "update",
            serde_json::json!({"status": "approved"}),
        ))
        .unwrap();
        raw["attribute"] = "kyc".into();
        let bytes = serde_json::to_vec(&raw).unwrap();

        assert_eq!(
            dispatcher.dispatch(&bytes).await.unwrap(),
            DispatchOutcome::SideEffects
        );
        assert_eq!(
            dispatcher.dispatch(&bytes).await.unwrap(),
            DispatchOutcome::Ignored
        );
        assert_eq!(queue.published.lock().unwrap().len(), 1);
    }
}
