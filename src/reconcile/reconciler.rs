//! Reconciler - the pending/posted transition engine
//!
//! Transition table, keyed by `code_type`:
//!
//! ```text
//! authApproved              upsert Pending(CARD_AUTHORIZED)
//! holdApproved              upsert Pending(HOLD_SET)
//! authDeclined              upsert Pending(CARD_AUTH_DECLINED), terminal
//! authReversed/holdReleased delete Pending by bank_transaction_id, else no-op
//! debitPosted/creditPosted  promotion lookup; claim Pending (same public id)
//!                           or mint a fresh Posted row
//! ```
//!
//! Promotion lookup order: `bank_transaction_id` first, then
//! (`money_transfer_id`, `account_id`), postable states only. A miss on both
//! means first contact: fresh insert. An existing Posted row for any
//! candidate key means a replayed settlement: ignored.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::money::Money;
use crate::notification::{CodeType, TransactionType, TransferStatus};

use super::key::CorrelationKey;
use super::state::{PendingStatus, PostedStatus};
use super::store::LedgerStore;
use super::types::{PendingTransaction, PostedTransaction, TransactionId, TransactionSubtype};

/// A classified bank event, ready for reconciliation. Everything the
/// resolver and classifier produced, nothing they did not: the reconciler
/// does no I/O beyond the ledger store.
#[derive(Debug, Clone)]
pub struct LedgerEvent {
    /// Bank notification id; the side-effect idempotency key
    pub notification_id: String,
    pub business_id: String,
    pub bank_transaction_id: Option<String>,
    pub money_transfer_id: Option<String>,
    pub account_id: Option<String>,
    pub card_id: Option<String>,
    pub contact_id: Option<String>,
    pub code_type: CodeType,
    pub transaction_type: TransactionType,
    pub amount: Money,
    pub transaction_date: DateTime<Utc>,
    /// A card leg is attached; selects CARD_POSTED over NON_CARD_POSTED
    pub has_card_leg: bool,
    pub subtype: TransactionSubtype,
    pub counterparty: String,
    pub title: String,
    pub description: String,
}

impl LedgerEvent {
    fn correlation_keys(&self) -> Vec<CorrelationKey> {
        CorrelationKey::candidates(
            self.bank_transaction_id.as_deref(),
            self.money_transfer_id.as_deref(),
            self.account_id.as_deref(),
        )
    }

    fn to_pending(&self, status: PendingStatus) -> PendingTransaction {
        PendingTransaction {
            id: TransactionId::new(),
            business_id: self.business_id.clone(),
            bank_transaction_id: self.bank_transaction_id.clone(),
            money_transfer_id: self.money_transfer_id.clone(),
            account_id: self.account_id.clone(),
            card_id: self.card_id.clone(),
            contact_id: self.contact_id.clone(),
            amount: self.amount,
            transaction_type: self.transaction_type.clone(),
            code_type: self.code_type.clone(),
            status,
            counterparty: self.counterparty.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            transaction_date: self.transaction_date,
        }
    }

    fn to_posted(&self, id: TransactionId, status: PostedStatus) -> PostedTransaction {
        PostedTransaction {
            id,
            business_id: self.business_id.clone(),
            bank_transaction_id: self.bank_transaction_id.clone(),
            money_transfer_id: self.money_transfer_id.clone(),
            account_id: self.account_id.clone(),
            card_id: self.card_id.clone(),
            contact_id: self.contact_id.clone(),
            amount: self.amount,
            transaction_type: self.transaction_type.clone(),
            code_type: self.code_type.clone(),
            status,
            subtype: self.subtype,
            counterparty: self.counterparty.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            transaction_date: self.transaction_date,
        }
    }
}

/// What the reconciler decided for one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// A new ledger row was created (Pending or fresh Posted)
    Inserted,
    /// A Pending row became the Posted row, keeping its public id
    Promoted,
    /// A Pending row was removed following a reversal/release
    Deleted,
    /// Nothing changed: replay, unknown code, or release with no match
    Ignored,
}

/// Reconciliation result handed to the Side-Effect Coordinator
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub outcome: ReconcileOutcome,
    /// Pending row as written, when the transition touched the Pending table
    pub pending: Option<PendingTransaction>,
    /// Posted row as written, when the transition settled
    pub posted: Option<PostedTransaction>,
    /// Push notifications must not be sent for this event
    pub suppress_push: bool,
    /// False when this notification id was already processed; the
    /// Coordinator skips all side effects on a replay
    pub first_delivery: bool,
}

/// The ledger state machine. One notification at a time; the store's
/// uniqueness constraints are the cross-worker safety net.
pub struct Reconciler {
    store: Arc<dyn LedgerStore>,
}

fn ignored(first_delivery: bool) -> Reconciliation {
    Reconciliation {
        outcome: ReconcileOutcome::Ignored,
        pending: None,
        posted: None,
        suppress_push: true,
        first_delivery,
    }
}

impl Reconciler {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Apply one classified event to the ledger.
    ///
    /// Store "not found" is an expected branch throughout; only real store
    /// failures propagate (the caller redelivers the notification).
    pub async fn reconcile(&self, event: &LedgerEvent) -> Result<Reconciliation, StoreError> {
        if self.store.already_processed(&event.notification_id).await? {
            debug!(
                notification_id = %event.notification_id,
                "Replayed notification id; ledger untouched"
            );
            return Ok(ignored(false));
        }

        let result = match &event.code_type {
            CodeType::AuthApproved => {
                self.upsert_pending(event, PendingStatus::CardAuthorized).await?
            }
            CodeType::HoldApproved => self.upsert_pending(event, PendingStatus::HoldSet).await?,
            CodeType::AuthDeclined => {
                self.upsert_pending(event, PendingStatus::CardAuthDeclined).await?
            }
            CodeType::AuthReversed | CodeType::HoldReleased => self.release_pending(event).await?,
            CodeType::DebitPosted | CodeType::CreditPosted => self.settle(event).await?,
            CodeType::Other(code) => {
                // Unknown lifecycle code: legal no-op, not an error
                warn!(
                    notification_id = %event.notification_id,
                    code_type = %code,
                    "Unknown code type; ignoring"
                );
                ignored(true)
            }
        };

        // Recorded only after the transition committed: a failed transition
        // leaves the id unrecorded so redelivery retries it.
        self.store.mark_processed(&event.notification_id).await?;
        Ok(result)
    }

    /// Transfer-status events (moneyTransfer / pendingTransfer payloads)
    /// drive the same ledger through status-keyed transitions: in-flight
    /// statuses upsert a Pending row, completion settles, declines release
    /// by the transfer-level key.
    pub async fn apply_transfer_status(
        &self,
        event: &LedgerEvent,
        status: &TransferStatus,
    ) -> Result<Reconciliation, StoreError> {
        if self.store.already_processed(&event.notification_id).await? {
            debug!(
                notification_id = %event.notification_id,
                "Replayed notification id; ledger untouched"
            );
            return Ok(ignored(false));
        }

        let result = match status {
            TransferStatus::Validation => {
                self.upsert_pending(event, PendingStatus::Validation).await?
            }
            TransferStatus::Review => self.upsert_pending(event, PendingStatus::Review).await?,
            TransferStatus::Processing => {
                self.upsert_pending(event, PendingStatus::BankProcessing).await?
            }
            TransferStatus::Completed => self.settle(event).await?,
            TransferStatus::Declined | TransferStatus::Cancelled => {
                let keys = event.correlation_keys();
                self.release_with_keys(event, &keys).await?
            }
            TransferStatus::Other(status) => {
                warn!(
                    notification_id = %event.notification_id,
                    status = %status,
                    "Unknown transfer status; ignoring"
                );
                ignored(true)
            }
        };

        self.store.mark_processed(&event.notification_id).await?;
        Ok(result)
    }

    /// authApproved / holdApproved / authDeclined: one Pending row per
    /// correlation key, updated in place on repeat delivery.
    async fn upsert_pending(
        &self,
        event: &LedgerEvent,
        status: PendingStatus,
    ) -> Result<Reconciliation, StoreError> {
        let mut row = event.to_pending(status);
        let (id, inserted) = self.store.upsert_pending(&row).await?;
        row.id = id;

        if inserted {
            info!(
                transaction_id = %id,
                bank_txn_id = ?event.bank_transaction_id,
                status = %status,
                "Pending row created"
            );
        } else {
            debug!(
                transaction_id = %id,
                status = %status,
                "Pending row updated in place"
            );
        }

        Ok(Reconciliation {
            outcome: if inserted {
                ReconcileOutcome::Inserted
            } else {
                ReconcileOutcome::Ignored
            },
            pending: Some(row),
            posted: None,
            suppress_push: false,
            first_delivery: true,
        })
    }

    /// authReversed / holdReleased: tear the Pending row down. No matching
    /// row means the reversal was already processed; silent no-op.
    async fn release_pending(&self, event: &LedgerEvent) -> Result<Reconciliation, StoreError> {
        // Card reversals correlate by bank transaction id only; the
        // transfer-status path releases by transfer key via
        // `apply_transfer_status`.
        let keys: Vec<CorrelationKey> = event
            .bank_transaction_id
            .as_deref()
            .map(|id| vec![CorrelationKey::BankTransaction(id.to_string())])
            .unwrap_or_default();
        self.release_with_keys(event, &keys).await
    }

    async fn release_with_keys(
        &self,
        event: &LedgerEvent,
        keys: &[CorrelationKey],
    ) -> Result<Reconciliation, StoreError> {
        let Some(pending) = self.store.find_pending(keys, false).await? else {
            debug!(
                bank_txn_id = ?event.bank_transaction_id,
                code_type = %event.code_type,
                "Release with no matching Pending row; treating as already processed"
            );
            return Ok(ignored(true));
        };

        self.store.delete_pending(pending.id).await?;
        info!(
            transaction_id = %pending.id,
            code_type = %event.code_type,
            "Pending row released"
        );

        Ok(Reconciliation {
            outcome: ReconcileOutcome::Deleted,
            pending: Some(pending),
            posted: None,
            // Reversals and releases never page the user
            suppress_push: true,
            first_delivery: true,
        })
    }

    /// debitPosted / creditPosted: promotion lookup, then claim or insert
    async fn settle(&self, event: &LedgerEvent) -> Result<Reconciliation, StoreError> {
        let keys = event.correlation_keys();

        // A Posted row already exists for this transaction: replayed or
        // concurrently settled elsewhere. Never produce a second row.
        if let Some(existing) = self.store.find_posted(&keys).await? {
            debug!(
                transaction_id = %existing.id,
                bank_txn_id = ?event.bank_transaction_id,
                "Settlement already posted; ignoring"
            );
            return Ok(Reconciliation {
                outcome: ReconcileOutcome::Ignored,
                pending: None,
                posted: Some(existing),
                suppress_push: true,
                first_delivery: true,
            });
        }

        let status = if event.has_card_leg {
            PostedStatus::CardPosted
        } else {
            PostedStatus::NonCardPosted
        };

        match self.store.find_pending(&keys, true).await? {
            Some(pending) => {
                // Promotion: the Posted row takes the Pending row's id
                let mut posted = PostedTransaction::from_pending(
                    &pending,
                    status,
                    event.subtype,
                    event.code_type.clone(),
                    event.amount,
                    event.transaction_date,
                );
                // The settled bank transaction id wins over the hold's
                // (fallback correlation can match across different ids)
                if event.bank_transaction_id.is_some() {
                    posted.bank_transaction_id = event.bank_transaction_id.clone();
                }
                self.store.promote(pending.id, &posted).await?;
                info!(
                    transaction_id = %posted.id,
                    bank_txn_id = ?posted.bank_transaction_id,
                    status = %status,
                    "Pending promoted to Posted"
                );

                // A settlement completing an already-notified card auth is
                // the same physical purchase; one push is enough.
                let suppress_push = pending.status == PendingStatus::CardAuthorized;

                Ok(Reconciliation {
                    outcome: ReconcileOutcome::Promoted,
                    pending: Some(pending),
                    posted: Some(posted),
                    suppress_push,
                    first_delivery: true,
                })
            }
            None => {
                // First event for this transaction: fresh Posted row
                let posted = event.to_posted(TransactionId::new(), status);
                self.store.insert_posted(&posted).await?;
                info!(
                    transaction_id = %posted.id,
                    bank_txn_id = ?posted.bank_transaction_id,
                    status = %status,
                    "Posted row inserted directly"
                );

                // Zero-amount account-origination placeholders are ledger
                // furniture, not user activity.
                let suppress_push = event.amount.is_zero()
                    && event.subtype == TransactionSubtype::AccountOrigination;

                Ok(Reconciliation {
                    outcome: ReconcileOutcome::Inserted,
                    pending: None,
                    posted: Some(posted),
                    suppress_push,
                    first_delivery: true,
                })
            }
        }
    }
}
