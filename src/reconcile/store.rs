//! Ledger Store Capability
//!
//! The reconciler talks to the ledger through this trait; storage strategy
//! (in-memory vs PostgreSQL) is picked at wiring time from config, never
//! read ad hoc inside business logic.
//!
//! Contract notes:
//! - Lookups return `Option`; a miss is an expected branch of the state
//!   machine, never an error.
//! - `promote` must be atomic per implementation: the Posted insert and the
//!   Pending delete either both land or neither does.
//! - Posted uniqueness (per `bank_transaction_id` and per
//!   (`money_transfer_id`, `account_id`)) is enforced by the store; a
//!   violation surfaces as [`StoreError::DuplicateRow`].

use async_trait::async_trait;

use crate::error::StoreError;

use super::key::CorrelationKey;
use super::types::{PendingTransaction, PostedTransaction, TransactionId};

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Whether this notification id already ran to completion. Checked
    /// before the transition; a replay leaves the ledger untouched and
    /// skips Coordinator side effects.
    async fn already_processed(&self, notification_id: &str) -> Result<bool, StoreError>;

    /// Record a notification id, after its ledger mutation committed. A
    /// failed mutation must leave the id unrecorded so redelivery retries
    /// the transition instead of treating it as a replay.
    async fn mark_processed(&self, notification_id: &str) -> Result<(), StoreError>;

    /// Find a Pending row by the first matching key, in candidate order.
    /// With `postable_only` set, rows in non-promotable states are skipped.
    async fn find_pending(
        &self,
        keys: &[CorrelationKey],
        postable_only: bool,
    ) -> Result<Option<PendingTransaction>, StoreError>;

    /// Find a Posted row by the first matching key, in candidate order
    async fn find_posted(
        &self,
        keys: &[CorrelationKey],
    ) -> Result<Option<PostedTransaction>, StoreError>;

    /// Insert the row, or update the existing row sharing a correlation key
    /// (preserving its id). Returns the surviving id and whether a new row
    /// was created.
    async fn upsert_pending(
        &self,
        row: &PendingTransaction,
    ) -> Result<(TransactionId, bool), StoreError>;

    /// Delete a Pending row. Returns whether a row existed.
    async fn delete_pending(&self, id: TransactionId) -> Result<bool, StoreError>;

    /// Insert a fresh Posted row (no Pending row to claim)
    async fn insert_posted(&self, row: &PostedTransaction) -> Result<(), StoreError>;

    /// Promotion commit: insert the Posted row and delete the Pending row it
    /// was built from, atomically.
    async fn promote(
        &self,
        pending_id: TransactionId,
        posted: &PostedTransaction,
    ) -> Result<(), StoreError>;
}
