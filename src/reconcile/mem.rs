//! In-Memory Ledger Store
//!
//! The non-SQL strategy: used by tests and by deployments that replay the
//! bank feed into a downstream system of record. Single `std::sync::Mutex`
//! around the maps; no await happens while the lock is held.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StoreError;

use super::key::CorrelationKey;
use super::store::LedgerStore;
use super::types::{PendingTransaction, PostedTransaction, TransactionId};

#[derive(Default)]
struct Inner {
    pending: HashMap<TransactionId, PendingTransaction>,
    posted: HashMap<TransactionId, PostedTransaction>,
    seen: HashSet<String>,
}

/// HashMap-backed [`LedgerStore`]
#[derive(Default)]
pub struct MemLedgerStore {
    inner: Mutex<Inner>,
}

impl MemLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test helper: number of Pending rows
    pub fn pending_count(&self) -> usize {
        self.inner.lock().expect("ledger lock").pending.len()
    }

    /// Test helper: number of Posted rows
    pub fn posted_count(&self) -> usize {
        self.inner.lock().expect("ledger lock").posted.len()
    }

    /// Test helper: snapshot of all Posted rows
    pub fn posted_rows(&self) -> Vec<PostedTransaction> {
        self.inner
            .lock()
            .expect("ledger lock")
            .posted
            .values()
            .cloned()
            .collect()
    }

    /// Test helper: snapshot of all Pending rows
    pub fn pending_rows(&self) -> Vec<PendingTransaction> {
        self.inner
            .lock()
            .expect("ledger lock")
            .pending
            .values()
            .cloned()
            .collect()
    }
}

fn pending_matches(row: &PendingTransaction, key: &CorrelationKey) -> bool {
    match key {
        CorrelationKey::BankTransaction(id) => row.bank_transaction_id.as_deref() == Some(id),
        CorrelationKey::Transfer {
            money_transfer_id,
            account_id,
        } => {
            row.money_transfer_id.as_deref() == Some(money_transfer_id)
                && row.account_id.as_deref() == Some(account_id)
        }
    }
}

fn posted_matches(row: &PostedTransaction, key: &CorrelationKey) -> bool {
    match key {
        CorrelationKey::BankTransaction(id) => row.bank_transaction_id.as_deref() == Some(id),
        CorrelationKey::Transfer {
            money_transfer_id,
            account_id,
        } => {
            row.money_transfer_id.as_deref() == Some(money_transfer_id)
                && row.account_id.as_deref() == Some(account_id)
        }
    }
}

#[async_trait]
impl LedgerStore for MemLedgerStore {
    async fn already_processed(&self, notification_id: &str) -> Result<bool, StoreError> {
        let inner = self.inner.lock().expect("ledger lock");
        Ok(inner.seen.contains(notification_id))
    }

    async fn mark_processed(&self, notification_id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("ledger lock");
        inner.seen.insert(notification_id.to_string());
        Ok(())
    }

    async fn find_pending(
        &self,
        keys: &[CorrelationKey],
        postable_only: bool,
    ) -> Result<Option<PendingTransaction>, StoreError> {
        let inner = self.inner.lock().expect("ledger lock");
        for key in keys {
            let hit = inner
                .pending
                .values()
                .find(|row| pending_matches(row, key) && (!postable_only || row.status.is_postable()));
            if let Some(row) = hit {
                return Ok(Some(row.clone()));
            }
        }
        Ok(None)
    }

    async fn find_posted(
        &self,
        keys: &[CorrelationKey],
    ) -> Result<Option<PostedTransaction>, StoreError> {
        let inner = self.inner.lock().expect("ledger lock");
        for key in keys {
            if let Some(row) = inner.posted.values().find(|row| posted_matches(row, key)) {
                return Ok(Some(row.clone()));
            }
        }
        Ok(None)
    }

    async fn upsert_pending(
        &self,
        row: &PendingTransaction,
    ) -> Result<(TransactionId, bool), StoreError> {
        let keys = CorrelationKey::candidates(
            row.bank_transaction_id.as_deref(),
            row.money_transfer_id.as_deref(),
            row.account_id.as_deref(),
        );
        let mut inner = self.inner.lock().expect("ledger lock");
        let existing_id = keys.iter().find_map(|key| {
            inner
                .pending
                .values()
                .find(|r| pending_matches(r, key))
                .map(|r| r.id)
        });

        match existing_id {
            Some(id) => {
                let mut updated = row.clone();
                updated.id = id;
                inner.pending.insert(id, updated);
                Ok((id, false))
            }
            None => {
                inner.pending.insert(row.id, row.clone());
                Ok((row.id, true))
            }
        }
    }

    async fn delete_pending(&self, id: TransactionId) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().expect("ledger lock");
        Ok(inner.pending.remove(&id).is_some())
    }

    async fn insert_posted(&self, row: &PostedTransaction) -> Result<(), StoreError> {
        let keys = CorrelationKey::candidates(
            row.bank_transaction_id.as_deref(),
            row.money_transfer_id.as_deref(),
            row.account_id.as_deref(),
        );
        let mut inner = self.inner.lock().expect("ledger lock");
        for key in &keys {
            if inner.posted.values().any(|r| posted_matches(r, key)) {
                return Err(StoreError::DuplicateRow(key.to_string()));
            }
        }
        inner.posted.insert(row.id, row.clone());
        Ok(())
    }

    async fn promote(
        &self,
        pending_id: TransactionId,
        posted: &PostedTransaction,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("ledger lock");
        inner.posted.insert(posted.id, posted.clone());
        inner.pending.remove(&pending_id);
        Ok(())
    }
}
