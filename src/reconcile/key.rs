//! Correlation Key
//!
//! The identifier(s) that match an incoming settlement event to an existing
//! Pending row. Priority is fixed and documented here once:
//!
//! 1. `bank_transaction_id` - most specific, present on card legs and most
//!    bank transactions;
//! 2. (`money_transfer_id`, `account_id`) - transfer-level fallback for
//!    non-card money movement where the settlement event carries a different
//!    bank transaction id than the originating hold.
//!
//! First match wins. A miss on every key means the event is the first one
//! seen for this transaction.

use std::fmt;

/// A single correlation key value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CorrelationKey {
    /// Match by the bank-issued transaction id
    BankTransaction(String),
    /// Match by (money transfer id, account id)
    Transfer {
        money_transfer_id: String,
        account_id: String,
    },
}

impl CorrelationKey {
    /// Build the ordered candidate list for an event's identifiers.
    /// Highest priority first; callers try them in order.
    pub fn candidates(
        bank_transaction_id: Option<&str>,
        money_transfer_id: Option<&str>,
        account_id: Option<&str>,
    ) -> Vec<CorrelationKey> {
        let mut keys = Vec::with_capacity(2);
        if let Some(bank_txn) = bank_transaction_id {
            keys.push(CorrelationKey::BankTransaction(bank_txn.to_string()));
        }
        if let (Some(transfer), Some(account)) = (money_transfer_id, account_id) {
            keys.push(CorrelationKey::Transfer {
                money_transfer_id: transfer.to_string(),
                account_id: account.to_string(),
            });
        }
        keys
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorrelationKey::BankTransaction(id) => write!(f, "bank_txn:{}", id),
            CorrelationKey::Transfer {
                money_transfer_id,
                account_id,
            } => write!(f, "transfer:{}:{}", money_transfer_id, account_id),
        }
    }
}
