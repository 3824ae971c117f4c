//! Ledger Row Types
//!
//! `TransactionId` is the public identifier users see in the app; promotion
//! preserves it when a Pending row becomes Posted. ULID-based, same
//! reasoning as any minted id here: sortable, no coordination needed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::money::Money;
use crate::notification::{CodeType, TransactionType};

use super::state::{PendingStatus, PostedStatus};

/// Public ledger row identifier (ULID)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(ulid::Ulid);

impl TransactionId {
    /// Mint a fresh identifier
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    pub fn inner(&self) -> ulid::Ulid {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TransactionId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(ulid::Ulid::from_string(s)?))
    }
}

/// Finer-grained classification stamped onto Posted rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransactionSubtype {
    CardPurchase,
    CardAtm,
    CardOnline,
    CardRefund,
    VisaCredit,
    Fee,
    InternalTransfer,
    AchTransfer,
    WireDeposit,
    CheckDeposit,
    ShopifyPayout,
    MoneyRequest,
    Interest,
    Reversal,
    AccountOrigination,
}

impl TransactionSubtype {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionSubtype::CardPurchase => "cardPurchase",
            TransactionSubtype::CardAtm => "cardAtm",
            TransactionSubtype::CardOnline => "cardOnline",
            TransactionSubtype::CardRefund => "cardRefund",
            TransactionSubtype::VisaCredit => "visaCredit",
            TransactionSubtype::Fee => "fee",
            TransactionSubtype::InternalTransfer => "internalTransfer",
            TransactionSubtype::AchTransfer => "achTransfer",
            TransactionSubtype::WireDeposit => "wireDeposit",
            TransactionSubtype::CheckDeposit => "checkDeposit",
            TransactionSubtype::ShopifyPayout => "shopifyPayout",
            TransactionSubtype::MoneyRequest => "moneyRequest",
            TransactionSubtype::Interest => "interest",
            TransactionSubtype::Reversal => "reversal",
            TransactionSubtype::AccountOrigination => "accountOrigination",
        }
    }
}

impl fmt::Display for TransactionSubtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Mutable, short-lived ledger row: authorized-but-not-settled
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingTransaction {
    pub id: TransactionId,
    pub business_id: String,
    pub bank_transaction_id: Option<String>,
    pub money_transfer_id: Option<String>,
    pub account_id: Option<String>,
    pub card_id: Option<String>,
    pub contact_id: Option<String>,
    pub amount: Money,
    pub transaction_type: TransactionType,
    pub code_type: CodeType,
    pub status: PendingStatus,
    pub counterparty: String,
    pub title: String,
    pub description: String,
    pub transaction_date: DateTime<Utc>,
}

/// Immutable, terminal ledger row: settled
///
/// Never mutated after insert. On promotion it carries the Pending row's
/// `id` so the user-visible transaction keeps its identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostedTransaction {
    pub id: TransactionId,
    pub business_id: String,
    pub bank_transaction_id: Option<String>,
    pub money_transfer_id: Option<String>,
    pub account_id: Option<String>,
    pub card_id: Option<String>,
    pub contact_id: Option<String>,
    pub amount: Money,
    pub transaction_type: TransactionType,
    pub code_type: CodeType,
    pub status: PostedStatus,
    pub subtype: TransactionSubtype,
    pub counterparty: String,
    pub title: String,
    pub description: String,
    pub transaction_date: DateTime<Utc>,
}

impl PostedTransaction {
    /// Build a Posted row from a promoted Pending row, preserving identity
    /// and correlation fields while taking amount/status/classification
    /// from the settlement event.
    pub fn from_pending(
        pending: &PendingTransaction,
        status: PostedStatus,
        subtype: TransactionSubtype,
        code_type: CodeType,
        amount: Money,
        transaction_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: pending.id,
            business_id: pending.business_id.clone(),
            bank_transaction_id: pending.bank_transaction_id.clone(),
            money_transfer_id: pending.money_transfer_id.clone(),
            account_id: pending.account_id.clone(),
            card_id: pending.card_id.clone(),
            contact_id: pending.contact_id.clone(),
            amount,
            transaction_type: pending.transaction_type.clone(),
            code_type,
            status,
            subtype,
            counterparty: pending.counterparty.clone(),
            title: pending.title.clone(),
            description: pending.description.clone(),
            transaction_date,
        }
    }
}
