//! Per-type `data` payloads
//!
//! Each routed handler decodes only the shape it expects. `CodeType` is the
//! load-bearing field: it alone selects the legal ledger transition.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::money::Currency;

/// Lifecycle tag on a transaction event, bank-defined
///
/// Matching on this enum is how the reconciler picks a transition; a code
/// the bank adds later lands in `Other` and the transition table treats it
/// as a no-op rather than an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CodeType {
    AuthApproved,
    AuthDeclined,
    AuthReversed,
    HoldApproved,
    HoldReleased,
    DebitPosted,
    CreditPosted,
    Other(String),
}

impl From<String> for CodeType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "authApproved" => CodeType::AuthApproved,
            "authDeclined" => CodeType::AuthDeclined,
            "authReversed" => CodeType::AuthReversed,
            "holdApproved" => CodeType::HoldApproved,
            "holdReleased" => CodeType::HoldReleased,
            "debitPosted" => CodeType::DebitPosted,
            "creditPosted" => CodeType::CreditPosted,
            _ => CodeType::Other(s),
        }
    }
}

impl From<CodeType> for String {
    fn from(c: CodeType) -> String {
        c.as_str().to_string()
    }
}

impl CodeType {
    pub fn as_str(&self) -> &str {
        match self {
            CodeType::AuthApproved => "authApproved",
            CodeType::AuthDeclined => "authDeclined",
            CodeType::AuthReversed => "authReversed",
            CodeType::HoldApproved => "holdApproved",
            CodeType::HoldReleased => "holdReleased",
            CodeType::DebitPosted => "debitPosted",
            CodeType::CreditPosted => "creditPosted",
            CodeType::Other(s) => s,
        }
    }

    /// True for the settlement codes that create Posted rows
    #[inline]
    pub fn is_posted(&self) -> bool {
        matches!(self, CodeType::DebitPosted | CodeType::CreditPosted)
    }

    /// True for the codes that tear a Pending row down without settling
    #[inline]
    pub fn is_release(&self) -> bool {
        matches!(self, CodeType::AuthReversed | CodeType::HoldReleased)
    }
}

impl fmt::Display for CodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Bank-side transaction category, orthogonal to the lifecycle code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TransactionType {
    Purchase,
    Atm,
    Refund,
    VisaCredit,
    Fee,
    Ach,
    Wire,
    Check,
    Interest,
    Other(String),
}

impl From<String> for TransactionType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "purchase" => TransactionType::Purchase,
            "atm" => TransactionType::Atm,
            "refund" => TransactionType::Refund,
            "visaCredit" => TransactionType::VisaCredit,
            "fee" => TransactionType::Fee,
            "ach" => TransactionType::Ach,
            "wire" => TransactionType::Wire,
            "check" => TransactionType::Check,
            "interest" => TransactionType::Interest,
            _ => TransactionType::Other(s),
        }
    }
}

impl From<TransactionType> for String {
    fn from(t: TransactionType) -> String {
        t.as_str().to_string()
    }
}

impl TransactionType {
    pub fn as_str(&self) -> &str {
        match self {
            TransactionType::Purchase => "purchase",
            TransactionType::Atm => "atm",
            TransactionType::Refund => "refund",
            TransactionType::VisaCredit => "visaCredit",
            TransactionType::Fee => "fee",
            TransactionType::Ach => "ach",
            TransactionType::Wire => "wire",
            TransactionType::Check => "check",
            TransactionType::Interest => "interest",
            TransactionType::Other(s) => s,
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Card leg attached to a transaction event, when one exists
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardTransaction {
    #[serde(default)]
    pub card_id: Option<String>,
    /// Point-of-sale entry mode; "POS" distinguishes in-person from online
    #[serde(default)]
    pub entry_mode: Option<String>,
    #[serde(default)]
    pub merchant_name: Option<String>,
    #[serde(default)]
    pub merchant_city: Option<String>,
}

/// Hold leg attached to a transaction event, when one exists
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldTransaction {
    #[serde(default)]
    pub hold_id: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// `data` shape for `type=transaction`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionNotification {
    pub bank_transaction_id: String,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub card_id: Option<String>,
    pub code_type: CodeType,
    pub amount: Decimal,
    pub currency: Currency,
    #[serde(default)]
    pub card_transaction: Option<CardTransaction>,
    #[serde(default)]
    pub hold_transaction: Option<HoldTransaction>,
    #[serde(default)]
    pub bank_money_transfer_id: Option<String>,
    #[serde(default)]
    pub contact_id: Option<String>,
    /// Bank free-text description; counterparty extraction source
    #[serde(default)]
    pub bank_transaction_desc: Option<String>,
    pub transaction_date: DateTime<Utc>,
}

/// Lifecycle status on a money-transfer event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TransferStatus {
    Validation,
    Review,
    Processing,
    Completed,
    Declined,
    Cancelled,
    Other(String),
}

impl From<String> for TransferStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "validation" => TransferStatus::Validation,
            "review" => TransferStatus::Review,
            "processing" => TransferStatus::Processing,
            "completed" => TransferStatus::Completed,
            "declined" => TransferStatus::Declined,
            "cancelled" => TransferStatus::Cancelled,
            _ => TransferStatus::Other(s),
        }
    }
}

impl From<TransferStatus> for String {
    fn from(t: TransferStatus) -> String {
        match t {
            TransferStatus::Validation => "validation".into(),
            TransferStatus::Review => "review".into(),
            TransferStatus::Processing => "processing".into(),
            TransferStatus::Completed => "completed".into(),
            TransferStatus::Declined => "declined".into(),
            TransferStatus::Cancelled => "cancelled".into(),
            TransferStatus::Other(s) => s,
        }
    }
}

/// `data` shape for `type=moneyTransfer`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoneyTransferStatusNotification {
    pub money_transfer_id: String,
    pub status: TransferStatus,
    pub amount: Decimal,
    pub currency: Currency,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub contact_id: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// `data` shape for `type=pendingTransfer`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTransferNotification {
    pub money_transfer_id: String,
    pub account_id: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub status: TransferStatus,
    #[serde(default)]
    pub contact_id: Option<String>,
    #[serde(default)]
    pub estimated_post_date: Option<DateTime<Utc>>,
}

/// `data` shape for consumer/business profile updates (kyc, email, ...)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdateNotification {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}
