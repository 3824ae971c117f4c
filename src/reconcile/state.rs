//! Ledger Row Status Definitions
//!
//! Status IDs are designed for SQL storage as SMALLINT. Pending statuses are
//! positive, Posted statuses live in the 100 range so the two tables can
//! never be confused during a migration.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a mutable Pending row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i16)]
pub enum PendingStatus {
    /// Card authorization accepted; settlement expected
    CardAuthorized = 1,
    /// Funds hold placed (non-card)
    HoldSet = 2,
    /// Money transfer in bank-side validation
    Validation = 3,
    /// Money transfer held for manual review
    Review = 4,
    /// Money transfer accepted, bank processing
    BankProcessing = 5,
    /// Card authorization declined; terminal, never promoted
    CardAuthDeclined = 6,
}

impl PendingStatus {
    /// True if a Posted event may legally claim this row (promotion).
    /// Declined auths stay behind as their own record.
    #[inline]
    pub fn is_postable(&self) -> bool {
        !matches!(self, PendingStatus::CardAuthDeclined)
    }

    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(PendingStatus::CardAuthorized),
            2 => Some(PendingStatus::HoldSet),
            3 => Some(PendingStatus::Validation),
            4 => Some(PendingStatus::Review),
            5 => Some(PendingStatus::BankProcessing),
            6 => Some(PendingStatus::CardAuthDeclined),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PendingStatus::CardAuthorized => "CARD_AUTHORIZED",
            PendingStatus::HoldSet => "HOLD_SET",
            PendingStatus::Validation => "VALIDATION",
            PendingStatus::Review => "REVIEW",
            PendingStatus::BankProcessing => "BANK_PROCESSING",
            PendingStatus::CardAuthDeclined => "CARD_AUTH_DECLINED",
        }
    }
}

impl fmt::Display for PendingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of an immutable Posted row (terminal)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i16)]
pub enum PostedStatus {
    /// Settled with a card leg attached
    CardPosted = 101,
    /// Settled without a card leg (ACH, wire, check, fee, interest)
    NonCardPosted = 102,
}

impl PostedStatus {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            101 => Some(PostedStatus::CardPosted),
            102 => Some(PostedStatus::NonCardPosted),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PostedStatus::CardPosted => "CARD_POSTED",
            PostedStatus::NonCardPosted => "NON_CARD_POSTED",
        }
    }
}

impl fmt::Display for PostedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
