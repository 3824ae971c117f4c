//! Partner-bank notification wire types
//!
//! The bank delivers JSON envelopes at-least-once, possibly out of order and
//! duplicated. The envelope is decoded eagerly; the `data` object is decoded
//! lazily by whichever handler the dispatcher routes to, so an unknown event
//! kind never fails on a payload shape we do not care about.

pub mod envelope;
pub mod payloads;

pub use envelope::{
    EntityType, NotificationAction, NotificationAttribute, NotificationEnvelope, NotificationType,
};
pub use payloads::{
    CardTransaction, CodeType, HoldTransaction, MoneyTransferStatusNotification,
    PendingTransferNotification, ProfileUpdateNotification, TransactionNotification,
    TransactionType, TransferStatus,
};
