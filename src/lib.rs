//! BankSync - Partner-Bank Notification Reconciliation Engine
//!
//! Consumes the partner bank's at-least-once notification stream and keeps
//! the internal ledger in sync: card authorizations and holds become Pending
//! rows, settlements promote or insert Posted rows, reversals clean up, and
//! every accepted mutation fans out to the activity stream, push
//! notifications and the compliance side channel.
//!
//! # Modules
//!
//! - [`notification`] - Wire types (envelope + per-type payloads)
//! - [`dispatch`] - Routing table from envelope to handler
//! - [`resolve`] - Correlation resolver (entity -> owning business, transfer context)
//! - [`classify`] - Ordered rule table producing activity classifications
//! - [`reconcile`] - Pending/Posted ledger state machine + stores
//! - [`coordinator`] - Side-effect fan-out (activity, push, receipts, compliance)
//! - [`money`] - Decimal amount + currency
//! - [`error`] - Pipeline error taxonomy (fatal vs non-fatal)

pub mod config;
pub mod error;
pub mod logging;
pub mod money;

pub mod classify;
pub mod coordinator;
pub mod dispatch;
pub mod notification;
pub mod reconcile;
pub mod resolve;

// Convenient re-exports at crate root
pub use classify::{ActivityMessage, ActivityType, Classification};
pub use config::AppConfig;
pub use coordinator::SideEffectCoordinator;
pub use dispatch::{DispatchOutcome, Dispatcher};
pub use error::{PipelineError, ResolveError, StoreError, UnhandledClassification};
pub use money::{Currency, Money};
pub use notification::{CodeType, NotificationEnvelope, TransactionType, TransferStatus};
pub use reconcile::{
    LedgerStore, MemLedgerStore, PgLedgerStore, ReconcileOutcome, Reconciler, TransactionId,
};
pub use resolve::CorrelationResolver;
