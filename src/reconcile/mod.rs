//! Ledger Reconciliation
//!
//! The core state machine. Given a classified bank event it decides the
//! pending/posted transition and performs the minimal read-then-write
//! against the ledger store:
//!
//! ```text
//! classified event ──▶ Reconciler ──▶ {Inserted, Promoted, Deleted, Ignored}
//!                          │
//!                          ▼
//!                     LedgerStore (memory | postgres, picked at wiring)
//! ```
//!
//! Invariants enforced here:
//! - at most one Posted row per `bank_transaction_id`, and at most one per
//!   (`money_transfer_id`, `account_id`);
//! - a Pending row ends in exactly one of promotion (same public id) or
//!   deletion;
//! - `code_type` alone selects the transition; unknown codes are no-ops.

pub mod key;
pub mod mem;
pub mod pg;
pub mod reconciler;
pub mod state;
pub mod store;
pub mod types;

pub use key::CorrelationKey;
pub use mem::MemLedgerStore;
pub use pg::PgLedgerStore;
pub use reconciler::{LedgerEvent, ReconcileOutcome, Reconciler, Reconciliation};
pub use state::{PendingStatus, PostedStatus};
pub use store::LedgerStore;
pub use types::{PendingTransaction, PostedTransaction, TransactionId, TransactionSubtype};
