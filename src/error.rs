//! Pipeline Error Types
//!
//! One error enum per pipeline boundary, rolled up into [`PipelineError`].
//! The split that matters operationally is fatal vs non-fatal:
//!
//! - **fatal** errors propagate out of `Dispatcher::dispatch` so the queue
//!   consumer redelivers the message (malformed payload, missing owner,
//!   ledger store failure, unhandled classification);
//! - **non-fatal** conditions never become errors at all: unknown routes are
//!   an `Ignored` outcome, "not found" lookups are an expected branch, and
//!   side-effect failures are logged and swallowed by the Coordinator.

use thiserror::Error;

/// Errors surfaced by the ledger store collaborators.
///
/// "Row absent" is deliberately NOT a variant: lookups return `Option` and
/// a miss is an expected branch of the reconciliation state machine.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Uniqueness violated for correlation key: {0}")]
    DuplicateRow(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Errors from the correlation resolver (owner/context lookups)
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("No owning business for entity {entity_id} ({entity_type})")]
    OwnerNotFound {
        entity_id: String,
        entity_type: String,
    },

    #[error("Entity type not supported for resolution: {0}")]
    UnsupportedEntityType(String),

    #[error("Directory lookup failed: {0}")]
    Directory(String),
}

/// Classifier failure: a (transaction type, code type, context) combination
/// no rule claims. Fatal for the notification, unlike the dispatcher's
/// silent unknown-route no-op.
#[derive(Debug, Error)]
#[error("Unhandled transaction classification: type={transaction_type} code={code_type}")]
pub struct UnhandledClassification {
    pub transaction_type: String,
    pub code_type: String,
}

/// Top-level pipeline error. Everything here is fatal: the caller should
/// redeliver the notification.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Malformed notification envelope: {0}")]
    MalformedEnvelope(#[source] serde_json::Error),

    #[error("Malformed {kind} payload: {source}")]
    MalformedPayload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Classify(#[from] UnhandledClassification),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PipelineError {
    /// Stable error code for logs and dead-letter annotations
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::MalformedEnvelope(_) => "MALFORMED_ENVELOPE",
            PipelineError::MalformedPayload { .. } => "MALFORMED_PAYLOAD",
            PipelineError::Resolve(ResolveError::OwnerNotFound { .. }) => "OWNER_NOT_FOUND",
            PipelineError::Resolve(ResolveError::UnsupportedEntityType(_)) => {
                "UNSUPPORTED_ENTITY_TYPE"
            }
            PipelineError::Resolve(ResolveError::Directory(_)) => "DIRECTORY_ERROR",
            PipelineError::Classify(_) => "UNHANDLED_CLASSIFICATION",
            PipelineError::Store(StoreError::Database(_)) => "STORE_ERROR",
            PipelineError::Store(StoreError::DuplicateRow(_)) => "DUPLICATE_ROW",
        }
    }
}
