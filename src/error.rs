use thiserror::Error;

use crate::remote::RemoteError;

/// Errors surfaced by the cache, the synced collections and the ledger.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    /// Transport or server-side failure. Retryable at the caller's discretion.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// A lookup by id found nothing.
    #[error("{table} row not found: {id}")]
    NotFound { table: String, id: String },

    /// More than one client holds the same loyalty code.
    #[error("loyalty code {code} is held by {matches} clients")]
    AmbiguousCode { code: String, matches: usize },

    /// The optimistic write on a ledger account kept losing to concurrent writers.
    #[error("concurrent update on account {account_id}: gave up after {attempts} attempts")]
    ConcurrentUpdate { account_id: String, attempts: u32 },

    /// Malformed input, rejected before any remote call.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The session has no signed-in owner.
    #[error("no signed-in owner")]
    Unauthenticated,

    #[error("lock poisoned during {0}")]
    LockPoisoned(&'static str),
}

impl SyncError {
    pub fn validation(message: impl Into<String>) -> Self {
        SyncError::Validation(message.into())
    }

    pub fn not_found(table: impl Into<String>, id: impl Into<String>) -> Self {
        SyncError::NotFound {
            table: table.into(),
            id: id.into(),
        }
    }

    /// Whether re-invoking the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Remote(err) => err.is_retryable(),
            SyncError::ConcurrentUpdate { .. } => true,
            _ => false,
        }
    }
}
