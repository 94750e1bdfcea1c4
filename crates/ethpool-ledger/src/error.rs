//! Error types for the accounting ledger.

use ethpool_storage::StorageError;
use thiserror::Error;

/// Ledger errors.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Underlying store failure, surfaced unchanged.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A payout run already holds the lock.
    #[error("unable to acquire lock '{0}'")]
    LockHeld(String),
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
