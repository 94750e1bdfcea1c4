//! Error types for the stats aggregator.

use ethpool_storage::StorageError;
use thiserror::Error;

/// Stats errors.
#[derive(Error, Debug)]
pub enum StatsError {
    /// Underlying store failure, surfaced unchanged.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for stats operations.
pub type StatsResult<T> = Result<T, StatsError>;
