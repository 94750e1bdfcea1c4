//! Error types for the storage layer.

use thiserror::Error;

/// Storage-specific errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Redis transport or command error.
    #[error("store error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Operation against a key holding the wrong kind of value.
    #[error("WRONGTYPE operation against key {0}")]
    WrongType(String),

    /// Source key of a rename does not exist.
    #[error("no such key: {0}")]
    NoSuchKey(String),

    /// Watched transaction kept conflicting with concurrent writers.
    #[error("optimistic transaction conflict on key {0}")]
    Conflict(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
