//! # Store Error Types

use thiserror::Error;

/// Errors that can occur against the link store or the ledger mirror.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The requested code, account or row does not exist.
    #[error("not found")]
    NotFound,

    /// The code exists but is past its expiry. It has been deleted.
    #[error("code expired")]
    Expired,

    /// Could not acquire the database connection within the timeout.
    ///
    /// Transient; the caller may retry on its next cycle.
    #[error("store busy, connection not acquired in time")]
    Busy,

    /// An underlying SQLite failure. Transient from the caller's point of
    /// view: logged, the operation abandoned, never retried automatically.
    #[error("store I/O failure: {0}")]
    Io(#[from] rusqlite::Error),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
