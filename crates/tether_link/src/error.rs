//! # Link Broker Error Types

use thiserror::Error;

/// Errors surfaced by link broker operations.
#[derive(Error, Debug)]
pub enum LinkError {
    /// No live code with that value. Also the answer for already-consumed
    /// codes: once redeemed, a code is indistinguishable from one that
    /// never existed.
    #[error("code not found")]
    CodeNotFound,

    /// The code existed but was past its expiry; it has been removed and a
    /// fresh one must be issued.
    #[error("code expired")]
    CodeExpired,

    /// The code was issued by the simulation and must be redeemed on the
    /// issuing platform, not here.
    #[error("code must be redeemed on the external platform")]
    WrongSide,

    /// The underlying store failed. Transient; logged and abandoned.
    #[error(transparent)]
    Store(#[from] tether_store::StoreError),
}

/// Result type for link broker operations.
pub type LinkResult<T> = Result<T, LinkError>;
