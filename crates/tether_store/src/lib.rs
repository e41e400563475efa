//! # TETHER Store
//!
//! SQLite-backed persistence for the bridge:
//!
//! - `link_codes` - short-lived linking credentials
//! - `linked_accounts` - permanent cross-system identity bindings
//! - `relay_commands` - the durable operator command queue
//! - `session_presence` - who is online on which server
//!
//! plus a read-through mirror of the external ledger database.
//!
//! ## Concurrency
//!
//! One connection per database, guarded by a mutex with a short acquisition
//! timeout. All callers run off the authoritative loop; a timeout surfaces as
//! [`StoreError::Busy`] and is never retried inside the same operation.
//! The redemption conflict-resolution steps run inside one SQLite
//! transaction so a crash can never leave a duplicate claim.

pub mod error;
pub mod mirror;
pub mod store;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use mirror::BalanceMirror;
pub use store::LinkStore;
pub use types::{
    now_millis, LinkCodeRow, LinkedAccountRow, PresenceStatus, RelayCommandRow, SourceKind,
};
