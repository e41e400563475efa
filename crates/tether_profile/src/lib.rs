//! # TETHER Profile
//!
//! One [`SessionProfile`] per active session, owned by the cache for the
//! session's lifetime. The entry is loaded and published *before* the
//! session becomes visible to the rest of the system - code elsewhere
//! assumes a cache hit for every visible session - and removed (with a
//! best-effort flush) when the session ends.
//!
//! Reads are non-blocking clones; the backing map is safe for concurrent
//! access from the polling, gateway and session-event contexts without any
//! caller-side locking.

pub mod cache;
pub mod manager;
pub mod profile;
pub mod scanner;

pub use cache::ProfileCache;
pub use manager::ProfileManager;
pub use profile::SessionProfile;
pub use scanner::{CosmeticScanner, ScanOutcome};
