//! # TETHER Relay
//!
//! The durable, polling-based command delivery path. External systems insert
//! rows into `relay_commands`; the poller selects the oldest unconsumed
//! batch on a fixed interval, hands each command to the authoritative loop,
//! and marks the row consumed after a successful hand-off.
//!
//! ## Delivery semantics
//!
//! - Within one batch, dispatch order equals selection order (creation time
//!   ascending).
//! - Marking is independent of execution success: a command that fails while
//!   executing stays consumed. No automatic retry; the failure is logged.
//! - Marking an already-consumed row again is a no-op, so a delayed mark
//!   racing a resweep after a reconnect is harmless.
//! - At most one poll is in flight; a tick that fires while the previous one
//!   is still working is skipped.

pub mod queue;

pub use queue::{spawn_poller, RelayError, RelayQueue, RelayResult};
