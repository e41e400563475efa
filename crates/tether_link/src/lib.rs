//! # TETHER Link
//!
//! The link broker: single-use, time-boxed codes and tokens binding one
//! external source identity to one simulation identity, with conflict
//! resolution guaranteeing the one-to-one invariant across all sources.
//!
//! ## Code lifecycle
//!
//! ```text
//! Issued ──redeem──▶ Redeemed (row deleted)
//!   │
//!   └────expiry─────▶ Expired (row deleted by sweep, or lazily at redeem)
//! ```
//!
//! A re-issue for the same (source, source identity) supersedes the
//! outstanding code; at most one live code exists per pair.

pub mod broker;
pub mod code;
pub mod error;

pub use broker::{spawn_sweeper, BrokerTtls, IssuedCode, LinkBroker, RedeemOutcome};
pub use error::{LinkError, LinkResult};
