//! # TETHER Host
//!
//! The deployable bridge. [`host::BridgeHost`] is the authoritative loop's
//! simulation stand-in (session roster, console dispatcher, message
//! delivery); [`modules`] holds the concrete [`tether_core::Module`]
//! implementations that wire the store, ledger mirror, cosmetic scanner,
//! profile cache, gateway and link/relay services together.

pub mod host;
pub mod modules;

pub use host::{BridgeHost, Delivery};
