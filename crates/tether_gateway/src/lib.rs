//! # TETHER Gateway
//!
//! Line-oriented TCP gateway for realtime external clients (dashboards,
//! bots). The first line of every connection must authenticate against the
//! shared secret; everything after that is a stream of frames:
//!
//! ```text
//! alert:<message>    broadcast to every active session
//! console:<command>  execute as a console command
//! ```
//!
//! Frames are scheduled onto the authoritative loop and the connection task
//! moves on; the gateway never waits for simulation-side effects.

pub mod protocol;
pub mod server;

pub use protocol::{authenticate, parse_frame, Frame};
pub use server::{spawn_gateway, GatewayError, GatewayServer};
