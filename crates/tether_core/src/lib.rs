//! # TETHER Core
//!
//! The kernel of the bridge between the authoritative simulation and the
//! external platforms (web dashboard, chat bot, realtime clients).
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        TETHER CORE                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐      │
//! │  │ Module       │  │ Capability   │  │ Loop         │      │
//! │  │ Manager      │──│ Registry     │──│ Scheduler    │      │
//! │  └──────────────┘  └──────────────┘  └──────────────┘      │
//! │         │                 │                 │               │
//! │         └─────────────────┴─────────────────┘               │
//! │                           │                                 │
//! │               ┌───────────▼───────────┐                     │
//! │               │ Authoritative Loop    │                     │
//! │               │ (single thread,       │                     │
//! │               │  never blocks on I/O) │                     │
//! │               └───────────────────────┘                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Rules
//!
//! - Only the authoritative loop mutates simulation-visible state.
//! - Every database and network call runs off that loop; results come back
//!   via [`LoopHandle::schedule`].
//! - A module that fails to enable stays disabled; the rest still enable.

pub mod capability;
pub mod config;
pub mod error;
pub mod module;
pub mod sched;

pub use capability::CapabilityRegistry;
pub use config::BridgeConfig;
pub use error::{CoreError, CoreResult};
pub use module::{Module, ModuleContext, ModuleManager};
pub use sched::{AuthoritativeLoop, LoopHandle, LoopTask, SimHost};
