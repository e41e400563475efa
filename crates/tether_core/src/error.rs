//! # Core Error Types
//!
//! Failures in module lifecycle, configuration and loop scheduling.

use thiserror::Error;

/// Errors that can occur in the core layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A required configuration value is missing or invalid.
    ///
    /// The module that needed it fails to enable; others are unaffected.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A module's enable hook failed.
    #[error("module {name} failed to enable: {reason}")]
    ModuleFailed {
        /// Name of the module.
        name: &'static str,
        /// What went wrong, for the log.
        reason: String,
    },

    /// The authoritative loop has shut down and no longer accepts tasks.
    #[error("authoritative loop is closed")]
    LoopClosed,

    /// The loop task channel is full; the caller should treat this as a
    /// transient failure and retry on its next cycle.
    #[error("authoritative loop is saturated, task rejected")]
    LoopSaturated,

    /// A command handed to the simulation dispatcher was rejected.
    #[error("command rejected: {0}")]
    CommandRejected(String),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
