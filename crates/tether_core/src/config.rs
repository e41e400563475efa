//! # Bridge Configuration
//!
//! One TOML file, loaded once at startup. Every field has a default so a
//! missing file yields a runnable (if useless) configuration; a present but
//! malformed file is a [`CoreError::Configuration`].

use crate::error::{CoreError, CoreResult};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Root configuration for the bridge.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Link store database settings.
    pub database: DatabaseConfig,
    /// Ledger mirror settings (separate single-writer store).
    pub mirror: MirrorConfig,
    /// Realtime gateway settings.
    pub gateway: GatewayConfig,
    /// Command relay queue settings.
    pub relay: RelayConfig,
    /// Link broker settings.
    pub link: LinkConfig,
    /// Per-module enable flags, keyed by module name. Missing key = enabled.
    pub modules: HashMap<String, bool>,
    /// Cosmetic item model-id -> tier name table.
    pub cosmetics: CosmeticsConfig,
    /// User-visible message settings.
    pub messages: MessagesConfig,
    /// Identifier of this deployment in shared tables.
    pub server_id: String,
}

/// Link store database settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "tether.db".to_string(),
        }
    }
}

/// Ledger mirror settings.
///
/// The ledger is owned by another process and configured for single-writer
/// access; the bridge only ever reads it.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Path to the ledger SQLite database file.
    pub path: String,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            path: "ledger/accounts.db".to_string(),
        }
    }
}

/// Realtime gateway settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// TCP port to bind.
    pub port: u16,
    /// Shared secret expected from every client.
    pub secret_token: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: 8887,
            secret_token: "changeme".to_string(),
        }
    }
}

/// Command relay queue settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Poll interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Maximum rows selected per poll.
    pub batch_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            batch_size: 5,
        }
    }
}

/// Link broker settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Lifetime of a short link code, in seconds.
    pub code_ttl_secs: u64,
    /// Lifetime of a high-entropy web token, in seconds.
    pub token_ttl_secs: u64,
    /// Interval between expiry sweeps, in seconds.
    pub sweep_interval_secs: u64,
    /// Domain shown to users when issuing a code.
    pub domain: String,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            code_ttl_secs: 900,
            token_ttl_secs: 300,
            sweep_interval_secs: 1800,
            domain: "example.net".to_string(),
        }
    }
}

/// Cosmetic tier lookup table.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct CosmeticsConfig {
    /// Item model id (as a string key, TOML tables require it) -> tier name.
    pub items: HashMap<String, String>,
}

/// User-visible message settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MessagesConfig {
    /// Prefix prepended to every user-visible bridge message.
    pub prefix: String,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            prefix: "[Tether] ".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> CoreResult<Self> {
        toml::from_str(text).map_err(|e| CoreError::Configuration(e.to_string()))
    }

    /// Loads the configuration from a file.
    ///
    /// A missing file falls back to defaults; an unreadable or malformed file
    /// is an error.
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Configuration(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Returns whether a module is enabled. Unknown modules default to true.
    #[must_use]
    pub fn module_enabled(&self, name: &str) -> bool {
        self.modules.get(name).copied().unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = BridgeConfig::default();
        assert_eq!(config.relay.batch_size, 5);
        assert_eq!(config.relay.poll_interval_ms, 2000);
        assert_eq!(config.link.code_ttl_secs, 900);
        assert_eq!(config.link.sweep_interval_secs, 1800);
        assert_eq!(config.gateway.port, 8887);
        assert!(config.module_enabled("anything"));
    }

    #[test]
    fn parses_partial_toml() {
        let config = BridgeConfig::from_toml_str(
            r#"
            server_id = "survival"

            [gateway]
            port = 9001
            secret_token = "s3cret"

            [relay]
            poll_interval_ms = 500

            [modules]
            gateway = false

            [cosmetics.items]
            10001 = "bronze"
            10002 = "silver"
            "#,
        )
        .unwrap();

        assert_eq!(config.server_id, "survival");
        assert_eq!(config.gateway.port, 9001);
        assert_eq!(config.gateway.secret_token, "s3cret");
        assert_eq!(config.relay.poll_interval_ms, 500);
        // Untouched sections keep their defaults.
        assert_eq!(config.relay.batch_size, 5);
        assert!(!config.module_enabled("gateway"));
        assert!(config.module_enabled("store"));
        assert_eq!(config.cosmetics.items.get("10001").unwrap(), "bronze");
    }

    #[test]
    fn malformed_toml_is_a_configuration_error() {
        let err = BridgeConfig::from_toml_str("gateway = 12").unwrap_err();
        assert!(matches!(err, CoreError::Configuration(_)));
    }
}
