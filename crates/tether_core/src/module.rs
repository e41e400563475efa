//! # Module Lifecycle Manager
//!
//! Named subsystems register once, enable in registration order and disable
//! when asked. Every transition runs inside a failure boundary: one module's
//! enable error is logged and leaves that module disabled, but the rest still
//! attempt to enable. There are no automatic retries; a failed enable needs
//! an explicit operator reload.

use crate::capability::CapabilityRegistry;
use crate::config::BridgeConfig;
use crate::error::CoreResult;
use crate::sched::LoopHandle;
use std::sync::Arc;

/// Everything a module needs while enabling: configuration, the capability
/// registry for collaborator discovery, and the scheduler handle for getting
/// work onto the authoritative loop.
pub struct ModuleContext {
    /// Current configuration snapshot.
    pub config: Arc<BridgeConfig>,
    /// Shared capability registry.
    pub capabilities: Arc<CapabilityRegistry>,
    /// Handle to the authoritative loop.
    pub loop_handle: LoopHandle,
}

/// An independently-failing subsystem of the bridge.
pub trait Module: Send {
    /// Stable name, used for config flags and log lines.
    fn name(&self) -> &'static str;

    /// Brings the module up. Publishing capabilities and spawning background
    /// work happens here. An error leaves the module disabled.
    fn enable(&mut self, ctx: &ModuleContext) -> CoreResult<()>;

    /// Tears the module down. In-flight background work is allowed to finish;
    /// no new work is scheduled after this returns.
    fn disable(&mut self, ctx: &ModuleContext) -> CoreResult<()>;
}

struct ModuleEntry {
    module: Box<dyn Module>,
    enabled: bool,
}

/// Owns all registered modules and drives their lifecycle.
#[derive(Default)]
pub struct ModuleManager {
    entries: Vec<ModuleEntry>,
}

impl ModuleManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module. Registration order is enable order.
    pub fn register(&mut self, module: Box<dyn Module>) {
        tracing::debug!(module = module.name(), "module registered");
        self.entries.push(ModuleEntry {
            module,
            enabled: false,
        });
    }

    /// Enables all registered modules whose config flag is true.
    ///
    /// Returns the number of modules that enabled successfully.
    pub fn enable_all(&mut self, ctx: &ModuleContext) -> usize {
        let mut enabled = 0;
        for entry in &mut self.entries {
            let name = entry.module.name();
            if entry.enabled {
                continue;
            }
            if !ctx.config.module_enabled(name) {
                tracing::info!(module = name, "module disabled by config, skipping");
                continue;
            }
            match entry.module.enable(ctx) {
                Ok(()) => {
                    entry.enabled = true;
                    enabled += 1;
                    tracing::info!(module = name, "module enabled");
                }
                Err(e) => {
                    tracing::error!(module = name, error = %e, "module failed to enable");
                }
            }
        }
        enabled
    }

    /// Disables every currently enabled module, failure-isolated.
    pub fn disable_all(&mut self, ctx: &ModuleContext) {
        for entry in &mut self.entries {
            if !entry.enabled {
                continue;
            }
            let name = entry.module.name();
            entry.enabled = false;
            match entry.module.disable(ctx) {
                Ok(()) => tracing::info!(module = name, "module disabled"),
                Err(e) => {
                    tracing::error!(module = name, error = %e, "module failed to disable cleanly");
                }
            }
        }
    }

    /// Full teardown and re-enable against a (possibly new) context.
    ///
    /// Clears the capability registry in between so modules can republish.
    pub fn reload(&mut self, old_ctx: &ModuleContext, new_ctx: &ModuleContext) -> usize {
        self.disable_all(old_ctx);
        new_ctx.capabilities.clear();
        self.enable_all(new_ctx)
    }

    /// Returns whether the named module is currently enabled.
    #[must_use]
    pub fn is_enabled(&self, name: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.module.name() == name && e.enabled)
    }

    /// Number of registered modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no modules are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
