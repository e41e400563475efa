//! # Bridge Modules
//!
//! Concrete [`Module`] implementations, registered in dependency order:
//! store, mirror, cosmetics, profiles, gateway, bridge. Each publishes its
//! service handle into the capability registry on enable; later modules
//! resolve collaborators from there.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tether_core::{CoreError, CoreResult, Module, ModuleContext};
use tether_gateway::{spawn_gateway, GatewayServer};
use tether_link::{spawn_sweeper, BrokerTtls, LinkBroker};
use tether_profile::{CosmeticScanner, ProfileCache, ProfileManager};
use tether_relay::{spawn_poller, RelayQueue};
use tether_store::{BalanceMirror, LinkStore};

fn failed(name: &'static str, reason: impl std::fmt::Display) -> CoreError {
    CoreError::ModuleFailed {
        name,
        reason: reason.to_string(),
    }
}

fn require<T: Send + Sync + 'static>(
    ctx: &ModuleContext,
    name: &'static str,
    what: &str,
) -> CoreResult<Arc<T>> {
    ctx.capabilities
        .lookup::<T>()
        .ok_or_else(|| failed(name, format!("{what} capability is not available")))
}

fn join_quietly(name: &str, handle: Option<JoinHandle<()>>) {
    if let Some(handle) = handle {
        if handle.join().is_err() {
            tracing::warn!(module = name, "background thread panicked before disable");
        }
    }
}

// ============================================================================
// STORE
// ============================================================================

/// Opens the link store and publishes it.
#[derive(Default)]
pub struct StoreModule;

impl Module for StoreModule {
    fn name(&self) -> &'static str {
        "store"
    }

    fn enable(&mut self, ctx: &ModuleContext) -> CoreResult<()> {
        let store = LinkStore::open(Path::new(&ctx.config.database.path))
            .map_err(|e| failed("store", e))?;
        ctx.capabilities.provide(Arc::new(store));
        Ok(())
    }

    fn disable(&mut self, _ctx: &ModuleContext) -> CoreResult<()> {
        // The connection closes when the registry drops the handle on reload.
        Ok(())
    }
}

// ============================================================================
// LEDGER MIRROR
// ============================================================================

/// Opens the external economy ledger read-only and publishes it.
///
/// The ledger file belongs to another system; if it is missing this module
/// fails to enable and balances stay at zero, but everything else runs.
#[derive(Default)]
pub struct MirrorModule;

impl Module for MirrorModule {
    fn name(&self) -> &'static str {
        "mirror"
    }

    fn enable(&mut self, ctx: &ModuleContext) -> CoreResult<()> {
        let mirror = BalanceMirror::open(Path::new(&ctx.config.mirror.path))
            .map_err(|e| failed("mirror", e))?;
        ctx.capabilities.provide(Arc::new(mirror));
        Ok(())
    }

    fn disable(&mut self, _ctx: &ModuleContext) -> CoreResult<()> {
        Ok(())
    }
}

// ============================================================================
// COSMETICS
// ============================================================================

/// Builds the cosmetic tier scanner from configuration.
#[derive(Default)]
pub struct CosmeticsModule;

impl Module for CosmeticsModule {
    fn name(&self) -> &'static str {
        "cosmetics"
    }

    fn enable(&mut self, ctx: &ModuleContext) -> CoreResult<()> {
        let store = require::<LinkStore>(ctx, "cosmetics", "link store")?;
        let scanner = CosmeticScanner::from_config(store, &ctx.config.cosmetics.items);
        tracing::info!(mappings = scanner.mapping_count(), "cosmetic tier table loaded");
        ctx.capabilities.provide(Arc::new(scanner));
        Ok(())
    }

    fn disable(&mut self, _ctx: &ModuleContext) -> CoreResult<()> {
        Ok(())
    }
}

// ============================================================================
// PROFILES
// ============================================================================

/// Builds the session profile cache and its manager.
#[derive(Default)]
pub struct ProfilesModule;

impl Module for ProfilesModule {
    fn name(&self) -> &'static str {
        "profiles"
    }

    fn enable(&mut self, ctx: &ModuleContext) -> CoreResult<()> {
        let store = require::<LinkStore>(ctx, "profiles", "link store")?;
        let mirror = ctx.capabilities.lookup::<BalanceMirror>();
        if mirror.is_none() {
            tracing::warn!("ledger mirror unavailable, session balances will read 0");
        }
        let manager = ProfileManager::new(
            store,
            mirror,
            Arc::new(ProfileCache::new()),
            &ctx.config.server_id,
        );
        ctx.capabilities.provide(Arc::new(manager));
        Ok(())
    }

    fn disable(&mut self, _ctx: &ModuleContext) -> CoreResult<()> {
        Ok(())
    }
}

// ============================================================================
// GATEWAY
// ============================================================================

/// Binds the realtime gateway and runs it on its own runtime.
#[derive(Default)]
pub struct GatewayModule {
    stop: Option<Arc<AtomicBool>>,
    handle: Option<JoinHandle<()>>,
}

impl Module for GatewayModule {
    fn name(&self) -> &'static str {
        "gateway"
    }

    fn enable(&mut self, ctx: &ModuleContext) -> CoreResult<()> {
        let addr = ("0.0.0.0", ctx.config.gateway.port);
        let listener = std::net::TcpListener::bind(addr).map_err(|e| {
            failed("gateway", format!("cannot bind port {}: {e}", ctx.config.gateway.port))
        })?;
        let server = GatewayServer::new(&ctx.config.gateway.secret_token, ctx.loop_handle.clone());
        let stop = Arc::new(AtomicBool::new(false));
        let handle = spawn_gateway(server, listener, Arc::clone(&stop))
            .map_err(|e| failed("gateway", e))?;
        tracing::info!(port = ctx.config.gateway.port, "gateway listening");
        self.stop = Some(stop);
        self.handle = Some(handle);
        Ok(())
    }

    fn disable(&mut self, _ctx: &ModuleContext) -> CoreResult<()> {
        if let Some(stop) = self.stop.take() {
            stop.store(true, Ordering::Release);
        }
        join_quietly("gateway", self.handle.take());
        Ok(())
    }
}

// ============================================================================
// BRIDGE (link broker + relay queue)
// ============================================================================

/// Runs the link broker with its expiry sweeper, and the relay poller.
#[derive(Default)]
pub struct BridgeModule {
    stop: Option<Arc<AtomicBool>>,
    sweeper: Option<JoinHandle<()>>,
    poller: Option<JoinHandle<()>>,
}

impl Module for BridgeModule {
    fn name(&self) -> &'static str {
        "bridge"
    }

    fn enable(&mut self, ctx: &ModuleContext) -> CoreResult<()> {
        let store = require::<LinkStore>(ctx, "bridge", "link store")?;

        let broker = Arc::new(LinkBroker::new(
            Arc::clone(&store),
            BrokerTtls {
                code_ttl_secs: ctx.config.link.code_ttl_secs,
                token_ttl_secs: ctx.config.link.token_ttl_secs,
            },
        ));
        ctx.capabilities.provide(Arc::clone(&broker));

        let queue = Arc::new(RelayQueue::new(
            store,
            ctx.loop_handle.clone(),
            ctx.config.relay.batch_size,
        ));

        let stop = Arc::new(AtomicBool::new(false));
        self.sweeper = Some(spawn_sweeper(
            broker,
            Duration::from_secs(ctx.config.link.sweep_interval_secs),
            Arc::clone(&stop),
        ));
        self.poller = Some(spawn_poller(
            queue,
            Duration::from_millis(ctx.config.relay.poll_interval_ms),
            Arc::clone(&stop),
        ));
        self.stop = Some(stop);
        Ok(())
    }

    fn disable(&mut self, _ctx: &ModuleContext) -> CoreResult<()> {
        if let Some(stop) = self.stop.take() {
            stop.store(true, Ordering::Release);
        }
        join_quietly("bridge", self.sweeper.take());
        join_quietly("bridge", self.poller.take());
        Ok(())
    }
}

/// Registers every bridge module in dependency order.
pub fn register_all(manager: &mut tether_core::ModuleManager) {
    manager.register(Box::new(StoreModule));
    manager.register(Box::new(MirrorModule));
    manager.register(Box::new(CosmeticsModule));
    manager.register(Box::new(ProfilesModule));
    manager.register(Box::new(GatewayModule::default()));
    manager.register(Box::new(BridgeModule::default()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::{AuthoritativeLoop, BridgeConfig, CapabilityRegistry, ModuleManager};

    fn ctx(config: BridgeConfig) -> ModuleContext {
        let (handle, _loop) = AuthoritativeLoop::channel(16);
        ModuleContext {
            config: Arc::new(config),
            capabilities: Arc::new(CapabilityRegistry::new()),
            loop_handle: handle,
        }
    }

    #[test]
    fn missing_store_fails_dependents_but_not_the_manager() {
        let mut manager = ModuleManager::new();
        register_all(&mut manager);

        // Disable the store; cosmetics, profiles and bridge cannot resolve
        // it and must fail in isolation. The mirror fails on its missing
        // file, the gateway has no store dependency at all.
        let mut config = BridgeConfig::default();
        config.modules.insert("store".to_string(), false);
        config.modules.insert("gateway".to_string(), false);
        let ctx = ctx(config);

        assert_eq!(manager.enable_all(&ctx), 0);
        assert!(!manager.is_enabled("cosmetics"));
        assert!(!manager.is_enabled("profiles"));
        assert!(!manager.is_enabled("bridge"));
    }

    #[test]
    fn cosmetics_publishes_a_scanner() {
        let mut module = CosmeticsModule;
        let mut config = BridgeConfig::default();
        config
            .cosmetics
            .items
            .insert("1001".to_string(), "bronze".to_string());
        let ctx = ctx(config);
        ctx.capabilities
            .provide(Arc::new(LinkStore::open_in_memory().unwrap()));

        module.enable(&ctx).unwrap();
        let scanner = ctx.capabilities.lookup::<CosmeticScanner>().unwrap();
        assert_eq!(scanner.classify(1001), Some("bronze"));
    }

    #[test]
    fn bridge_module_spawns_and_stops_cleanly() {
        let mut module = BridgeModule::default();
        let ctx = ctx(BridgeConfig::default());
        ctx.capabilities
            .provide(Arc::new(LinkStore::open_in_memory().unwrap()));

        module.enable(&ctx).unwrap();
        assert!(ctx.capabilities.lookup::<LinkBroker>().is_some());
        module.disable(&ctx).unwrap();
        assert!(module.sweeper.is_none());
        assert!(module.poller.is_none());
    }

    #[test]
    fn gateway_port_conflict_is_a_module_failure() {
        let occupied = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
        let port = occupied.local_addr().unwrap().port();

        let mut config = BridgeConfig::default();
        config.gateway.port = port;
        let ctx = ctx(config);

        let mut module = GatewayModule::default();
        let err = module.enable(&ctx).unwrap_err();
        assert!(matches!(err, CoreError::ModuleFailed { name: "gateway", .. }));
    }
}
