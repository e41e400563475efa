//! # TETHER Bridge Host
//!
//! Headless bridge process. Reads console commands from stdin, runs the
//! authoritative loop at a fixed tick, and drives the module lifecycle.
//!
//! ```bash
//! tether [config.toml]     # default path: tether.toml
//! ```
//!
//! Type `session join <identity> <name>` to admit a session, `quit` or EOF
//! to shut down. Log verbosity follows `RUST_LOG`.

use std::io::BufRead;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tether::modules::register_all;
use tether::BridgeHost;
use tether_core::{AuthoritativeLoop, BridgeConfig, CapabilityRegistry, ModuleContext, ModuleManager};
use tracing_subscriber::EnvFilter;

/// One simulation tick; the loop drains scheduled tasks at this cadence.
const TICK: Duration = Duration::from_millis(50);

/// Capacity of the task channel into the authoritative loop.
const LOOP_CAPACITY: usize = 256;

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "tether.toml".to_string());
    let config = match BridgeConfig::load(Path::new(&config_path)) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            tracing::error!(path = %config_path, error = %e, "configuration is unusable");
            std::process::exit(1);
        }
    };

    let (loop_handle, sim_loop) = AuthoritativeLoop::channel(LOOP_CAPACITY);
    let capabilities = Arc::new(CapabilityRegistry::new());
    let mut ctx = ModuleContext {
        config: Arc::clone(&config),
        capabilities: Arc::clone(&capabilities),
        loop_handle: loop_handle.clone(),
    };
    let mut host = BridgeHost::new(config, capabilities, loop_handle.clone());

    let mut manager = ModuleManager::new();
    register_all(&mut manager);
    let enabled = manager.enable_all(&ctx);
    tracing::info!(enabled, registered = manager.len(), "bridge up");

    // Console commands go through the loop like every other command source.
    let stop = Arc::new(AtomicBool::new(false));
    let console_stop = Arc::clone(&stop);
    let console_handle = loop_handle.clone();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let line = line.trim().to_string();
            if line.is_empty() {
                continue;
            }
            if line == "quit" || line == "stop" {
                break;
            }
            if let Err(e) = console_handle.run_command(line) {
                tracing::warn!(error = %e, "console command not scheduled");
            }
        }
        console_stop.store(true, Ordering::Release);
    });

    while !stop.load(Ordering::Acquire) {
        std::thread::sleep(TICK);
        sim_loop.drain(&mut host);

        if host.take_reload_request() {
            match BridgeConfig::load(Path::new(&config_path)) {
                Ok(new_config) => {
                    let new_config = Arc::new(new_config);
                    let new_ctx = ModuleContext {
                        config: Arc::clone(&new_config),
                        capabilities: Arc::clone(&ctx.capabilities),
                        loop_handle: ctx.loop_handle.clone(),
                    };
                    let enabled = manager.reload(&ctx, &new_ctx);
                    host.update_config(new_config);
                    ctx = new_ctx;
                    tracing::info!(enabled, "bridge reloaded");
                }
                Err(e) => {
                    tracing::error!(error = %e, "reload aborted, keeping current configuration");
                }
            }
        }
    }

    // Already-scheduled tasks still run, then modules come down.
    sim_loop.drain(&mut host);
    manager.disable_all(&ctx);
    tracing::info!("bridge stopped");
}
