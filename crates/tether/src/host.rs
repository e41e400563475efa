//! # Simulation Host
//!
//! The authoritative loop's stand-in for the game simulation: a session
//! roster, a console command dispatcher and message delivery. Bridge
//! commands (`link`, `unlink`, `money`, `bridge ...`) are handled here;
//! anything else is treated as a simulation command and recorded as
//! executed.
//!
//! Everything in this file runs on the loop thread. Store and network work
//! triggered by a command is pushed to a one-shot background thread which
//! reports back through [`LoopHandle::message_session`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tether_core::{BridgeConfig, CapabilityRegistry, CoreError, CoreResult, LoopHandle, SimHost};
use tether_link::{LinkBroker, LinkError};
use tether_profile::{CosmeticScanner, ProfileManager};
use tether_store::SourceKind;

/// A message the simulation delivered. Kept for the console log and tests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Shown to every active session.
    Broadcast(String),
    /// Shown to one session.
    Direct {
        /// Receiving session identity.
        identity: String,
        /// Message text, prefix included.
        message: String,
    },
}

struct SessionEntry {
    display_name: String,
    held_items: Vec<u32>,
}

/// The simulation stand-in driven by the authoritative loop.
pub struct BridgeHost {
    config: Arc<BridgeConfig>,
    capabilities: Arc<CapabilityRegistry>,
    loop_handle: LoopHandle,
    reload_requested: Arc<AtomicBool>,
    sessions: HashMap<String, SessionEntry>,
    deliveries: Vec<Delivery>,
    executed: Vec<String>,
}

impl BridgeHost {
    /// Creates a host over the shared capability registry.
    #[must_use]
    pub fn new(
        config: Arc<BridgeConfig>,
        capabilities: Arc<CapabilityRegistry>,
        loop_handle: LoopHandle,
    ) -> Self {
        Self {
            config,
            capabilities,
            loop_handle,
            reload_requested: Arc::new(AtomicBool::new(false)),
            sessions: HashMap::new(),
            deliveries: Vec::new(),
            executed: Vec::new(),
        }
    }

    /// Swaps the configuration snapshot after an operator reload.
    pub fn update_config(&mut self, config: Arc<BridgeConfig>) {
        self.config = config;
    }

    /// Consumes a pending `bridge reload` request, if one was issued.
    pub fn take_reload_request(&mut self) -> bool {
        self.reload_requested.swap(false, Ordering::AcqRel)
    }

    /// Whether a session is currently visible.
    #[must_use]
    pub fn is_online(&self, identity: &str) -> bool {
        self.sessions.contains_key(identity)
    }

    /// Messages delivered so far, oldest first.
    #[must_use]
    pub fn deliveries(&self) -> &[Delivery] {
        &self.deliveries
    }

    /// Non-bridge console commands that were executed, oldest first.
    #[must_use]
    pub fn executed_commands(&self) -> &[String] {
        &self.executed
    }

    /// Runs one command as a session. Bridge commands only; the stand-in has
    /// no other session-facing surface.
    pub fn session_command(&mut self, identity: &str, line: &str) {
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("link") => self.cmd_link(identity, parts.next()),
            Some("unlink") => self.cmd_unlink(identity, parts.next()),
            Some("money") => self.cmd_money(identity),
            _ => self.reply(identity, "Unknown command."),
        }
    }

    fn reply(&mut self, identity: &str, text: &str) {
        let message = format!("{}{text}", self.config.messages.prefix);
        self.message_session(identity, &message);
    }

    fn broker(&self) -> Option<Arc<LinkBroker>> {
        self.capabilities.lookup::<LinkBroker>()
    }

    fn profiles(&self) -> Option<Arc<ProfileManager>> {
        self.capabilities.lookup::<ProfileManager>()
    }

    fn scanner(&self) -> Option<Arc<CosmeticScanner>> {
        self.capabilities.lookup::<CosmeticScanner>()
    }

    // ========================================================================
    // SESSION-FACING COMMANDS
    // ========================================================================

    fn cmd_link(&mut self, identity: &str, code: Option<&str>) {
        let Some(code) = code else {
            let text = format!(
                "Get a code from the community bot or {} and run: link <code>",
                self.config.link.domain
            );
            self.reply(identity, &text);
            return;
        };
        let (Some(broker), Some(profiles)) = (self.broker(), self.profiles()) else {
            tracing::warn!(identity, "link requested while the bridge module is down");
            self.reply(identity, "Linking is unavailable right now.");
            return;
        };
        let Some(entry) = self.sessions.get(identity) else {
            tracing::warn!(identity, "link command from a session that is not admitted");
            return;
        };

        let code = code.to_string();
        let identity = identity.to_string();
        let display_name = entry.display_name.clone();
        let handle = self.loop_handle.clone();
        let prefix = self.config.messages.prefix.clone();
        std::thread::spawn(move || {
            let text = match broker.redeem(&code, &identity, &display_name) {
                Ok(outcome) => {
                    profiles.refresh(&identity);
                    format!(
                        "Linked to {} account {}.",
                        outcome.source.as_str(),
                        outcome.display_name
                    )
                }
                Err(LinkError::CodeNotFound) => "Unknown or already used code.".to_string(),
                Err(LinkError::CodeExpired) => {
                    "That code has expired. Request a new one.".to_string()
                }
                Err(LinkError::WrongSide) => {
                    "Enter this code on the website or community bot instead.".to_string()
                }
                Err(e) => {
                    tracing::error!(identity, error = %e, "link redemption failed");
                    "Something went wrong. Try again shortly.".to_string()
                }
            };
            if let Err(e) = handle.message_session(identity.clone(), format!("{prefix}{text}")) {
                tracing::warn!(identity, error = %e, "link result message dropped");
            }
        });
    }

    fn cmd_unlink(&mut self, identity: &str, slot: Option<&str>) {
        let source = match slot {
            None | Some("chat") => SourceKind::Chat,
            Some("web") => SourceKind::Web,
            Some(other) => {
                self.reply(identity, &format!("Unknown platform '{other}'. Use chat or web."));
                return;
            }
        };
        let (Some(broker), Some(profiles)) = (self.broker(), self.profiles()) else {
            self.reply(identity, "Linking is unavailable right now.");
            return;
        };

        let identity = identity.to_string();
        let handle = self.loop_handle.clone();
        let prefix = self.config.messages.prefix.clone();
        std::thread::spawn(move || {
            let text = match broker.unlink(&identity, source) {
                Ok(true) => {
                    profiles.refresh(&identity);
                    format!("Unlinked your {} account.", source.as_str())
                }
                Ok(false) => format!("No linked {} account.", source.as_str()),
                Err(e) => {
                    tracing::error!(identity, error = %e, "unlink failed");
                    "Something went wrong. Try again shortly.".to_string()
                }
            };
            if let Err(e) = handle.message_session(identity.clone(), format!("{prefix}{text}")) {
                tracing::warn!(identity, error = %e, "unlink result message dropped");
            }
        });
    }

    fn cmd_money(&mut self, identity: &str) {
        let Some(profiles) = self.profiles() else {
            self.reply(identity, "Balances are unavailable right now.");
            return;
        };
        // Cache read only; safe on the loop.
        match profiles.get(identity) {
            Some(profile) => {
                let text = format!("Balance: {}", format_balance(profile.balance));
                self.reply(identity, &text);
            }
            None => self.reply(identity, "No profile loaded yet."),
        }
    }

    // ========================================================================
    // OPERATOR COMMANDS
    // ========================================================================

    fn cmd_bridge(&mut self, rest: &[&str]) -> CoreResult<()> {
        match rest {
            ["reload"] => {
                tracing::info!("bridge reload requested");
                self.reload_requested.store(true, Ordering::Release);
                Ok(())
            }
            ["sync", identity] => {
                let Some(profiles) = self.profiles() else {
                    return Err(CoreError::CommandRejected(
                        "profiles module is not enabled".to_string(),
                    ));
                };
                let identity = (*identity).to_string();
                std::thread::spawn(move || {
                    if profiles.refresh(&identity) {
                        tracing::info!(identity, "profile resynced");
                    } else {
                        tracing::warn!(identity, "sync requested for an inactive session");
                    }
                });
                Ok(())
            }
            ["rescan", identity] => {
                let Some(entry) = self.sessions.get(*identity) else {
                    return Err(CoreError::CommandRejected(format!(
                        "no active session {identity}"
                    )));
                };
                self.spawn_scan((*identity).to_string(), entry.held_items.clone());
                Ok(())
            }
            _ => Err(CoreError::CommandRejected(
                "usage: bridge reload|sync <session>|rescan <session>".to_string(),
            )),
        }
    }

    fn spawn_scan(&self, identity: String, held_items: Vec<u32>) {
        let Some(scanner) = self.scanner() else {
            tracing::warn!(identity, "cosmetic scan skipped, scanner module is down");
            return;
        };
        let profiles = self.profiles();
        std::thread::spawn(move || {
            match scanner.scan_and_sync(&identity, &held_items) {
                Ok(tether_profile::ScanOutcome::Updated(_)) => {
                    if let Some(profiles) = profiles {
                        profiles.refresh(&identity);
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(identity, error = %e, "cosmetic scan failed"),
            }
        });
    }

    fn cmd_session(&mut self, rest: &[&str]) -> CoreResult<()> {
        match rest {
            ["join", identity, name] => {
                let Some(profiles) = self.profiles() else {
                    // No profile module: admit directly, nothing to preload.
                    self.admit_session(identity, name);
                    return Ok(());
                };
                let identity = (*identity).to_string();
                let name = (*name).to_string();
                let handle = self.loop_handle.clone();
                // Profile load runs off the loop; the roster insert is
                // scheduled only once the cache entry is published.
                std::thread::spawn(move || {
                    profiles.on_session_pre_admission(&identity, &name);
                    let id = identity.clone();
                    let result = handle.schedule_fn(move |host| host.admit_session(&id, &name));
                    if let Err(e) = result {
                        tracing::error!(identity, error = %e, "session admission dropped");
                        profiles.on_session_end(&identity);
                    }
                });
                Ok(())
            }
            ["quit", identity] => {
                self.end_session(identity);
                Ok(())
            }
            _ => Err(CoreError::CommandRejected(
                "usage: session join <identity> <name>|quit <identity>".to_string(),
            )),
        }
    }

    fn cmd_grant(&mut self, rest: &[&str]) -> CoreResult<()> {
        let [identity, item] = rest else {
            return Err(CoreError::CommandRejected(
                "usage: grant <session> <model-id>".to_string(),
            ));
        };
        let model_id: u32 = item
            .parse()
            .map_err(|_| CoreError::CommandRejected(format!("bad model id {item}")))?;
        let Some(entry) = self.sessions.get_mut(*identity) else {
            return Err(CoreError::CommandRejected(format!(
                "no active session {identity}"
            )));
        };
        entry.held_items.push(model_id);
        Ok(())
    }
}

impl SimHost for BridgeHost {
    fn dispatch_command(&mut self, line: &str) -> CoreResult<()> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.split_first() {
            None => Err(CoreError::CommandRejected("empty command".to_string())),
            Some((&"bridge", rest)) => self.cmd_bridge(rest),
            Some((&"session", rest)) => self.cmd_session(rest),
            Some((&"grant", rest)) => self.cmd_grant(rest),
            Some((&"say", rest)) => {
                let message = rest.join(" ");
                self.broadcast(&message);
                Ok(())
            }
            Some(_) => {
                // Any other line belongs to the simulation proper; the
                // stand-in just records it.
                tracing::info!(command = %line, "simulation command executed");
                self.executed.push(line.to_string());
                Ok(())
            }
        }
    }

    fn broadcast(&mut self, message: &str) {
        tracing::info!(%message, "broadcast");
        self.deliveries.push(Delivery::Broadcast(message.to_string()));
    }

    fn message_session(&mut self, identity: &str, message: &str) {
        if !self.sessions.contains_key(identity) {
            tracing::debug!(identity, %message, "message for inactive session dropped");
            return;
        }
        tracing::info!(identity, %message, "message delivered");
        self.deliveries.push(Delivery::Direct {
            identity: identity.to_string(),
            message: message.to_string(),
        });
    }

    fn admit_session(&mut self, identity: &str, display_name: &str) {
        tracing::info!(identity, display_name, "session admitted");
        let held_items = Vec::new();
        self.sessions.insert(
            identity.to_string(),
            SessionEntry {
                display_name: display_name.to_string(),
                held_items: held_items.clone(),
            },
        );
        // Admission-time cosmetic scan; rescan picks up later grants.
        self.spawn_scan(identity.to_string(), held_items);
    }

    fn end_session(&mut self, identity: &str) {
        if self.sessions.remove(identity).is_none() {
            tracing::debug!(identity, "session end for unknown identity");
            return;
        }
        tracing::info!(identity, "session ended");
        if let Some(profiles) = self.profiles() {
            let identity = identity.to_string();
            // Flush is best-effort and off the loop.
            std::thread::spawn(move || profiles.on_session_end(&identity));
        }
    }
}

/// Formats a balance with thousands separators.
#[must_use]
pub fn format_balance(balance: i64) -> String {
    let negative = balance < 0;
    let digits = balance.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    if negative {
        format!("-{out}")
    } else {
        out
    }
}
