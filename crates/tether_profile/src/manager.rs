//! # Profile Manager
//!
//! Session lifecycle glue around the cache. `on_session_pre_admission` runs
//! off the authoritative loop, before the session is admitted, so the cache
//! hit is guaranteed by the time any loop-side code looks the profile up.

use crate::cache::ProfileCache;
use crate::profile::SessionProfile;
use std::sync::Arc;
use tether_store::{now_millis, BalanceMirror, LinkStore, PresenceStatus};

/// Loads, publishes and flushes session profiles around session lifecycle
/// events.
pub struct ProfileManager {
    store: Arc<LinkStore>,
    mirror: Option<Arc<BalanceMirror>>,
    cache: Arc<ProfileCache>,
    server_id: String,
}

impl ProfileManager {
    /// Creates a manager. The ledger mirror is optional; without it every
    /// profile carries a zero balance.
    #[must_use]
    pub fn new(
        store: Arc<LinkStore>,
        mirror: Option<Arc<BalanceMirror>>,
        cache: Arc<ProfileCache>,
        server_id: &str,
    ) -> Self {
        Self {
            store,
            mirror,
            cache,
            server_id: server_id.to_string(),
        }
    }

    /// The cache this manager publishes into.
    #[must_use]
    pub fn cache(&self) -> &Arc<ProfileCache> {
        &self.cache
    }

    /// Builds and publishes the profile for an incoming session.
    ///
    /// This never blocks admission: any store or ledger failure is logged
    /// and the affected fields stay at their defaults, so the session still
    /// gets a (possibly unlinked, zero-balance) profile.
    pub fn on_session_pre_admission(&self, identity: &str, display_name: &str) {
        let profile = self.load(identity, display_name);

        // Persist what we derived before the session is visible.
        if profile.linked {
            if let Err(e) = self.store.set_balance_mirror(identity, profile.balance) {
                tracing::warn!(identity, error = %e, "balance mirror write failed on admission");
            }
        }
        if let Err(e) = self.store.set_presence(
            identity,
            display_name,
            PresenceStatus::Online,
            &self.server_id,
            now_millis(),
        ) {
            tracing::warn!(identity, error = %e, "presence write failed on admission");
        }

        self.cache.publish(profile);
        tracing::debug!(identity, display_name, "session profile published");
    }

    /// Clone of the published profile, if the session is active.
    #[must_use]
    pub fn get(&self, identity: &str) -> Option<SessionProfile> {
        self.cache.get(identity)
    }

    /// Removes the profile for a departing session and flushes its final
    /// state. Flush failures are logged; the removal always happens.
    pub fn on_session_end(&self, identity: &str) {
        let Some(profile) = self.cache.remove(identity) else {
            tracing::debug!(identity, "session ended with no published profile");
            return;
        };

        if profile.linked {
            if let Err(e) = self.store.set_balance_mirror(identity, profile.balance) {
                tracing::warn!(identity, error = %e, "balance mirror write failed on departure");
            }
        }
        if let Err(e) = self.store.set_presence(
            identity,
            &profile.display_name,
            PresenceStatus::Offline,
            &self.server_id,
            now_millis(),
        ) {
            tracing::warn!(identity, error = %e, "presence write failed on departure");
        }
    }

    /// Reloads an active session's profile from the store and ledger, then
    /// replaces the published entry in one step. Sessions without a
    /// published profile are left alone.
    pub fn refresh(&self, identity: &str) -> bool {
        let Some(current) = self.cache.get(identity) else {
            return false;
        };
        let profile = self.load(identity, &current.display_name);
        self.cache.publish(profile);
        true
    }

    fn load(&self, identity: &str, display_name: &str) -> SessionProfile {
        let mut profile = SessionProfile::new(identity, display_name);

        match self.store.account(identity) {
            Ok(Some(row)) => profile.apply_account(&row),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(identity, error = %e, "account lookup failed, using defaults");
            }
        }

        if let Some(mirror) = &self.mirror {
            match mirror.balance_for(display_name) {
                Ok(Some(balance)) => profile.balance = balance,
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(identity, error = %e, "ledger read failed, balance stays 0");
                }
            }
        }

        profile
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_store::{LinkCodeRow, SourceKind};

    fn linked_store(identity: &str, name: &str) -> Arc<LinkStore> {
        let store = Arc::new(LinkStore::open_in_memory().unwrap());
        store
            .upsert_code(&LinkCodeRow {
                code: "CHATCD".to_string(),
                source: SourceKind::Chat,
                source_identity: "c1".to_string(),
                display_name: name.to_string(),
                expires_at: 10_000,
            })
            .unwrap();
        store
            .apply_redemption("CHATCD", identity, name, SourceKind::Chat, "c1", 100)
            .unwrap();
        store
    }

    #[test]
    fn admission_publishes_linked_profile_with_balance() {
        let store = linked_store("u1", "PlayerOne");
        let mirror = Arc::new(BalanceMirror::open_in_memory_with(&[("PlayerOne", 7_500)]).unwrap());
        let manager = ProfileManager::new(
            Arc::clone(&store),
            Some(mirror),
            Arc::new(ProfileCache::new()),
            "survival",
        );

        manager.on_session_pre_admission("u1", "PlayerOne");

        let profile = manager.get("u1").unwrap();
        assert!(profile.linked);
        assert_eq!(profile.chat_identity.as_deref(), Some("c1"));
        assert_eq!(profile.balance, 7_500);

        // Derived state was persisted before the session became visible.
        assert_eq!(store.presence("u1").unwrap().as_deref(), Some("ONLINE"));
        assert_eq!(store.account("u1").unwrap().unwrap().balance_mirror, 7_500);
    }

    #[test]
    fn admission_without_stored_state_still_publishes() {
        let store = Arc::new(LinkStore::open_in_memory().unwrap());
        let manager =
            ProfileManager::new(Arc::clone(&store), None, Arc::new(ProfileCache::new()), "survival");

        manager.on_session_pre_admission("u9", "Drifter");

        let profile = manager.get("u9").unwrap();
        assert!(!profile.linked);
        assert_eq!(profile.balance, 0);
        assert_eq!(store.presence("u9").unwrap().as_deref(), Some("ONLINE"));
    }

    #[test]
    fn session_end_removes_and_flushes() {
        let store = linked_store("u1", "PlayerOne");
        let mirror = Arc::new(BalanceMirror::open_in_memory_with(&[("PlayerOne", 300)]).unwrap());
        let manager = ProfileManager::new(
            Arc::clone(&store),
            Some(mirror),
            Arc::new(ProfileCache::new()),
            "survival",
        );

        manager.on_session_pre_admission("u1", "PlayerOne");
        manager.on_session_end("u1");

        assert!(manager.get("u1").is_none());
        assert_eq!(store.presence("u1").unwrap().as_deref(), Some("OFFLINE"));
        assert_eq!(store.account("u1").unwrap().unwrap().balance_mirror, 300);
    }

    #[test]
    fn refresh_picks_up_new_link_state() {
        let store = Arc::new(LinkStore::open_in_memory().unwrap());
        let manager =
            ProfileManager::new(Arc::clone(&store), None, Arc::new(ProfileCache::new()), "survival");

        manager.on_session_pre_admission("u1", "PlayerOne");
        assert!(!manager.get("u1").unwrap().linked);

        // A link lands while the session is active.
        store
            .upsert_code(&LinkCodeRow {
                code: "WEBWEB".to_string(),
                source: SourceKind::Web,
                source_identity: "w1".to_string(),
                display_name: "PlayerOne".to_string(),
                expires_at: 10_000,
            })
            .unwrap();
        store
            .apply_redemption("WEBWEB", "u1", "PlayerOne", SourceKind::Web, "w1", 100)
            .unwrap();

        assert!(manager.refresh("u1"));
        let profile = manager.get("u1").unwrap();
        assert!(profile.linked);
        assert_eq!(profile.web_identity.as_deref(), Some("w1"));
    }

    #[test]
    fn refresh_of_inactive_session_is_a_no_op() {
        let store = Arc::new(LinkStore::open_in_memory().unwrap());
        let manager =
            ProfileManager::new(store, None, Arc::new(ProfileCache::new()), "survival");
        assert!(!manager.refresh("ghost"));
    }
}
