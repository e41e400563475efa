//! # Profile Cache
//!
//! The concurrent map itself. No component outside this crate holds a
//! long-lived reference to a profile; reads hand out clones.

use crate::profile::SessionProfile;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Concurrent session-identity -> profile map.
#[derive(Default)]
pub struct ProfileCache {
    inner: RwLock<HashMap<String, SessionProfile>>,
}

impl ProfileCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes (or atomically replaces) a profile.
    pub fn publish(&self, profile: SessionProfile) {
        self.inner
            .write()
            .insert(profile.simulation_identity.clone(), profile);
    }

    /// Non-blocking read; clones the entry out.
    #[must_use]
    pub fn get(&self, identity: &str) -> Option<SessionProfile> {
        self.inner.read().get(identity).cloned()
    }

    /// Removes and returns the entry for a session that ended.
    pub fn remove(&self, identity: &str) -> Option<SessionProfile> {
        self.inner.write().remove(identity)
    }

    /// Mutates an entry in place under the write lock. Returns whether the
    /// entry existed.
    pub fn update<F: FnOnce(&mut SessionProfile)>(&self, identity: &str, f: F) -> bool {
        let mut map = self.inner.write();
        match map.get_mut(identity) {
            Some(profile) => {
                f(profile);
                true
            }
            None => false,
        }
    }

    /// Number of active sessions with a published profile.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether no profiles are published.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Snapshot of the active identities.
    #[must_use]
    pub fn identities(&self) -> Vec<String> {
        self.inner.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn publish_get_remove() {
        let cache = ProfileCache::new();
        assert!(cache.get("u1").is_none());

        cache.publish(SessionProfile::new("u1", "PlayerOne"));
        let profile = cache.get("u1").unwrap();
        assert_eq!(profile.display_name, "PlayerOne");

        let removed = cache.remove("u1").unwrap();
        assert_eq!(removed.simulation_identity, "u1");
        assert!(cache.get("u1").is_none());
    }

    #[test]
    fn publish_replaces_atomically() {
        let cache = ProfileCache::new();
        cache.publish(SessionProfile::new("u1", "PlayerOne"));

        let mut refreshed = SessionProfile::new("u1", "PlayerOne");
        refreshed.linked = true;
        refreshed.balance = 500;
        cache.publish(refreshed);

        let profile = cache.get("u1").unwrap();
        assert!(profile.linked);
        assert_eq!(profile.balance, 500);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn update_reports_presence() {
        let cache = ProfileCache::new();
        assert!(!cache.update("u1", |p| p.balance = 1));

        cache.publish(SessionProfile::new("u1", "PlayerOne"));
        assert!(cache.update("u1", |p| p.balance = 42));
        assert_eq!(cache.get("u1").unwrap().balance, 42);
    }

    #[test]
    fn concurrent_access_from_many_threads() {
        let cache = Arc::new(ProfileCache::new());
        let mut handles = Vec::new();

        for t in 0..8 {
            let cache = Arc::clone(&cache);
            handles.push(std::thread::spawn(move || {
                let id = format!("u{t}");
                for _ in 0..100 {
                    cache.publish(SessionProfile::new(&id, "Player"));
                    let _ = cache.get(&id);
                    cache.update(&id, |p| p.balance += 1);
                    cache.remove(&id);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(cache.is_empty());
    }
}
