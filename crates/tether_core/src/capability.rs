//! # Capability Registry
//!
//! Modules publish typed handles here during enable; collaborators resolve
//! them once at wiring time instead of reaching for global singletons or
//! inspecting the module list at runtime.
//!
//! First registration wins: if two modules publish the same capability type,
//! lookups return the handle registered first.

use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// Type-indexed registry of shared capability handles.
#[derive(Default)]
pub struct CapabilityRegistry {
    entries: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl CapabilityRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a capability handle.
    ///
    /// Returns false (and keeps the existing handle) if the capability type
    /// was already provided.
    pub fn provide<T: Send + Sync + 'static>(&self, value: Arc<T>) -> bool {
        let mut entries = self.entries.write();
        match entries.entry(TypeId::of::<T>()) {
            std::collections::hash_map::Entry::Occupied(_) => {
                tracing::debug!(
                    capability = std::any::type_name::<T>(),
                    "duplicate capability ignored"
                );
                false
            }
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(value);
                true
            }
        }
    }

    /// Resolves a capability handle, if any module has provided it.
    #[must_use]
    pub fn lookup<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        let entries = self.entries.read();
        entries
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|any| any.downcast::<T>().ok())
    }

    /// Removes every published capability. Used on full reload.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}
