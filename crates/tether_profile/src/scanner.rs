//! # Cosmetic Tier Scanner
//!
//! Maps cosmetic model ids held by a session to named unlock tiers and
//! merges them into the linked account's stored tier set. Tiers only ever
//! accumulate; a scan that finds fewer items never revokes anything.

use crate::profile::split_tiers;
use std::collections::HashMap;
use std::sync::Arc;
use tether_store::{LinkStore, StoreResult};

/// What a scan did to the stored tier set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScanOutcome {
    /// The identity has no linked-account row; nothing to merge into.
    NoAccount,
    /// The scan found no tiers beyond those already stored.
    Unchanged(Vec<String>),
    /// New tiers were merged and written back.
    Updated(Vec<String>),
}

/// Classifies cosmetic model ids into tiers and syncs them to the store.
pub struct CosmeticScanner {
    store: Arc<LinkStore>,
    tiers: HashMap<u32, String>,
}

impl CosmeticScanner {
    /// Builds the scanner from the configured model-id -> tier table.
    ///
    /// Keys that do not parse as model ids are logged and skipped rather
    /// than failing startup.
    #[must_use]
    pub fn from_config(store: Arc<LinkStore>, items: &HashMap<String, String>) -> Self {
        let mut tiers = HashMap::new();
        for (key, tier) in items {
            match key.trim().parse::<u32>() {
                Ok(model_id) => {
                    tiers.insert(model_id, tier.clone());
                }
                Err(_) => {
                    tracing::warn!(key, tier, "ignoring cosmetic entry with non-numeric model id");
                }
            }
        }
        Self { store, tiers }
    }

    /// Number of configured model-id mappings.
    #[must_use]
    pub fn mapping_count(&self) -> usize {
        self.tiers.len()
    }

    /// The tier a model id unlocks, if it is mapped.
    #[must_use]
    pub fn classify(&self, model_id: u32) -> Option<&str> {
        self.tiers.get(&model_id).map(String::as_str)
    }

    /// Scans the model ids a session currently holds and merges the tiers
    /// they unlock into the account's stored set.
    pub fn scan_and_sync(&self, identity: &str, model_ids: &[u32]) -> StoreResult<ScanOutcome> {
        let Some(row) = self.store.account(identity)? else {
            return Ok(ScanOutcome::NoAccount);
        };

        let mut merged = row
            .unlocked_tiers
            .as_deref()
            .map(split_tiers)
            .unwrap_or_default();
        let mut added = 0usize;
        for id in model_ids {
            if let Some(tier) = self.classify(*id) {
                if !merged.iter().any(|t| t == tier) {
                    merged.push(tier.to_string());
                    added += 1;
                }
            }
        }

        if added == 0 {
            return Ok(ScanOutcome::Unchanged(merged));
        }
        self.store.set_unlocked_tiers(identity, &merged.join(","))?;
        tracing::info!(identity, added, tiers = ?merged, "cosmetic tiers synced");
        Ok(ScanOutcome::Updated(merged))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_store::{LinkCodeRow, SourceKind};

    fn store_with_link(identity: &str) -> Arc<LinkStore> {
        let store = Arc::new(LinkStore::open_in_memory().unwrap());
        store
            .upsert_code(&LinkCodeRow {
                code: "CHATCD".to_string(),
                source: SourceKind::Chat,
                source_identity: "c1".to_string(),
                display_name: "Tester".to_string(),
                expires_at: 10_000,
            })
            .unwrap();
        store
            .apply_redemption("CHATCD", identity, "Tester", SourceKind::Chat, "c1", 100)
            .unwrap();
        store
    }

    fn config(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn bad_config_keys_are_skipped() {
        let store = Arc::new(LinkStore::open_in_memory().unwrap());
        let scanner = CosmeticScanner::from_config(
            store,
            &config(&[("1001", "bronze"), ("oops", "silver"), (" 1002 ", "gold")]),
        );
        assert_eq!(scanner.mapping_count(), 2);
        assert_eq!(scanner.classify(1001), Some("bronze"));
        assert_eq!(scanner.classify(1002), Some("gold"));
        assert_eq!(scanner.classify(9999), None);
    }

    #[test]
    fn scan_merges_new_tiers_without_duplicates() {
        let store = store_with_link("u1");
        store.set_unlocked_tiers("u1", "bronze").unwrap();
        let scanner = CosmeticScanner::from_config(
            Arc::clone(&store),
            &config(&[("1001", "bronze"), ("1002", "silver")]),
        );

        let outcome = scanner.scan_and_sync("u1", &[1001, 1002, 1002, 42]).unwrap();
        assert_eq!(
            outcome,
            ScanOutcome::Updated(vec!["bronze".to_string(), "silver".to_string()])
        );
        assert_eq!(
            store.account("u1").unwrap().unwrap().unlocked_tiers.as_deref(),
            Some("bronze,silver")
        );
    }

    #[test]
    fn scan_never_revokes_stored_tiers() {
        let store = store_with_link("u1");
        store.set_unlocked_tiers("u1", "gold").unwrap();
        let scanner =
            CosmeticScanner::from_config(Arc::clone(&store), &config(&[("1001", "bronze")]));

        // Session holds nothing mapped; gold stays.
        let outcome = scanner.scan_and_sync("u1", &[]).unwrap();
        assert_eq!(outcome, ScanOutcome::Unchanged(vec!["gold".to_string()]));
        assert_eq!(
            store.account("u1").unwrap().unwrap().unlocked_tiers.as_deref(),
            Some("gold")
        );
    }

    #[test]
    fn unlinked_identity_is_skipped() {
        let store = Arc::new(LinkStore::open_in_memory().unwrap());
        let scanner = CosmeticScanner::from_config(store, &config(&[("1001", "bronze")]));
        assert_eq!(
            scanner.scan_and_sync("ghost", &[1001]).unwrap(),
            ScanOutcome::NoAccount
        );
    }
}
