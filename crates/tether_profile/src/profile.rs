//! # Session Profile

use tether_store::{now_millis, LinkedAccountRow};

/// Ephemeral, process-local view of one active session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionProfile {
    /// Simulation identity of the session.
    pub simulation_identity: String,
    /// Display name the session joined with.
    pub display_name: String,
    /// Whether any external identity is linked.
    pub linked: bool,
    /// Linked chat-platform identity, if any.
    pub chat_identity: Option<String>,
    /// Linked web identity, if any.
    pub web_identity: Option<String>,
    /// Session-scoped economic balance (mirrored from the ledger).
    pub balance: i64,
    /// Unlocked cosmetic tiers.
    pub unlocked_tiers: Vec<String>,
    /// Last-seen timestamp, milliseconds since epoch.
    pub last_seen: i64,
}

impl SessionProfile {
    /// A fresh, unlinked profile for a session with no stored state.
    #[must_use]
    pub fn new(simulation_identity: &str, display_name: &str) -> Self {
        Self {
            simulation_identity: simulation_identity.to_string(),
            display_name: display_name.to_string(),
            linked: false,
            chat_identity: None,
            web_identity: None,
            balance: 0,
            unlocked_tiers: Vec::new(),
            last_seen: now_millis(),
        }
    }

    /// Overlays the stored linked-account row onto this profile.
    pub fn apply_account(&mut self, row: &LinkedAccountRow) {
        self.linked = !row.is_unlinked();
        self.chat_identity = row.chat_identity.clone();
        self.web_identity = row.web_identity.clone();
        self.unlocked_tiers = row
            .unlocked_tiers
            .as_deref()
            .map(split_tiers)
            .unwrap_or_default();
    }
}

/// Splits the comma-separated tier column, dropping empty fragments.
pub(crate) fn split_tiers(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
