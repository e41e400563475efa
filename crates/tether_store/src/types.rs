//! # Store Row Types
//!
//! Plain data mirrored from the persisted schema, plus the source-kind enum
//! that parameterizes identity linking.

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch. Timestamp unit for every table.
#[must_use]
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// An external platform that can claim ownership of a simulation identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// The simulation itself (codes issued in-game, redeemed elsewhere).
    Simulation,
    /// The chat/community platform.
    Chat,
    /// The web dashboard.
    Web,
}

impl SourceKind {
    /// Stable string form used in the `source` column.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Simulation => "simulation",
            Self::Chat => "chat",
            Self::Web => "web",
        }
    }

    /// Parses the string form. Unknown values are `None`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "simulation" => Some(Self::Simulation),
            "chat" => Some(Self::Chat),
            "web" => Some(Self::Web),
            _ => None,
        }
    }

    /// The `linked_accounts` column holding this source's external identity,
    /// or `None` for the simulation itself (the row key is the slot).
    #[must_use]
    pub fn slot_column(self) -> Option<&'static str> {
        match self {
            Self::Simulation => None,
            Self::Chat => Some("chat_identity"),
            Self::Web => Some("web_identity"),
        }
    }
}

/// One row of `link_codes`: a live, unredeemed linking credential.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkCodeRow {
    /// The opaque code value (primary key).
    pub code: String,
    /// Which platform issued it.
    pub source: SourceKind,
    /// The issuing platform's identity for the requester.
    pub source_identity: String,
    /// Display name shown when the code is redeemed.
    pub display_name: String,
    /// Expiry, milliseconds since epoch.
    pub expires_at: i64,
}

/// One row of `linked_accounts`: a permanent cross-system binding.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LinkedAccountRow {
    /// Simulation identity (primary key).
    pub simulation_identity: String,
    /// Last known simulation display name.
    pub display_name: Option<String>,
    /// Linked chat-platform identity, if any.
    pub chat_identity: Option<String>,
    /// Linked web identity, if any.
    pub web_identity: Option<String>,
    /// Comma-separated set of unlocked cosmetic tiers.
    pub unlocked_tiers: Option<String>,
    /// Denormalized balance mirrored from the ledger.
    pub balance_mirror: i64,
}

impl LinkedAccountRow {
    /// The external identity bound for the given source, if any.
    #[must_use]
    pub fn slot(&self, source: SourceKind) -> Option<&str> {
        match source {
            SourceKind::Simulation => Some(&self.simulation_identity),
            SourceKind::Chat => self.chat_identity.as_deref(),
            SourceKind::Web => self.web_identity.as_deref(),
        }
    }

    /// Whether the row holds no external identity at all.
    #[must_use]
    pub fn is_unlinked(&self) -> bool {
        self.chat_identity.is_none() && self.web_identity.is_none()
    }
}

/// One row of `relay_commands`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayCommandRow {
    /// Row identifier.
    pub id: i64,
    /// The command text to execute on the authoritative loop.
    pub command_text: String,
    /// Creation time, milliseconds since epoch.
    pub created_at: i64,
    /// Whether the command has been consumed.
    pub consumed: bool,
    /// When it was consumed, if it was.
    pub consumed_at: Option<i64>,
}

/// Presence state written to `session_presence`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresenceStatus {
    /// Session is active on this server.
    Online,
    /// Session has ended.
    Offline,
}

impl PresenceStatus {
    /// Stable string form used in the `status` column.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Online => "ONLINE",
            Self::Offline => "OFFLINE",
        }
    }
}
