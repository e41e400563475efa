//! # Link Store
//!
//! One SQLite connection behind a timed mutex. Schema is created on open.
//! All methods take `&self` and may be called from any background context;
//! nothing here ever runs on the authoritative loop.

use crate::error::{StoreError, StoreResult};
use crate::types::{
    LinkCodeRow, LinkedAccountRow, PresenceStatus, RelayCommandRow, SourceKind,
};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::time::Duration;

/// How long to wait for the connection before reporting [`StoreError::Busy`].
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(3);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS link_codes (
    code            TEXT PRIMARY KEY,
    source          TEXT NOT NULL,
    source_identity TEXT NOT NULL,
    display_name    TEXT NOT NULL DEFAULT '',
    expires_at      INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS linked_accounts (
    simulation_identity TEXT PRIMARY KEY,
    display_name        TEXT,
    chat_identity       TEXT UNIQUE,
    web_identity        TEXT UNIQUE,
    unlocked_tiers      TEXT,
    balance_mirror      INTEGER NOT NULL DEFAULT 0,
    linked_at           INTEGER
);

CREATE TABLE IF NOT EXISTS relay_commands (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    command_text TEXT NOT NULL,
    created_at   INTEGER NOT NULL,
    consumed     INTEGER NOT NULL DEFAULT 0,
    consumed_at  INTEGER
);

CREATE TABLE IF NOT EXISTS session_presence (
    identity    TEXT PRIMARY KEY,
    name        TEXT,
    status      TEXT NOT NULL,
    server_id   TEXT,
    last_update INTEGER NOT NULL
);
";

/// The shared relational store for all bridge components.
pub struct LinkStore {
    conn: Mutex<Connection>,
}

impl LinkStore {
    /// Opens (creating if needed) the store at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Opens an in-memory store. Test use.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Runs a closure against the connection, with the acquisition timeout.
    fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, rusqlite::Error>,
    ) -> StoreResult<T> {
        let mut guard = self.conn.try_lock_for(ACQUIRE_TIMEOUT).ok_or_else(|| {
            tracing::warn!("link store connection acquisition timed out");
            StoreError::Busy
        })?;
        Ok(f(&mut guard)?)
    }

    // ========================================================================
    // LINK CODES
    // ========================================================================

    /// Inserts a code, superseding any live code for the same
    /// (source, source identity) pair.
    pub fn upsert_code(&self, row: &LinkCodeRow) -> StoreResult<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM link_codes WHERE source = ?1 AND source_identity = ?2",
                params![row.source.as_str(), row.source_identity],
            )?;
            tx.execute(
                "INSERT INTO link_codes (code, source, source_identity, display_name, expires_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    row.code,
                    row.source.as_str(),
                    row.source_identity,
                    row.display_name,
                    row.expires_at
                ],
            )?;
            tx.commit()
        })
    }

    /// Looks a code up by value.
    pub fn find_code(&self, code: &str) -> StoreResult<Option<LinkCodeRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT code, source, source_identity, display_name, expires_at \
                 FROM link_codes WHERE code = ?1",
                params![code],
                map_code_row,
            )
            .optional()
        })
    }

    /// Deletes one code. Returns whether it existed.
    pub fn delete_code(&self, code: &str) -> StoreResult<bool> {
        let changed = self.with_conn(|conn| {
            conn.execute("DELETE FROM link_codes WHERE code = ?1", params![code])
        })?;
        Ok(changed > 0)
    }

    /// Deletes every code past its expiry. Returns how many were removed.
    pub fn delete_expired_codes(&self, now_ms: i64) -> StoreResult<usize> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM link_codes WHERE expires_at < ?1",
                params![now_ms],
            )
        })
    }

    // ========================================================================
    // LINKED ACCOUNTS
    // ========================================================================

    /// Fetches the linked-account row for a simulation identity.
    pub fn account(&self, simulation_identity: &str) -> StoreResult<Option<LinkedAccountRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT simulation_identity, display_name, chat_identity, web_identity, \
                        unlocked_tiers, balance_mirror \
                 FROM linked_accounts WHERE simulation_identity = ?1",
                params![simulation_identity],
                map_account_row,
            )
            .optional()
        })
    }

    /// Fetches the row currently holding the given external identity, if any.
    pub fn account_by_slot(
        &self,
        source: SourceKind,
        external_identity: &str,
    ) -> StoreResult<Option<LinkedAccountRow>> {
        let Some(column) = source.slot_column() else {
            return Ok(None);
        };
        self.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "SELECT simulation_identity, display_name, chat_identity, web_identity, \
                            unlocked_tiers, balance_mirror \
                     FROM linked_accounts WHERE {column} = ?1"
                ),
                params![external_identity],
                map_account_row,
            )
            .optional()
        })
    }

    /// Applies a successful redemption in one transaction:
    ///
    /// 1. clear the slot on any other row holding this external identity;
    /// 2. clear the slot on the requester's own row if it differs;
    /// 3. upsert the requester's row with the new external identity;
    /// 4. purge rows left with no external identities and no meaningful state;
    /// 5. delete the consumed code.
    ///
    /// Step ordering matters: a crash between steps yields at most a harmless
    /// duplicate clear, never a duplicate claim - and the transaction makes
    /// even that window unobservable.
    pub fn apply_redemption(
        &self,
        code: &str,
        simulation_identity: &str,
        display_name: &str,
        source: SourceKind,
        external_identity: &str,
        now_ms: i64,
    ) -> StoreResult<()> {
        let Some(column) = source.slot_column() else {
            // Simulation-sourced codes never bind a slot on this side.
            return Err(StoreError::NotFound);
        };
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                &format!(
                    "UPDATE linked_accounts SET {column} = NULL \
                     WHERE {column} = ?1 AND simulation_identity <> ?2"
                ),
                params![external_identity, simulation_identity],
            )?;
            tx.execute(
                &format!(
                    "UPDATE linked_accounts SET {column} = NULL \
                     WHERE simulation_identity = ?1 AND {column} IS NOT NULL AND {column} <> ?2"
                ),
                params![simulation_identity, external_identity],
            )?;
            tx.execute(
                &format!(
                    "INSERT INTO linked_accounts \
                         (simulation_identity, display_name, {column}, linked_at) \
                     VALUES (?1, ?2, ?3, ?4) \
                     ON CONFLICT(simulation_identity) DO UPDATE SET \
                         display_name = excluded.display_name, \
                         {column} = excluded.{column}, \
                         linked_at = excluded.linked_at"
                ),
                params![simulation_identity, display_name, external_identity, now_ms],
            )?;
            tx.execute(
                "DELETE FROM linked_accounts \
                 WHERE chat_identity IS NULL AND web_identity IS NULL \
                   AND (unlocked_tiers IS NULL OR unlocked_tiers = '') \
                   AND balance_mirror = 0",
                [],
            )?;
            tx.execute("DELETE FROM link_codes WHERE code = ?1", params![code])?;
            tx.commit()
        })
    }

    /// Clears one external-identity slot. Returns whether a link existed.
    ///
    /// A row left fully empty (no slots, no tiers, no balance) is purged.
    pub fn clear_slot(&self, simulation_identity: &str, source: SourceKind) -> StoreResult<bool> {
        let Some(column) = source.slot_column() else {
            return Ok(false);
        };
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                &format!(
                    "UPDATE linked_accounts SET {column} = NULL \
                     WHERE simulation_identity = ?1 AND {column} IS NOT NULL"
                ),
                params![simulation_identity],
            )?;
            tx.execute(
                "DELETE FROM linked_accounts \
                 WHERE simulation_identity = ?1 \
                   AND chat_identity IS NULL AND web_identity IS NULL \
                   AND (unlocked_tiers IS NULL OR unlocked_tiers = '') \
                   AND balance_mirror = 0",
                params![simulation_identity],
            )?;
            tx.commit()?;
            Ok(changed > 0)
        })
    }

    /// Replaces the unlocked-tiers set for an account. No-op if the identity
    /// has no row. Returns whether a row was updated.
    pub fn set_unlocked_tiers(&self, simulation_identity: &str, tiers: &str) -> StoreResult<bool> {
        let changed = self.with_conn(|conn| {
            conn.execute(
                "UPDATE linked_accounts SET unlocked_tiers = ?1 WHERE simulation_identity = ?2",
                params![tiers, simulation_identity],
            )
        })?;
        Ok(changed > 0)
    }

    /// Writes the denormalized balance mirror for an account, if it exists.
    pub fn set_balance_mirror(&self, simulation_identity: &str, balance: i64) -> StoreResult<bool> {
        let changed = self.with_conn(|conn| {
            conn.execute(
                "UPDATE linked_accounts SET balance_mirror = ?1 WHERE simulation_identity = ?2",
                params![balance, simulation_identity],
            )
        })?;
        Ok(changed > 0)
    }

    // ========================================================================
    // RELAY COMMANDS
    // ========================================================================

    /// Inserts a command row. External systems normally do this directly;
    /// the bridge itself only inserts in tests and tooling.
    pub fn enqueue_command(&self, command_text: &str, created_at: i64) -> StoreResult<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO relay_commands (command_text, created_at) VALUES (?1, ?2)",
                params![command_text, created_at],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Selects up to `limit` unconsumed commands, oldest first.
    pub fn pending_commands(&self, limit: usize) -> StoreResult<Vec<RelayCommandRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, command_text, created_at, consumed, consumed_at \
                 FROM relay_commands WHERE consumed = 0 \
                 ORDER BY created_at ASC, id ASC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit as i64], map_command_row)?;
            rows.collect()
        })
    }

    /// Marks a command consumed. Idempotent: marking an already-consumed row
    /// again is a no-op, not an error. Returns whether this call flipped it.
    pub fn mark_consumed(&self, id: i64, now_ms: i64) -> StoreResult<bool> {
        let changed = self.with_conn(|conn| {
            conn.execute(
                "UPDATE relay_commands SET consumed = 1, consumed_at = ?1 \
                 WHERE id = ?2 AND consumed = 0",
                params![now_ms, id],
            )
        })?;
        Ok(changed > 0)
    }

    /// Fetches one command row by id. Test and tooling use.
    pub fn command(&self, id: i64) -> StoreResult<Option<RelayCommandRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, command_text, created_at, consumed, consumed_at \
                 FROM relay_commands WHERE id = ?1",
                params![id],
                map_command_row,
            )
            .optional()
        })
    }

    // ========================================================================
    // SESSION PRESENCE
    // ========================================================================

    /// Upserts a session's presence row.
    pub fn set_presence(
        &self,
        identity: &str,
        name: &str,
        status: PresenceStatus,
        server_id: &str,
        now_ms: i64,
    ) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO session_presence (identity, name, status, server_id, last_update) \
                 VALUES (?1, ?2, ?3, ?4, ?5) \
                 ON CONFLICT(identity) DO UPDATE SET \
                     name = excluded.name, status = excluded.status, \
                     server_id = excluded.server_id, last_update = excluded.last_update",
                params![identity, name, status.as_str(), server_id, now_ms],
            )?;
            Ok(())
        })
    }

    /// Reads back a presence status. Test and tooling use.
    pub fn presence(&self, identity: &str) -> StoreResult<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT status FROM session_presence WHERE identity = ?1",
                params![identity],
                |row| row.get(0),
            )
            .optional()
        })
    }
}

fn map_code_row(row: &Row<'_>) -> Result<LinkCodeRow, rusqlite::Error> {
    let source_text: String = row.get(1)?;
    let source = SourceKind::parse(&source_text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            format!("unknown source kind: {source_text}").into(),
        )
    })?;
    Ok(LinkCodeRow {
        code: row.get(0)?,
        source,
        source_identity: row.get(2)?,
        display_name: row.get(3)?,
        expires_at: row.get(4)?,
    })
}

fn map_account_row(row: &Row<'_>) -> Result<LinkedAccountRow, rusqlite::Error> {
    Ok(LinkedAccountRow {
        simulation_identity: row.get(0)?,
        display_name: row.get(1)?,
        chat_identity: row.get(2)?,
        web_identity: row.get(3)?,
        unlocked_tiers: row.get(4)?,
        balance_mirror: row.get(5)?,
    })
}

fn map_command_row(row: &Row<'_>) -> Result<RelayCommandRow, rusqlite::Error> {
    Ok(RelayCommandRow {
        id: row.get(0)?,
        command_text: row.get(1)?,
        created_at: row.get(2)?,
        consumed: row.get(3)?,
        consumed_at: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code_row(code: &str, source: SourceKind, source_identity: &str, expires_at: i64) -> LinkCodeRow {
        LinkCodeRow {
            code: code.to_string(),
            source,
            source_identity: source_identity.to_string(),
            display_name: "Tester".to_string(),
            expires_at,
        }
    }

    #[test]
    fn upsert_code_supersedes_prior_issuance() {
        let store = LinkStore::open_in_memory().unwrap();
        store
            .upsert_code(&code_row("AAAAAA", SourceKind::Chat, "c1", 1_000))
            .unwrap();
        store
            .upsert_code(&code_row("BBBBBB", SourceKind::Chat, "c1", 2_000))
            .unwrap();

        // The prior code for the same (source, identity) is gone.
        assert!(store.find_code("AAAAAA").unwrap().is_none());
        let live = store.find_code("BBBBBB").unwrap().unwrap();
        assert_eq!(live.expires_at, 2_000);

        // A different identity on the same source is untouched.
        store
            .upsert_code(&code_row("CCCCCC", SourceKind::Chat, "c2", 3_000))
            .unwrap();
        assert!(store.find_code("BBBBBB").unwrap().is_some());
    }

    #[test]
    fn expired_sweep_only_removes_past_expiry() {
        let store = LinkStore::open_in_memory().unwrap();
        store
            .upsert_code(&code_row("OLDOLD", SourceKind::Web, "w1", 500))
            .unwrap();
        store
            .upsert_code(&code_row("LIVELY", SourceKind::Chat, "c1", 5_000))
            .unwrap();

        assert_eq!(store.delete_expired_codes(1_000).unwrap(), 1);
        assert!(store.find_code("OLDOLD").unwrap().is_none());
        assert!(store.find_code("LIVELY").unwrap().is_some());
    }

    #[test]
    fn redemption_claims_slot_exclusively() {
        let store = LinkStore::open_in_memory().unwrap();

        // u1 holds chat identity c1.
        store
            .upsert_code(&code_row("ONEONE", SourceKind::Chat, "c1", 10_000))
            .unwrap();
        store
            .apply_redemption("ONEONE", "u1", "PlayerOne", SourceKind::Chat, "c1", 100)
            .unwrap();
        assert_eq!(
            store.account("u1").unwrap().unwrap().chat_identity.as_deref(),
            Some("c1")
        );

        // u2 redeems a fresh code for the same chat identity.
        store
            .upsert_code(&code_row("TWOTWO", SourceKind::Chat, "c1", 10_000))
            .unwrap();
        store
            .apply_redemption("TWOTWO", "u2", "PlayerTwo", SourceKind::Chat, "c1", 200)
            .unwrap();

        // u1 lost the slot (and, having nothing else, the row), u2 owns it.
        assert!(store.account("u1").unwrap().is_none());
        let u2 = store.account("u2").unwrap().unwrap();
        assert_eq!(u2.chat_identity.as_deref(), Some("c1"));

        // The code is consumed.
        assert!(store.find_code("TWOTWO").unwrap().is_none());
    }

    #[test]
    fn redemption_replaces_own_prior_link_of_same_source() {
        let store = LinkStore::open_in_memory().unwrap();
        store
            .upsert_code(&code_row("FIRSTC", SourceKind::Web, "w-old", 10_000))
            .unwrap();
        store
            .apply_redemption("FIRSTC", "u1", "PlayerOne", SourceKind::Web, "w-old", 100)
            .unwrap();

        store
            .upsert_code(&code_row("SECOND", SourceKind::Web, "w-new", 10_000))
            .unwrap();
        store
            .apply_redemption("SECOND", "u1", "PlayerOne", SourceKind::Web, "w-new", 200)
            .unwrap();

        let u1 = store.account("u1").unwrap().unwrap();
        assert_eq!(u1.web_identity.as_deref(), Some("w-new"));
        assert!(store.account_by_slot(SourceKind::Web, "w-old").unwrap().is_none());
    }

    #[test]
    fn redemption_keeps_other_source_slots() {
        let store = LinkStore::open_in_memory().unwrap();
        store
            .upsert_code(&code_row("CHATCD", SourceKind::Chat, "c1", 10_000))
            .unwrap();
        store
            .apply_redemption("CHATCD", "u1", "PlayerOne", SourceKind::Chat, "c1", 100)
            .unwrap();
        store
            .upsert_code(&code_row("WEBWEB", SourceKind::Web, "w1", 10_000))
            .unwrap();
        store
            .apply_redemption("WEBWEB", "u1", "PlayerOne", SourceKind::Web, "w1", 200)
            .unwrap();

        let u1 = store.account("u1").unwrap().unwrap();
        assert_eq!(u1.chat_identity.as_deref(), Some("c1"));
        assert_eq!(u1.web_identity.as_deref(), Some("w1"));
    }

    #[test]
    fn clear_slot_reports_and_purges() {
        let store = LinkStore::open_in_memory().unwrap();

        // Nothing to unlink yet.
        assert!(!store.clear_slot("u1", SourceKind::Chat).unwrap());

        store
            .upsert_code(&code_row("CHATCD", SourceKind::Chat, "c1", 10_000))
            .unwrap();
        store
            .apply_redemption("CHATCD", "u1", "PlayerOne", SourceKind::Chat, "c1", 100)
            .unwrap();

        assert!(store.clear_slot("u1", SourceKind::Chat).unwrap());
        // The row had nothing else, so it is gone entirely.
        assert!(store.account("u1").unwrap().is_none());
    }

    #[test]
    fn clear_slot_keeps_row_with_remaining_state() {
        let store = LinkStore::open_in_memory().unwrap();
        store
            .upsert_code(&code_row("CHATCD", SourceKind::Chat, "c1", 10_000))
            .unwrap();
        store
            .apply_redemption("CHATCD", "u1", "PlayerOne", SourceKind::Chat, "c1", 100)
            .unwrap();
        store
            .upsert_code(&code_row("WEBWEB", SourceKind::Web, "w1", 10_000))
            .unwrap();
        store
            .apply_redemption("WEBWEB", "u1", "PlayerOne", SourceKind::Web, "w1", 200)
            .unwrap();

        assert!(store.clear_slot("u1", SourceKind::Chat).unwrap());
        let u1 = store.account("u1").unwrap().unwrap();
        assert!(u1.chat_identity.is_none());
        assert_eq!(u1.web_identity.as_deref(), Some("w1"));
    }

    #[test]
    fn relay_selection_is_oldest_first_and_skips_consumed() {
        let store = LinkStore::open_in_memory().unwrap();
        let a = store.enqueue_command("say one", 100).unwrap();
        let b = store.enqueue_command("say two", 200).unwrap();
        let c = store.enqueue_command("say three", 300).unwrap();

        let batch = store.pending_commands(5).unwrap();
        assert_eq!(
            batch.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![a, b, c]
        );

        assert!(store.mark_consumed(b, 400).unwrap());
        let batch = store.pending_commands(5).unwrap();
        assert_eq!(batch.iter().map(|r| r.id).collect::<Vec<_>>(), vec![a, c]);

        // Batch size limits selection.
        let batch = store.pending_commands(1).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, a);
    }

    #[test]
    fn mark_consumed_is_idempotent() {
        let store = LinkStore::open_in_memory().unwrap();
        let id = store.enqueue_command("say hi", 100).unwrap();

        assert!(store.mark_consumed(id, 200).unwrap());
        // Second mark is a no-op, not an error, and keeps the first timestamp.
        assert!(!store.mark_consumed(id, 999).unwrap());

        let row = store.command(id).unwrap().unwrap();
        assert!(row.consumed);
        assert_eq!(row.consumed_at, Some(200));
    }

    #[test]
    fn presence_upsert_replaces_status() {
        let store = LinkStore::open_in_memory().unwrap();
        store
            .set_presence("u1", "PlayerOne", PresenceStatus::Online, "survival", 100)
            .unwrap();
        assert_eq!(store.presence("u1").unwrap().as_deref(), Some("ONLINE"));
        store
            .set_presence("u1", "PlayerOne", PresenceStatus::Offline, "survival", 200)
            .unwrap();
        assert_eq!(store.presence("u1").unwrap().as_deref(), Some("OFFLINE"));
    }
}
