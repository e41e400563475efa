//! # Ledger Balance Mirror
//!
//! Read-through access to the external economy ledger, a separate SQLite
//! database owned by another process and configured for single-writer
//! access. The bridge only ever reads it; balances are denormalized into
//! `linked_accounts.balance_mirror` and into session profiles.

use crate::error::{StoreError, StoreResult};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::Path;
use std::time::Duration;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(3);

/// Read-only view of the ledger's `accounts` table.
#[derive(Debug)]
pub struct BalanceMirror {
    conn: Mutex<Connection>,
}

impl BalanceMirror {
    /// Opens the ledger read-only. Fails if the file does not exist - the
    /// ledger belongs to another system and is never created here.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory ledger with a populated `accounts` table. Test use.
    pub fn open_in_memory_with(rows: &[(&str, i64)]) -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "CREATE TABLE accounts (player_name TEXT PRIMARY KEY, balance INTEGER NOT NULL)",
        )?;
        for (name, balance) in rows {
            conn.execute(
                "INSERT INTO accounts (player_name, balance) VALUES (?1, ?2)",
                params![name, balance],
            )?;
        }
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Looks up the balance for a display name. `None` if the ledger has no
    /// account for it.
    pub fn balance_for(&self, player_name: &str) -> StoreResult<Option<i64>> {
        let guard = self
            .conn
            .try_lock_for(ACQUIRE_TIMEOUT)
            .ok_or(StoreError::Busy)?;
        Ok(guard
            .query_row(
                "SELECT balance FROM accounts WHERE player_name = ?1",
                params![player_name],
                |row| row.get(0),
            )
            .optional()?)
    }
}
