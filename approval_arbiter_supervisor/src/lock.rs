//! TTL-bound named locks over a shared store.
//!
//! Locks are shared with the reviewer UI and with other runner processes, so
//! they live in SQLite rather than in process memory. Semantics:
//! - an expired entry is free
//! - `set_lock` by the current holder refreshes the TTL
//! - `clear_lock` by anyone but the current holder is a no-op
//!
//! Best-effort mutual exclusion, not linearizable: a TTL can lapse while the
//! holder is still working.

use std::path::Path;
use std::time::Duration;

use approval_arbiter_core::PackageId;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use crate::error::LockError;

/// Key of the whole-run lock.
pub const RUN_LOCK_KEY: &str = "auto-approve:run";

/// Key the reviewer UI takes while someone is looking at a package.
pub fn review_lock_key(package_id: PackageId) -> String {
    format!("review:{package_id}")
}

pub trait LockStore {
    /// Current unexpired holder of `key`, if any.
    fn current_owner(&self, key: &str) -> Result<Option<String>, LockError>;

    /// Take or refresh `key` for `owner`. Returns false when another owner
    /// holds an unexpired entry.
    fn set_lock(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool, LockError>;

    /// Release `key` if and only if `owner` holds it.
    fn clear_lock(&self, key: &str, owner: &str) -> Result<(), LockError>;

    fn check_is_locked(&self, key: &str) -> Result<bool, LockError> {
        Ok(self.current_owner(key)?.is_some())
    }
}

/// SQLite-backed lock store. Point every process at the same database file.
#[derive(Debug)]
pub struct SqliteLockStore {
    conn: Connection,
}

impl SqliteLockStore {
    const SCHEMA: &'static str = "
        CREATE TABLE IF NOT EXISTS locks (
            key           TEXT PRIMARY KEY,
            owner         TEXT NOT NULL,
            expires_at_ms INTEGER NOT NULL
        );";

    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self, LockError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        Self::from_connection(conn)
    }

    pub fn from_connection(conn: Connection) -> Result<Self, LockError> {
        conn.execute_batch(Self::SCHEMA)?;
        Ok(Self { conn })
    }

    fn now_ms() -> i64 {
        Utc::now().timestamp_millis()
    }
}

impl LockStore for SqliteLockStore {
    fn current_owner(&self, key: &str) -> Result<Option<String>, LockError> {
        let owner = self
            .conn
            .query_row(
                "SELECT owner FROM locks WHERE key = ?1 AND expires_at_ms > ?2",
                params![key, Self::now_ms()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(owner)
    }

    fn set_lock(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool, LockError> {
        let now = Self::now_ms();
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires = now.saturating_add(ttl_ms);

        // Check and write in one statement: the upsert only fires when the
        // existing row is ours or stale.
        let changed = self.conn.execute(
            "INSERT INTO locks (key, owner, expires_at_ms) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE
                SET owner = excluded.owner, expires_at_ms = excluded.expires_at_ms
                WHERE locks.owner = excluded.owner OR locks.expires_at_ms <= ?4",
            params![key, owner, expires, now],
        )?;
        Ok(changed == 1)
    }

    fn clear_lock(&self, key: &str, owner: &str) -> Result<(), LockError> {
        self.conn.execute(
            "DELETE FROM locks WHERE key = ?1 AND owner = ?2",
            params![key, owner],
        )?;
        Ok(())
    }
}

/// Releases a lock on drop. Only ever built after a successful `set_lock`,
/// so it never clears an entry it did not take.
pub struct LockGuard<'a> {
    store: &'a dyn LockStore,
    key: String,
    owner: String,
}

impl<'a> LockGuard<'a> {
    /// Try to take `key`; `Ok(None)` when someone else holds it.
    pub fn acquire(
        store: &'a dyn LockStore,
        key: impl Into<String>,
        owner: impl Into<String>,
        ttl: Duration,
    ) -> Result<Option<Self>, LockError> {
        let key = key.into();
        let owner = owner.into();
        if !store.set_lock(&key, &owner, ttl)? {
            return Ok(None);
        }
        Ok(Some(Self { store, key, owner }))
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.store.clear_lock(&self.key, &self.owner) {
            warn!(key = %self.key, owner = %self.owner, error = %e, "failed to release lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteLockStore {
        SqliteLockStore::from_connection(Connection::open_in_memory().unwrap()).unwrap()
    }

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn set_and_check() {
        let s = store();
        assert!(!s.check_is_locked("review:1").unwrap());
        assert!(s.set_lock("review:1", "alice", TTL).unwrap());
        assert!(s.check_is_locked("review:1").unwrap());
        assert_eq!(s.current_owner("review:1").unwrap().as_deref(), Some("alice"));
    }

    #[test]
    fn other_owner_cannot_take_or_clear() {
        let s = store();
        assert!(s.set_lock("review:1", "alice", TTL).unwrap());
        assert!(!s.set_lock("review:1", "bot", TTL).unwrap());

        s.clear_lock("review:1", "bot").unwrap();
        assert_eq!(s.current_owner("review:1").unwrap().as_deref(), Some("alice"));

        s.clear_lock("review:1", "alice").unwrap();
        assert!(!s.check_is_locked("review:1").unwrap());
    }

    #[test]
    fn same_owner_refreshes() {
        let s = store();
        assert!(s.set_lock("k", "alice", TTL).unwrap());
        assert!(s.set_lock("k", "alice", TTL).unwrap());
    }

    #[test]
    fn expired_lock_is_free() {
        let s = store();
        assert!(s.set_lock("k", "alice", Duration::ZERO).unwrap());
        assert!(!s.check_is_locked("k").unwrap());
        assert!(s.set_lock("k", "bot", TTL).unwrap());
        assert_eq!(s.current_owner("k").unwrap().as_deref(), Some("bot"));
    }

    #[test]
    fn guard_releases_on_drop() {
        let s = store();
        {
            let guard = LockGuard::acquire(&s, "k", "bot", TTL).unwrap();
            assert!(guard.is_some());
            assert!(LockGuard::acquire(&s, "k", "other", TTL).unwrap().is_none());
        }
        assert!(!s.check_is_locked("k").unwrap());
    }

    #[test]
    fn review_keys_are_per_package() {
        assert_eq!(review_lock_key(42), "review:42");
    }
}
