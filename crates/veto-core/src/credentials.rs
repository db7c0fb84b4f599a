// Persisted per-match credentials: a typed adapter over a raw key-value
// backend, with a SQLite backend for real sessions and an in-memory one.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::model::Role;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("credential database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to encode credential: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Raw string storage keyed by string. Implementations must be cheap to call
/// from the event loop; none of them touch the network.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// Backends
// ---------------------------------------------------------------------------

/// SQLite-backed key-value storage.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the store at `path`. Pass `":memory:"` for an
    /// ephemeral database.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             CREATE TABLE IF NOT EXISTS kv (
                 key   TEXT PRIMARY KEY,
                 value TEXT NOT NULL
             );",
        )?;
        debug!("credential store opened at {path}");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Panics if the mutex is poisoned, which only happens after a panic
    /// while holding the lock.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("credential store mutex poisoned")
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn();
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }
}

/// In-process storage; contents vanish with the value.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().expect("memory store mutex poisoned")
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries().get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<S> {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).put(key, value)
    }
}

// ---------------------------------------------------------------------------
// Typed credentials
// ---------------------------------------------------------------------------

/// What the join flow left behind for one (match, team) pair.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StoredCredential {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Non-numeric stored teams read back as `None`.
    #[serde(
        default,
        deserialize_with = "lenient_team",
        skip_serializing_if = "Option::is_none"
    )]
    pub team: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl StoredCredential {
    pub fn captain(team: u8, token: impl Into<String>) -> Self {
        Self {
            role: Some(Role::Captain),
            team: Some(team),
            token: Some(token.into()),
        }
    }

    pub fn spectator() -> Self {
        Self {
            role: Some(Role::Spectator),
            team: None,
            token: None,
        }
    }
}

fn lenient_team<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value
        .and_then(|v| v.as_u64())
        .and_then(|n| u8::try_from(n).ok()))
}

pub fn captain_key(match_id: &str, team: &str) -> String {
    format!("match_{match_id}_team_{team}_auth")
}

pub fn spectator_key(match_id: &str) -> String {
    format!("match_{match_id}_spectator")
}

/// Typed get/put of credentials over any [`KeyValueStore`].
///
/// Reads never fail: a backend error or an undecodable record is logged and
/// reported as absent, which downgrades the caller to spectator.
pub struct CredentialStore<S> {
    backend: S,
}

impl<S: KeyValueStore> CredentialStore<S> {
    pub fn new(backend: S) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    /// Look up the record for `team` (the raw route value), or the spectator
    /// marker when `team` is `None`.
    pub fn get(&self, match_id: &str, team: Option<&str>) -> Option<StoredCredential> {
        let key = match team {
            Some(team) => captain_key(match_id, team),
            None => spectator_key(match_id),
        };

        let raw = match self.backend.get(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Failed to read credential {key}: {e}");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(credential) => Some(credential),
            Err(e) => {
                warn!("Ignoring malformed credential {key}: {e}");
                None
            }
        }
    }

    pub fn put(
        &self,
        match_id: &str,
        team: u8,
        credential: &StoredCredential,
    ) -> Result<(), StoreError> {
        let key = captain_key(match_id, &team.to_string());
        let value = serde_json::to_string(credential)?;
        self.backend.put(&key, &value)
    }

    pub fn put_spectator(&self, match_id: &str) -> Result<(), StoreError> {
        let value = serde_json::to_string(&StoredCredential::spectator())?;
        self.backend.put(&spectator_key(match_id), &value)
    }
}
