// Token persistence
// Best-effort local cache of the current token pair; the server session stays the source of truth

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

use super::types::TokenPair;

/// Storage key holding the JSON token pair
pub const TOKEN_KEY: &str = "kleff_auth_tokens";

/// Storage key holding the access token expiry as RFC 3339
pub const EXPIRY_KEY: &str = "kleff_auth_expires_at";

/// Failures inside a storage backend; these never leave `TokenStore`
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Durable string key-value storage
pub trait KeyValueStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// `auth_kv` table in a SQLite database
pub struct SqliteStorage {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteStorage {
    /// Open (or create) the database file and its table
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = rusqlite::Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Database that lives only as long as this value
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::with_connection(rusqlite::Connection::open_in_memory()?)
    }

    fn with_connection(conn: rusqlite::Connection) -> Result<Self, StorageError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS auth_kv (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
            [],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, rusqlite::Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Unavailable("SQLite connection lock poisoned".to_string()))
    }
}

impl KeyValueStorage for SqliteStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let conn = self.lock()?;
        let value = conn
            .query_row("SELECT value FROM auth_kv WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO auth_kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [key, value],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM auth_kv WHERE key = ?", [key])?;
        Ok(())
    }
}

/// Process-local storage, gone on exit
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, StorageError> {
        self.entries
            .lock()
            .map_err(|_| StorageError::Unavailable("memory storage lock poisoned".to_string()))
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// Token pair persistence that never fails at the call site
///
/// Storage problems are logged and swallowed: losing persistence must not undo an
/// authentication that already succeeded.
pub struct TokenStore {
    /// `None` when no backend could be opened
    storage: Option<Box<dyn KeyValueStorage>>,
}

impl TokenStore {
    pub fn new(storage: impl KeyValueStorage + 'static) -> Self {
        Self {
            storage: Some(Box::new(storage)),
        }
    }

    /// Store backed by a SQLite file, degrading to no persistence if it cannot be opened
    pub fn open_sqlite(path: &Path) -> Self {
        match SqliteStorage::open(path) {
            Ok(storage) => {
                tracing::debug!("Token store opened at {}", path.display());
                Self::new(storage)
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Token store unavailable, continuing without persistence"
                );
                Self::disabled()
            }
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryStorage::new())
    }

    /// Store that persists nothing
    pub fn disabled() -> Self {
        Self { storage: None }
    }

    pub fn is_persistent(&self) -> bool {
        self.storage.is_some()
    }

    pub fn save(&self, tokens: &TokenPair) {
        let Some(storage) = &self.storage else {
            return;
        };

        let result = serde_json::to_string(tokens)
            .map_err(StorageError::from)
            .and_then(|json| storage.set(TOKEN_KEY, &json));

        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to persist tokens");
        }
    }

    pub fn load(&self) -> Option<TokenPair> {
        let storage = self.storage.as_ref()?;

        let raw = match storage.get(TOKEN_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read persisted tokens");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(tokens) => Some(tokens),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring malformed persisted tokens");
                None
            }
        }
    }

    /// Remember when the current access token expires; `None` forgets it
    pub fn save_expiry(&self, expires_at: Option<DateTime<Utc>>) {
        let Some(storage) = &self.storage else {
            return;
        };

        let result = match expires_at {
            Some(at) => storage.set(EXPIRY_KEY, &at.to_rfc3339()),
            None => storage.remove(EXPIRY_KEY),
        };

        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to persist token expiry");
        }
    }

    pub fn load_expiry(&self) -> Option<DateTime<Utc>> {
        let storage = self.storage.as_ref()?;

        let raw = match storage.get(EXPIRY_KEY) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read persisted token expiry");
                return None;
            }
        };

        match DateTime::parse_from_rfc3339(&raw) {
            Ok(at) => Some(at.with_timezone(&Utc)),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring malformed persisted token expiry");
                None
            }
        }
    }

    pub fn clear(&self) {
        let Some(storage) = &self.storage else {
            return;
        };

        for key in [TOKEN_KEY, EXPIRY_KEY] {
            if let Err(e) = storage.remove(key) {
                tracing::warn!(error = %e, key = key, "Failed to clear persisted tokens");
            }
        }
    }
}
