// Storage schema and database management

use rusqlite::{Connection, Result as SqliteResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::{Result, StoreError};

/// Storage shared between the HTTP layer and pipeline runs.
///
/// `rusqlite::Connection` is `Send` but not `Sync`, so every access goes
/// through the mutex. Callers must not hold the guard across an `.await`.
pub type SharedStorage = Arc<Mutex<Storage>>;

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database path
    pub db_path: String,

    /// Whether to enable WAL mode
    pub wal_enabled: bool,

    /// Cache size in pages
    pub cache_size_pages: Option<usize>,

    /// Busy timeout in milliseconds for concurrent readers
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: "leavatar.db".to_string(),
            wal_enabled: true,
            cache_size_pages: Some(10000),
            busy_timeout_ms: 5000,
        }
    }
}

/// Main storage interface
pub struct Storage {
    conn: Connection,
    config: StorageConfig,
}

impl Storage {
    /// Open storage with default config
    pub fn open<P: AsRef<Path>>(path: P) -> SqliteResult<Self> {
        Self::open_with_config(path, StorageConfig::default())
    }

    /// Open storage with custom config
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: StorageConfig) -> SqliteResult<Self> {
        let conn = Connection::open(path)?;

        if config.wal_enabled {
            conn.pragma_update(None, "journal_mode", "WAL")?;
        }

        if let Some(cache_size) = config.cache_size_pages {
            conn.pragma_update(None, "cache_size", cache_size)?;
        }

        conn.busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let mut storage = Self { conn, config };
        storage.initialize_schema()?;

        Ok(storage)
    }

    /// Wrap this storage for sharing across tasks
    pub fn into_shared(self) -> SharedStorage {
        Arc::new(Mutex::new(self))
    }

    /// Initialize database schema
    fn initialize_schema(&mut self) -> SqliteResult<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                user_id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_email TEXT UNIQUE NOT NULL,
                user_name TEXT,
                role TEXT NOT NULL DEFAULT 'user',
                created_at INTEGER NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS avatars (
                avatar_id INTEGER PRIMARY KEY AUTOINCREMENT,
                avatar_name TEXT NOT NULL,
                description TEXT,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS sessions (
                session_id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                avatar_id INTEGER NOT NULL,
                start_time INTEGER NOT NULL,
                end_time INTEGER,
                FOREIGN KEY(user_id) REFERENCES users(user_id),
                FOREIGN KEY(avatar_id) REFERENCES avatars(avatar_id)
            )",
            [],
        )?;

        // One row per conversational turn. `status` is the single source of
        // truth for pipeline progress.
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS interactions (
                interaction_id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'processing',
                input_text TEXT,
                input_audio_ref TEXT,
                input_video_ref TEXT,
                transcribed_text TEXT,
                perceived_affect TEXT,
                raw_content_response TEXT,
                final_response_text TEXT,
                generated_audio_ref TEXT,
                video_job_handle TEXT,
                generated_video_ref TEXT,
                failure_reason TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                FOREIGN KEY(session_id) REFERENCES sessions(session_id)
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS memories (
                memory_id INTEGER PRIMARY KEY AUTOINCREMENT,
                memory_scope TEXT NOT NULL,
                owner_id INTEGER NOT NULL,
                memory_key TEXT NOT NULL,
                memory_value TEXT,
                source_interaction_id INTEGER,
                last_updated INTEGER NOT NULL
            )",
            [],
        )?;

        let indexes = [
            "CREATE INDEX IF NOT EXISTS idx_interactions_session ON interactions(session_id)",
            "CREATE INDEX IF NOT EXISTS idx_interactions_status ON interactions(status)",
            "CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id)",
            "CREATE INDEX IF NOT EXISTS idx_memories_owner ON memories(memory_scope, owner_id)",
        ];
        for index_sql in indexes {
            self.conn.execute(index_sql, [])?;
        }

        Ok(())
    }

    /// Get the underlying connection
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Get mutable connection
    pub fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Get the configuration this storage was opened with
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Checkpoint the WAL so the main database file is self-contained
    pub fn close(&mut self) -> SqliteResult<()> {
        if self.config.wal_enabled {
            self.conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE)")?;
        }
        Ok(())
    }
}

/// Run `f` against the connection behind a shared storage handle.
pub(crate) fn with_conn<T>(
    storage: &SharedStorage,
    f: impl FnOnce(&mut Connection) -> Result<T>,
) -> Result<T> {
    let mut guard = storage.lock().map_err(|_| StoreError::LockPoisoned)?;
    f(guard.conn_mut())
}

/// Current unix time in seconds
pub(crate) fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_storage_creation() {
        let temp_file = NamedTempFile::new().unwrap();
        let storage = Storage::open(temp_file.path());
        assert!(storage.is_ok());
    }

    #[test]
    fn test_schema_initialization() {
        let temp_file = NamedTempFile::new().unwrap();
        let storage = Storage::open(temp_file.path()).unwrap();

        let table_count: i64 = storage
            .conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('users', 'avatars', 'sessions', 'interactions', 'memories')",
                [],
                |row| row.get(0),
            )
            .unwrap();

        assert_eq!(table_count, 5);
    }

    #[test]
    fn test_schema_is_idempotent() {
        let temp_file = NamedTempFile::new().unwrap();
        drop(Storage::open(temp_file.path()).unwrap());
        assert!(Storage::open(temp_file.path()).is_ok());
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let temp_file = NamedTempFile::new().unwrap();
        let storage = Storage::open(temp_file.path()).unwrap();
        let enabled: i64 = storage
            .conn()
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(enabled, 1);
    }
}
