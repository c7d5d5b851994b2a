use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};

/// The key-value primitive records are stored in.
///
/// Every call is atomic on its own; there are no cross-key transactions.
/// Keys are plain strings and values are opaque serialized text.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// All keys starting with `prefix`
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Fails with [`Error::StoreWrite`] if the value cannot be stored
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Write `value` only if `key` is absent. `Ok(false)` means the key was
    /// already taken and the stored value is untouched.
    async fn insert(&self, key: &str, value: &str) -> Result<bool>;

    /// Idempotent: deleting a missing key is not an error
    async fn delete(&self, key: &str) -> Result<()>;
}

/// The Library keeps the key-value store in a SQLite database.
///
/// A single `kv` table holds every key; record namespacing is done by key prefix.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl SqliteStore {
    /// Open (or create) the store at `db_path`, creating parent directories.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        // Ensure the parent directory exists
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&db_path).map_err(|e| Error::StoreRead(e.to_string()))?;

        tracing::info!("📁 Database initialized at: {}", db_path.display());

        let store = SqliteStore {
            conn: Arc::new(Mutex::new(conn)),
            db_path,
        };
        store.init_schema()?;

        Ok(store)
    }

    /// An in-memory database, mostly useful for tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::StoreRead(e.to_string()))?;
        let store = SqliteStore {
            conn: Arc::new(Mutex::new(conn)),
            db_path: PathBuf::from(":memory:"),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Default location of the history database:
    /// - Linux: ~/.local/share/crack-inspector/history.db
    /// - macOS: ~/Library/Application Support/crack-inspector/history.db
    /// - Windows: %APPDATA%\crack-inspector\history.db
    pub fn default_path() -> PathBuf {
        let mut path = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));

        path.push("crack-inspector");
        path.push("history.db");
        path
    }

    /// Get the path to the database file
    pub fn path(&self) -> &PathBuf {
        &self.db_path
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(|p| p.into_inner());
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key     TEXT PRIMARY KEY,
                value   TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| Error::StoreWrite(e.to_string()))?;

        tracing::debug!("✅ Database schema initialized");
        Ok(())
    }

    /// Run a closure against the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(|p| p.into_inner());
            f(&conn)
        })
        .await
        .map_err(|e| Error::Io(format!("Task join error: {}", e)))?
    }
}

#[async_trait]
impl KvStore for SqliteStore {
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = prefix.to_string();
        self.with_conn(move |conn| {
            // substr avoids LIKE wildcards in user-chosen prefixes
            let mut stmt = conn
                .prepare("SELECT key FROM kv WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key")
                .map_err(|e| Error::StoreRead(e.to_string()))?;

            let keys = stmt
                .query_map([&prefix], |row| row.get::<_, String>(0))
                .map_err(|e| Error::StoreRead(e.to_string()))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|e| Error::StoreRead(e.to_string()))?;

            Ok(keys)
        })
        .await
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.query_row("SELECT value FROM kv WHERE key = ?1", [&key], |row| {
                row.get::<_, String>(0)
            })
            .optional()
            .map_err(|e| Error::StoreRead(e.to_string()))
        })
        .await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                rusqlite::params![key, value],
            )
            .map_err(|e| Error::StoreWrite(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn insert(&self, key: &str, value: &str) -> Result<bool> {
        let key = key.to_string();
        let value = value.to_string();
        self.with_conn(move |conn| {
            let inserted = conn
                .execute(
                    "INSERT INTO kv (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO NOTHING",
                    rusqlite::params![key, value],
                )
                .map_err(|e| Error::StoreWrite(e.to_string()))?;
            Ok(inserted == 1)
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM kv WHERE key = ?1", [&key])
                .map_err(|e| Error::StoreWrite(e.to_string()))?;
            Ok(())
        })
        .await
    }
}

// Implement Debug for better error messages
impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("db_path", &self.db_path)
            .finish()
    }
}
