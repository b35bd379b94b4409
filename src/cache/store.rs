//! Key/value store trait and its SQLite and in-memory implementations.
//!
//! Every operation fails soft: a full disk, a poisoned lock or a corrupt entry
//! degrades to a cache miss, never to an error the caller has to handle.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

use super::keys;

/// JSON envelope stored under each key.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
  data: serde_json::Value,
  timestamp: i64,
}

/// Durable key/value store with fail-soft semantics.
///
/// Implementors only provide raw string access; serialization, the envelope
/// format and the empty-list overwrite guard live in the default methods.
pub trait KvStore: Send + Sync + 'static {
  /// Read the raw stored value, or `None` on miss or any underlying error.
  fn get_raw(&self, key: &str) -> Option<String>;

  /// Write the raw value. Errors are swallowed by the implementation.
  fn put_raw(&self, key: &str, value: String);

  /// Remove a key. Idempotent; removing an absent key is not an error.
  fn remove(&self, key: &str);

  /// Store a value wrapped in the `{data, timestamp}` envelope.
  fn put<T: Serialize>(&self, key: &str, value: &T) {
    let Ok(data) = serde_json::to_value(value) else {
      return;
    };
    let envelope = Envelope {
      data,
      timestamp: Utc::now().timestamp_millis(),
    };
    match serde_json::to_string(&envelope) {
      Ok(json) => self.put_raw(key, json),
      Err(err) => debug!(key, %err, "failed to serialize cache entry"),
    }
  }

  /// Read a value back out of its envelope.
  ///
  /// Absent, unparsable and failing entries all yield `None`.
  fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
    let raw = self.get_raw(key)?;
    let envelope: Envelope = serde_json::from_str(&raw).ok()?;
    serde_json::from_value(envelope.data).ok()
  }

  /// Whether a key currently holds any entry, readable or not.
  fn contains(&self, key: &str) -> bool {
    self.get_raw(key).is_some()
  }

  /// Store a collection, refusing to overwrite a non-empty cached list with
  /// an empty one. An empty successful refetch usually signals a backend
  /// hiccup, and stale data beats a blank page.
  fn put_list<T: Serialize>(&self, key: &str, values: &[T]) {
    if values.is_empty() {
      if let Some(existing) = self.get::<Vec<serde_json::Value>>(key) {
        if !existing.is_empty() {
          debug!(key, "keeping non-empty cached list over empty refetch");
          return;
        }
      }
    }
    self.put(key, &values);
  }
}

/// SQLite-backed store at the default data directory.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_cache (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

impl SqliteStore {
  /// Open or create the store at the default location.
  pub fn open() -> Result<Self> {
    let path = Self::default_path()?;

    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open cache store at {}: {}", path.display(), e))?;

    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;

    Ok(store)
  }

  fn default_path() -> Result<std::path::PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("school-portal").join("cache.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }

  fn try_put(&self, key: &str, value: &str) -> rusqlite::Result<()> {
    let conn = match self.conn.lock() {
      Ok(conn) => conn,
      Err(_) => return Ok(()),
    };
    conn
      .execute(
        "INSERT OR REPLACE INTO kv_cache (key, value) VALUES (?, ?)",
        params![key, value],
      )
      .map(|_| ())
  }
}

impl KvStore for SqliteStore {
  fn get_raw(&self, key: &str) -> Option<String> {
    let conn = self.conn.lock().ok()?;
    conn
      .query_row(
        "SELECT value FROM kv_cache WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .ok()
  }

  fn put_raw(&self, key: &str, value: String) {
    if let Err(err) = self.try_put(key, &value) {
      // Likely out of space. Evict the biggest entry and try once more.
      debug!(key, %err, "cache write failed, evicting large entry");
      self.remove(keys::LARGE_FOOTPRINT_KEY);
      if let Err(err) = self.try_put(key, &value) {
        debug!(key, %err, "cache write dropped");
      }
    }
  }

  fn remove(&self, key: &str) {
    let Ok(conn) = self.conn.lock() else {
      return;
    };
    if let Err(err) = conn.execute("DELETE FROM kv_cache WHERE key = ?", params![key]) {
      debug!(key, %err, "cache delete failed");
    }
  }
}

/// In-memory store, used in tests and when no durable location is available.
#[derive(Default)]
pub struct MemoryStore {
  entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl KvStore for MemoryStore {
  fn get_raw(&self, key: &str) -> Option<String> {
    self.entries.lock().ok()?.get(key).cloned()
  }

  fn put_raw(&self, key: &str, value: String) {
    if let Ok(mut entries) = self.entries.lock() {
      entries.insert(key.to_string(), value);
    }
  }

  fn remove(&self, key: &str) {
    if let Ok(mut entries) = self.entries.lock() {
      entries.remove(key);
    }
  }
}
