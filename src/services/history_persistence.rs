//! Persisted layout of the history store and the backends that read and write it.
//!
//! A snapshot is an ordered list of entries plus the `maxAgeDays` scalar.
//! The JSON backend stores it as one document; the SQLite backend spreads it
//! over the `history` and `history_meta` tables.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[cfg(feature = "sqlite")]
use crate::database::connection::Database;
use crate::types::config::DEFAULT_MAX_AGE_DAYS;
use crate::types::entry::Entry;
use crate::types::errors::HistoryError;

/// Independent copy of the store's state, owned by whoever writes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedHistory {
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,
    #[serde(default)]
    pub entries: Vec<Entry>,
}

fn default_max_age_days() -> u32 {
    DEFAULT_MAX_AGE_DAYS
}

impl Default for PersistedHistory {
    fn default() -> Self {
        Self {
            max_age_days: DEFAULT_MAX_AGE_DAYS,
            entries: Vec::new(),
        }
    }
}

/// Storage for history snapshots.
///
/// `load` returns `Ok(None)` when nothing has been persisted yet.
pub trait HistoryBackend: Send + Sync {
    fn load(&self) -> Result<Option<PersistedHistory>, HistoryError>;
    fn save(&self, snapshot: &PersistedHistory) -> Result<(), HistoryError>;
}

// === JSON file ===

/// Stores the snapshot as a pretty-printed JSON file.
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl HistoryBackend for JsonFileBackend {
    fn load(&self) -> Result<Option<PersistedHistory>, HistoryError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path)
            .map_err(|e| HistoryError::Io(format!("Failed to read history file: {}", e)))?;

        let history: PersistedHistory = serde_json::from_str(&content).map_err(|e| {
            HistoryError::Serialization(format!("Failed to parse history file: {}", e))
        })?;

        Ok(Some(history))
    }

    /// Writes to a sibling `.tmp` file and renames it over the target, so a
    /// crash mid-write leaves the previous file intact.
    fn save(&self, snapshot: &PersistedHistory) -> Result<(), HistoryError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    HistoryError::Io(format!("Failed to create history directory: {}", e))
                })?;
            }
        }

        let json = serde_json::to_string_pretty(snapshot).map_err(|e| {
            HistoryError::Serialization(format!("Failed to serialize history: {}", e))
        })?;

        let tmp = self.temp_path();
        fs::write(&tmp, json)
            .map_err(|e| HistoryError::Io(format!("Failed to write history file: {}", e)))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| HistoryError::Io(format!("Failed to replace history file: {}", e)))?;

        Ok(())
    }
}

// === SQLite ===

#[cfg(feature = "sqlite")]
const MAX_AGE_KEY: &str = "max_age_days";

/// Stores the snapshot in SQLite, replacing the previous content in one transaction.
#[cfg(feature = "sqlite")]
pub struct SqliteBackend {
    db: Mutex<Database>,
}

#[cfg(feature = "sqlite")]
impl SqliteBackend {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, HistoryError> {
        Ok(Self::from_database(Database::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self, HistoryError> {
        Ok(Self::from_database(Database::open_in_memory()?))
    }

    pub fn from_database(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Database>, HistoryError> {
        self.db
            .lock()
            .map_err(|e| HistoryError::Database(format!("connection lock poisoned: {}", e)))
    }
}

#[cfg(feature = "sqlite")]
impl HistoryBackend for SqliteBackend {
    fn load(&self) -> Result<Option<PersistedHistory>, HistoryError> {
        use rusqlite::OptionalExtension;

        let db = self.lock()?;
        let conn = db.connection();

        let max_age: Option<i64> = conn
            .query_row(
                "SELECT value FROM history_meta WHERE key = ?1",
                [MAX_AGE_KEY],
                |row| row.get(0),
            )
            .optional()?;

        let mut stmt = conn.prepare(
            "SELECT address, last_visited, visit_count FROM history ORDER BY position ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Entry {
                address: row.get(0)?,
                last_visited: row.get(1)?,
                visit_count: row.get(2)?,
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }

        if max_age.is_none() && entries.is_empty() {
            return Ok(None);
        }

        let max_age_days = match max_age {
            Some(days) => u32::try_from(days).unwrap_or(DEFAULT_MAX_AGE_DAYS),
            None => DEFAULT_MAX_AGE_DAYS,
        };

        Ok(Some(PersistedHistory {
            max_age_days,
            entries,
        }))
    }

    fn save(&self, snapshot: &PersistedHistory) -> Result<(), HistoryError> {
        let mut db = self.lock()?;
        let tx = db.connection_mut().transaction()?;

        tx.execute("DELETE FROM history", [])?;
        {
            let mut insert = tx.prepare(
                "INSERT OR REPLACE INTO history (address, last_visited, visit_count, position) \
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (position, entry) in snapshot.entries.iter().enumerate() {
                insert.execute(rusqlite::params![
                    entry.address,
                    entry.last_visited,
                    entry.visit_count,
                    position as i64
                ])?;
            }
        }
        tx.execute(
            "INSERT OR REPLACE INTO history_meta (key, value) VALUES (?1, ?2)",
            rusqlite::params![MAX_AGE_KEY, snapshot.max_age_days],
        )?;

        tx.commit()?;
        Ok(())
    }
}

// === Memory ===

/// Keeps the last snapshot in memory. Used for ephemeral profiles.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    stored: Option<PersistedHistory>,
    saves: usize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts with `snapshot` already persisted.
    pub fn with_snapshot(snapshot: PersistedHistory) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                stored: Some(snapshot),
                saves: 0,
            }),
        }
    }

    /// The most recently saved snapshot.
    pub fn stored(&self) -> Option<PersistedHistory> {
        self.state.lock().ok().and_then(|s| s.stored.clone())
    }

    /// Number of completed `save` calls.
    pub fn save_count(&self) -> usize {
        self.state.lock().map(|s| s.saves).unwrap_or(0)
    }
}

impl HistoryBackend for MemoryBackend {
    fn load(&self) -> Result<Option<PersistedHistory>, HistoryError> {
        let state = self
            .state
            .lock()
            .map_err(|e| HistoryError::Io(format!("memory backend poisoned: {}", e)))?;
        Ok(state.stored.clone())
    }

    fn save(&self, snapshot: &PersistedHistory) -> Result<(), HistoryError> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| HistoryError::Io(format!("memory backend poisoned: {}", e)))?;
        state.stored = Some(snapshot.clone());
        state.saves += 1;
        Ok(())
    }
}
