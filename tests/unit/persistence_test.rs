//! Unit tests for the persisted history layout and its backends.

use std::fs;
use std::sync::Arc;

use rstest::rstest;
use tempfile::TempDir;

use visitlog::managers::history_store::HistoryStore;
use visitlog::services::executor::{InlineExecutor, QueuedTimer};
use visitlog::services::history_persistence::{
    HistoryBackend, JsonFileBackend, MemoryBackend, PersistedHistory,
};
use visitlog::types::entry::{unix_now, Entry};

fn json_backend(dir: &TempDir) -> Arc<JsonFileBackend> {
    Arc::new(JsonFileBackend::new(dir.path().join("history.json")))
}

fn sample() -> PersistedHistory {
    let now = unix_now();
    PersistedHistory {
        max_age_days: 14,
        entries: vec![
            Entry::new("https://a.example", now - 100),
            Entry { address: "https://b.example".into(), last_visited: now - 50, visit_count: 3 },
        ],
    }
}

#[test]
fn test_json_layout_field_names() {
    let dir = TempDir::new().unwrap();
    let backend = json_backend(&dir);
    backend.save(&sample()).unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(backend.path()).unwrap()).unwrap();
    assert_eq!(raw["maxAgeDays"], 14);
    assert_eq!(raw["entries"][1]["address"], "https://b.example");
    assert_eq!(raw["entries"][1]["visitCount"], 3);
    assert!(raw["entries"][0]["lastVisited"].is_i64());
}

#[test]
fn test_json_save_overwrites_previous_snapshot() {
    let dir = TempDir::new().unwrap();
    let backend = json_backend(&dir);
    backend.save(&sample()).unwrap();
    backend.save(&PersistedHistory::default()).unwrap();
    assert_eq!(backend.load().unwrap(), Some(PersistedHistory::default()));
}

#[rstest]
#[case("")]
#[case("null")]
#[case("{\"entries\": 5}")]
#[case("{\"maxAgeDays\": -1, \"entries\": []}")]
fn test_malformed_json_is_an_error(#[case] content: &str) {
    let dir = TempDir::new().unwrap();
    let backend = json_backend(&dir);
    fs::write(backend.path(), content).unwrap();
    assert!(backend.load().is_err(), "content {content:?} should not load");
}

#[test]
fn test_store_restarts_from_json_file() {
    let dir = TempDir::new().unwrap();
    {
        let store = HistoryStore::builder(json_backend(&dir))
            .timer(Arc::new(QueuedTimer::new()))
            .executor(Arc::new(InlineExecutor))
            .build();
        store.record_visit("https://a.example");
        store.record_visit("https://b.example");
        store.record_visit("https://a.example");
    }

    let store = HistoryStore::builder(json_backend(&dir))
        .timer(Arc::new(QueuedTimer::new()))
        .build();
    assert_eq!(store.count(), 2);
    assert_eq!(store.get("https://a.example").unwrap().visit_count, 2);
    assert_eq!(store.generation(), 2, "loaded entries go through the insert path");
}

#[test]
fn test_memory_backend_round_trips_through_store() {
    let backend = Arc::new(MemoryBackend::with_snapshot(sample()));
    {
        let store = HistoryStore::builder(backend.clone())
            .timer(Arc::new(QueuedTimer::new()))
            .build();
        assert_eq!(store.max_age(), 14);
        store.clear();
    }
    let stored = backend.stored().unwrap();
    assert!(stored.entries.is_empty());
    assert_eq!(stored.max_age_days, 14);
}

#[cfg(feature = "sqlite")]
mod sqlite {
    use super::*;
    use visitlog::services::history_persistence::SqliteBackend;

    #[test]
    fn test_store_restarts_from_sqlite_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.db");
        {
            let backend = Arc::new(SqliteBackend::open(&path).unwrap());
            let store = HistoryStore::builder(backend)
                .timer(Arc::new(QueuedTimer::new()))
                .build();
            store.record_visit("https://sqlite.example");
            store.set_max_age(3);
        }

        let backend = Arc::new(SqliteBackend::open(&path).unwrap());
        let loaded = backend.load().unwrap().unwrap();
        assert_eq!(loaded.max_age_days, 3);
        assert_eq!(loaded.entries.len(), 1);
        assert_eq!(loaded.entries[0].address, "https://sqlite.example");
    }

    #[test]
    fn test_sqlite_save_replaces_rows() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend.save(&sample()).unwrap();
        let shorter = PersistedHistory {
            max_age_days: 1,
            entries: vec![Entry::new("only", 5)],
        };
        backend.save(&shorter).unwrap();
        assert_eq!(backend.load().unwrap(), Some(shorter));
    }
}
