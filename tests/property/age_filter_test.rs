//! Property-based tests for the load-time age cutoff.
//!
//! For any persisted history and retention window, a fresh load keeps exactly
//! the entries visited at or after `now - max_age_days`.

use std::sync::Arc;

use proptest::prelude::*;
use tempfile::TempDir;

use visitlog::managers::history_store::HistoryStore;
use visitlog::services::clock::{ManualClock, SECONDS_PER_DAY};
use visitlog::services::executor::{InlineExecutor, QueuedTimer};
use visitlog::services::history_persistence::{HistoryBackend, JsonFileBackend, PersistedHistory};
use visitlog::types::entry::Entry;

const NOW: i64 = 1_760_000_000;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn fresh_load_drops_only_expired_entries(
        ages in proptest::collection::btree_map("[a-z]{1,10}", 0i64..(30 * SECONDS_PER_DAY), 0..30),
        max_age_days in 0u32..30,
    ) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        let persisted = PersistedHistory {
            max_age_days,
            entries: ages
                .iter()
                .map(|(address, age)| Entry::new(format!("https://{}.example", address), NOW - age))
                .collect(),
        };
        JsonFileBackend::new(&path).save(&persisted).unwrap();

        let store = HistoryStore::builder(Arc::new(JsonFileBackend::new(&path)))
            .clock(Arc::new(ManualClock::new(NOW)))
            .timer(Arc::new(QueuedTimer::new()))
            .executor(Arc::new(InlineExecutor))
            .build();

        let cutoff = NOW - i64::from(max_age_days) * SECONDS_PER_DAY;
        let expected = persisted.entries.iter().filter(|e| e.last_visited >= cutoff).count();

        prop_assert_eq!(store.count(), expected);
        prop_assert_eq!(store.max_age(), max_age_days);
        for entry in store.entries() {
            prop_assert!(entry.last_visited >= cutoff, "{:?} is older than the cutoff", entry);
        }
    }
}
