//! History store for visited addresses.
//!
//! Keeps one [`Entry`] per address in a sequence ordered by the
//! `(last_visited, address)` key each entry was inserted under, plus an
//! address lookup holding that key. Finding an entry is a binary search for
//! its key, so removals never leave stale positions behind.
//!
//! Revisits refresh the entry in place. They neither move it nor bump
//! [`HistoryStore::generation`], so the sequence is only guaranteed sorted
//! between structural inserts, and a cache keyed on the generation can show a
//! revisited address under an old date until something else changes.
//!
//! New entries are placed by their insertion key too. After `z` is revisited
//! at `t`, a first visit to `m` at the same `t` lands after `z`, although the
//! live `(last_visited, address)` order would put it before.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::services::clock::{Clock, SystemClock, SECONDS_PER_DAY};
use crate::services::executor::{DelayedCallback, TaskExecutor, ThreadExecutor, ThreadTimer};
use crate::services::history_persistence::{HistoryBackend, PersistedHistory};
use crate::services::save_scheduler::{SaveScheduler, SnapshotSource};
use crate::types::config::{DEFAULT_MAX_AGE_DAYS, DEFAULT_SAVE_DELAY_MS};
use crate::types::entry::Entry;
use crate::types::errors::HistoryError;

fn days_in_month(year: i64, month: i64) -> i64 {
    match month {
        2 if year % 4 == 0 && (year % 100 != 0 || year % 400 == 0) => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

/// Parses a "YYYY-MM-DD" date string into a UNIX timestamp (start of day UTC).
///
/// Years outside `1..=9999` and days past the end of the month are rejected.
pub fn parse_date_to_timestamp(date: &str) -> Result<i64, HistoryError> {
    let invalid = || HistoryError::InvalidDate(date.to_string());

    let parts: Vec<&str> = date.split('-').collect();
    if parts.len() != 3 {
        return Err(invalid());
    }
    let year: i64 = parts[0].parse().map_err(|_| invalid())?;
    let month: i64 = parts[1].parse().map_err(|_| invalid())?;
    let day: i64 = parts[2].parse().map_err(|_| invalid())?;

    if !(1..=9999).contains(&year) || !(1..=12).contains(&month) {
        return Err(invalid());
    }
    if !(1..=days_in_month(year, month)).contains(&day) {
        return Err(invalid());
    }

    // Days from civil date, March-based year.
    let mut y = year;
    let mut m = month;
    if m <= 2 {
        y -= 1;
        m += 12;
    }
    let days = 365 * y + y / 4 - y / 100 + y / 400 + (153 * (m - 3) + 2) / 5 + day - 719469;
    Ok(days * SECONDS_PER_DAY)
}

struct Slot {
    key_time: i64,
    entry: Entry,
}

struct StoreState {
    loaded: bool,
    slots: Vec<Slot>,
    keys: HashMap<String, i64>,
    generation: u64,
    max_age_days: u32,
}

impl StoreState {
    fn position(&self, key_time: i64, address: &str) -> Result<usize, usize> {
        self.slots
            .binary_search_by(|s| (s.key_time, s.entry.address.as_str()).cmp(&(key_time, address)))
    }

    fn locate(&self, address: &str) -> Option<usize> {
        let key_time = *self.keys.get(address)?;
        self.position(key_time, address).ok()
    }

    /// Inserts a brand-new entry. Capacity for both structures is reserved
    /// before either is touched, so a failure leaves them consistent.
    fn insert_new(&mut self, entry: Entry) -> Result<(), HistoryError> {
        self.slots.try_reserve(1)?;
        self.keys.try_reserve(1)?;

        let key_time = entry.last_visited;
        let pos = match self.position(key_time, &entry.address) {
            Ok(pos) | Err(pos) => pos,
        };
        self.keys.insert(entry.address.clone(), key_time);
        self.slots.insert(pos, Slot { key_time, entry });
        Ok(())
    }

    fn snapshot(&self) -> PersistedHistory {
        PersistedHistory {
            max_age_days: self.max_age_days,
            entries: self.slots.iter().map(|s| s.entry.clone()).collect(),
        }
    }
}

struct StoreShared {
    state: Mutex<StoreState>,
    scheduler: SaveScheduler,
    backend: Arc<dyn HistoryBackend>,
    clock: Arc<dyn Clock>,
    self_ref: Weak<StoreShared>,
}

impl SnapshotSource for StoreShared {
    fn snapshot(&self) -> Option<PersistedHistory> {
        let state = self.lock();
        state.loaded.then(|| state.snapshot())
    }
}

impl StoreShared {
    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks the state, loading persisted history on first access.
    fn lock_loaded(&self) -> MutexGuard<'_, StoreState> {
        let mut state = self.lock();
        if !state.loaded {
            self.load_into(&mut state);
        }
        state
    }

    fn load_into(&self, state: &mut StoreState) {
        state.loaded = true;

        let persisted = match self.backend.load() {
            Ok(Some(persisted)) => persisted,
            Ok(None) => {
                debug!("no persisted history; starting empty");
                return;
            }
            Err(e) => {
                warn!(error = %e, "failed to load history; starting empty");
                return;
            }
        };

        state.max_age_days = persisted.max_age_days;
        let cutoff = self
            .clock
            .now()
            .saturating_sub(i64::from(persisted.max_age_days) * SECONDS_PER_DAY);

        let total = persisted.entries.len();
        let mut expired = 0usize;
        let mut duplicates = 0usize;
        for entry in persisted.entries {
            if entry.last_visited < cutoff {
                expired += 1;
                continue;
            }
            if state.keys.contains_key(&entry.address) {
                duplicates += 1;
                continue;
            }
            if let Err(e) = state.insert_new(entry) {
                warn!(error = %e, "stopping history load early");
                break;
            }
            state.generation += 1;
        }

        info!(
            total,
            kept = state.slots.len(),
            expired,
            duplicates,
            max_age_days = state.max_age_days,
            "history loaded"
        );
    }

    fn schedule_save(&self) {
        let source: Weak<dyn SnapshotSource> = self.self_ref.clone();
        self.scheduler.schedule_save(source);
    }

    fn shutdown(&self) -> bool {
        self.scheduler.shutdown(self)
    }
}

/// Builds a [`HistoryStore`] with its host primitives.
pub struct HistoryStoreBuilder {
    backend: Arc<dyn HistoryBackend>,
    timer: Arc<dyn DelayedCallback>,
    executor: Arc<dyn TaskExecutor>,
    clock: Arc<dyn Clock>,
    save_delay: Duration,
    default_max_age_days: u32,
}

impl HistoryStoreBuilder {
    pub fn timer(mut self, timer: Arc<dyn DelayedCallback>) -> Self {
        self.timer = timer;
        self
    }

    pub fn executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn save_delay(mut self, delay: Duration) -> Self {
        self.save_delay = delay;
        self
    }

    /// Retention window used until persisted state says otherwise.
    pub fn default_max_age_days(mut self, days: u32) -> Self {
        self.default_max_age_days = days;
        self
    }

    pub fn build(self) -> HistoryStore {
        let scheduler = SaveScheduler::new(
            Arc::clone(&self.backend),
            self.timer,
            self.executor,
            self.save_delay,
        );
        let shared = Arc::new_cyclic(|self_ref| StoreShared {
            state: Mutex::new(StoreState {
                loaded: false,
                slots: Vec::new(),
                keys: HashMap::new(),
                generation: 0,
                max_age_days: self.default_max_age_days,
            }),
            scheduler,
            backend: self.backend,
            clock: self.clock,
            self_ref: self_ref.clone(),
        });
        HistoryStore { shared }
    }
}

/// Deduplicating, chronologically ordered record of visited addresses.
///
/// Persisted state is loaded on first use. Every change arms a debounced
/// background save; dropping the store performs one final synchronous save.
pub struct HistoryStore {
    shared: Arc<StoreShared>,
}

impl HistoryStore {
    /// Store with thread-based timer and writer, the wall clock and default settings.
    pub fn new(backend: Arc<dyn HistoryBackend>) -> Self {
        Self::builder(backend).build()
    }

    pub fn builder(backend: Arc<dyn HistoryBackend>) -> HistoryStoreBuilder {
        HistoryStoreBuilder {
            backend,
            timer: Arc::new(ThreadTimer),
            executor: Arc::new(ThreadExecutor),
            clock: Arc::new(SystemClock),
            save_delay: Duration::from_millis(DEFAULT_SAVE_DELAY_MS),
            default_max_age_days: DEFAULT_MAX_AGE_DAYS,
        }
    }

    /// Records a visit to `address`.
    ///
    /// A known address is revisited in place. A new one is inserted at its
    /// sorted position and bumps the generation. Returns `false` only if
    /// memory for the new entry could not be reserved.
    pub fn record_visit(&self, address: &str) -> bool {
        let shared = &self.shared;
        let mut state = shared.lock_loaded();
        let now = shared.clock.now();

        if let Some(pos) = state.locate(address) {
            state.slots[pos].entry.revisit_at(now);
            shared.schedule_save();
            return true;
        }

        if let Err(e) = state.insert_new(Entry::new(address, now)) {
            warn!(error = %e, address, "failed to record visit");
            return false;
        }
        state.generation += 1;
        shared.schedule_save();
        true
    }

    /// Removes `address`. Returns `false` without changing anything if it is absent.
    pub fn remove_by_address(&self, address: &str) -> bool {
        let shared = &self.shared;
        let mut state = shared.lock_loaded();

        let Some(pos) = state.locate(address) else {
            return false;
        };
        state.slots.remove(pos);
        state.keys.remove(address);
        state.generation += 1;
        shared.schedule_save();
        true
    }

    /// Removes every entry. Always bumps the generation.
    pub fn clear(&self) {
        let shared = &self.shared;
        let mut state = shared.lock_loaded();
        state.slots.clear();
        state.keys.clear();
        state.generation += 1;
        shared.schedule_save();
    }

    pub fn count(&self) -> usize {
        self.shared.lock_loaded().slots.len()
    }

    /// Entry at `index` in the ordered sequence.
    ///
    /// Indices are not stable across mutating calls.
    pub fn entry_at(&self, index: usize) -> Option<Entry> {
        self.shared
            .lock_loaded()
            .slots
            .get(index)
            .map(|s| s.entry.clone())
    }

    /// Sets the retention window applied the next time history is loaded.
    pub fn set_max_age(&self, days: u32) {
        let shared = &self.shared;
        let mut state = shared.lock_loaded();
        if state.max_age_days != days {
            state.max_age_days = days;
            shared.schedule_save();
        }
    }

    pub fn max_age(&self) -> u32 {
        self.shared.lock_loaded().max_age_days
    }

    /// Counter bumped by inserts of new addresses, removals and clears.
    pub fn generation(&self) -> u64 {
        self.shared.lock_loaded().generation
    }

    pub fn get(&self, address: &str) -> Option<Entry> {
        let state = self.shared.lock_loaded();
        state.locate(address).map(|pos| state.slots[pos].entry.clone())
    }

    pub fn contains(&self, address: &str) -> bool {
        self.shared.lock_loaded().keys.contains_key(address)
    }

    /// Copy of the whole ordered sequence.
    pub fn entries(&self) -> Vec<Entry> {
        self.shared
            .lock_loaded()
            .slots
            .iter()
            .map(|s| s.entry.clone())
            .collect()
    }

    /// Case-insensitive substring match over addresses, most recent first.
    pub fn search(&self, query: &str) -> Vec<Entry> {
        let needle = query.to_lowercase();
        let mut found: Vec<Entry> = self
            .shared
            .lock_loaded()
            .slots
            .iter()
            .filter(|s| s.entry.address.to_lowercase().contains(&needle))
            .map(|s| s.entry.clone())
            .collect();
        sort_most_recent_first(&mut found);
        found
    }

    /// Entries last visited on the given UTC day ("YYYY-MM-DD"), most recent first.
    pub fn entries_on_day(&self, date: &str) -> Result<Vec<Entry>, HistoryError> {
        let start = parse_date_to_timestamp(date)?;
        let end = start + SECONDS_PER_DAY;

        let mut found: Vec<Entry> = self
            .shared
            .lock_loaded()
            .slots
            .iter()
            .filter(|s| (start..end).contains(&s.entry.last_visited))
            .map(|s| s.entry.clone())
            .collect();
        sort_most_recent_first(&mut found);
        Ok(found)
    }

    /// Performs the final synchronous save. Later calls do nothing.
    ///
    /// Changes made after shutdown stay in memory only.
    pub fn shutdown(&self) -> bool {
        self.shared.shutdown()
    }
}

impl Drop for HistoryStore {
    fn drop(&mut self) {
        self.shared.shutdown();
    }
}

fn sort_most_recent_first(entries: &mut [Entry]) {
    entries.sort_by(|a, b| {
        b.last_visited
            .cmp(&a.last_visited)
            .then_with(|| a.address.cmp(&b.address))
    });
}
