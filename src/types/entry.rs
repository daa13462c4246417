use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current UNIX timestamp in seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// One visited address.
///
/// Field names on the wire follow the persisted layout:
/// `{"address": ..., "lastVisited": ..., "visitCount": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub address: String,
    pub last_visited: i64,
    pub visit_count: u32,
}

impl Entry {
    /// Creates the entry for a first visit at `last_visited`.
    pub fn new(address: impl Into<String>, last_visited: i64) -> Self {
        Self {
            address: address.into(),
            last_visited,
            visit_count: 1,
        }
    }

    /// Marks another visit happening now.
    pub fn revisit(&mut self) {
        self.revisit_at(unix_now());
    }

    /// Marks another visit at `now`. The counter saturates instead of wrapping.
    pub fn revisit_at(&mut self, now: i64) {
        self.last_visited = now;
        self.visit_count = self.visit_count.saturating_add(1);
    }

    /// Ordering key for the chronological sequence.
    pub fn sort_key(&self) -> (i64, &str) {
        (self.last_visited, self.address.as_str())
    }
}
