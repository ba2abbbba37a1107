//! Local key-value persistence.
//!
//! The local store is the durable fallback and the source of truth while
//! nobody is signed in. Values are JSON strings keyed by name, mirroring
//! the browser storage the data was first kept in.

mod file;
mod memory;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::Aggregate;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Key holding the current-format aggregate.
pub const DATA_KEY: &str = "pomodoro_data_v3";
/// Key holding the aggregate awaiting a confirmed remote push.
pub const PENDING_WRITE_KEY: &str = "pomodoro_pending_write";
/// Key holding the time of the last confirmed push.
pub const LAST_SYNCED_KEY: &str = "pomodoro_last_synced";

/// Errors that can occur in local store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error for key '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid key '{0}'")]
    InvalidKey(String),

    #[error("Failed to encode value: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Synchronous string store.
pub trait LocalStore: Send + Sync {
    /// Returns the value for `key`, or `None` if absent or unreadable.
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    fn remove(&self, key: &str) -> Result<(), StoreError>;

    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// Reads and parses an aggregate stored under `key`.
///
/// Corrupt JSON is logged and treated as absent.
pub fn read_aggregate(store: &dyn LocalStore, key: &str) -> Option<Aggregate> {
    let raw = store.get(key)?;
    match serde_json::from_str(&raw) {
        Ok(aggregate) => Some(aggregate),
        Err(e) => {
            tracing::error!("Failed to parse stored data under '{}': {}", key, e);
            None
        }
    }
}

/// Serializes `aggregate` under `key`.
pub fn write_aggregate(
    store: &dyn LocalStore,
    key: &str,
    aggregate: &Aggregate,
) -> Result<(), StoreError> {
    let json = serde_json::to_string(aggregate)?;
    store.set(key, &json)
}

/// Loads the current aggregate, falling back to an empty one.
pub fn load_aggregate(store: &dyn LocalStore, now: DateTime<Utc>) -> Aggregate {
    read_aggregate(store, DATA_KEY).unwrap_or_else(|| Aggregate::empty(now))
}

/// Saves the current aggregate. Failures are logged, not returned.
pub fn save_aggregate(store: &dyn LocalStore, aggregate: &Aggregate) {
    if let Err(e) = write_aggregate(store, DATA_KEY, aggregate) {
        tracing::error!("Failed to save data locally: {}", e);
    }
}

pub fn load_last_synced(store: &dyn LocalStore) -> Option<DateTime<Utc>> {
    let raw = store.get(LAST_SYNCED_KEY)?;
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|t| t.with_timezone(&Utc))
        .ok()
}

pub fn save_last_synced(store: &dyn LocalStore, at: DateTime<Utc>) {
    if let Err(e) = store.set(LAST_SYNCED_KEY, &at.to_rfc3339()) {
        tracing::warn!("Failed to record last sync time: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CompletedQuest;

    #[test]
    fn test_aggregate_roundtrip_through_store() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let mut aggregate = Aggregate::empty(now);
        aggregate.set_active_quest("focus", now);
        aggregate.add_completed_quest(CompletedQuest::new("done", now), now);

        save_aggregate(&store, &aggregate);
        assert_eq!(load_aggregate(&store, now), aggregate);
    }

    #[test]
    fn test_corrupt_data_falls_back_to_empty() {
        let store = MemoryStore::new();
        store.set(DATA_KEY, "{not json").unwrap();

        let now = Utc::now();
        let loaded = load_aggregate(&store, now);
        assert!(loaded.daily_records.is_empty());
        assert_eq!(loaded.settings, crate::models::Settings::default());
    }

    #[test]
    fn test_last_synced_roundtrip() {
        let store = MemoryStore::new();
        assert!(load_last_synced(&store).is_none());

        let at = DateTime::parse_from_rfc3339("2025-01-28T16:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        save_last_synced(&store, at);
        assert_eq!(load_last_synced(&store), Some(at));
    }
}
