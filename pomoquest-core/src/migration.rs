//! One-shot migration from the legacy per-field keys to the aggregate, and
//! JSON backup export/import of the aggregate.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::models::{Aggregate, CompletedQuest, Settings, SettingsError};
use crate::storage::{self, LocalStore, StoreError, DATA_KEY};

pub const LEGACY_SETTINGS_KEY: &str = "pomodoro-settings";
pub const LEGACY_TASK_KEY: &str = "pomodoro-task";
pub const LEGACY_COMPLETED_QUESTS_KEY: &str = "pomodoro-completed-quests";
pub const LEGACY_SESSION_COUNT_KEY: &str = "pomodoro-session-count";

const LEGACY_KEYS: [&str; 4] = [
    LEGACY_SETTINGS_KEY,
    LEGACY_TASK_KEY,
    LEGACY_COMPLETED_QUESTS_KEY,
    LEGACY_SESSION_COUNT_KEY,
];

#[derive(Debug, Clone, Copy, Default)]
pub struct MigrationOptions {
    /// Remove the legacy keys after a successful migration.
    pub cleanup_legacy_keys: bool,
}

/// Errors that can occur while migrating, exporting or importing data.
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("No data to export")]
    NoData,

    #[error("Invalid data: {0}")]
    InvalidData(#[from] serde_json::Error),

    #[error("Invalid settings: {0}")]
    InvalidSettings(#[from] SettingsError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyQuest {
    #[serde(default)]
    id: Option<Value>,
    title: String,
    /// Milliseconds since the Unix epoch
    completed_at: i64,
}

impl LegacyQuest {
    fn into_completed(self, fallback: DateTime<Utc>) -> CompletedQuest {
        let completed_at = DateTime::from_timestamp_millis(self.completed_at).unwrap_or(fallback);
        let mut quest = CompletedQuest::new(self.title, completed_at);
        match self.id {
            Some(Value::String(id)) if !id.is_empty() => quest.id = id,
            Some(Value::Number(id)) => quest.id = id.to_string(),
            _ => {}
        }
        quest
    }
}

/// True when legacy data exists and the aggregate has not been written yet.
pub fn needs_migration(store: &dyn LocalStore) -> bool {
    let has_legacy =
        store.contains(LEGACY_SETTINGS_KEY) || store.contains(LEGACY_COMPLETED_QUESTS_KEY);
    has_legacy && !store.contains(DATA_KEY)
}

/// Builds an aggregate from the legacy keys and stores it under the current key.
pub fn migrate(store: &dyn LocalStore, now: DateTime<Utc>) -> Result<Aggregate, MigrationError> {
    tracing::info!("Starting data migration");

    let mut aggregate = Aggregate::empty(now);
    aggregate.settings = legacy_settings(store);

    let today = aggregate.date_key(now);
    let quests = legacy_quests(store, now);
    tracing::info!("Migrated {} completed quests", quests.len());

    let record = aggregate.record_mut(&today, now);
    record
        .completed_quests
        .extend(quests.into_iter().map(CompletedQuest::into_quest));
    record.pomodoro_count = legacy_session_count(store);

    if let Some(task) = store.get(LEGACY_TASK_KEY) {
        let task = legacy_string(&task);
        if !task.trim().is_empty() {
            aggregate.set_active_quest(&task, now);
            tracing::info!("Migrated current task");
        }
    }

    if aggregate.record(&today).is_some_and(|r| r.is_empty()) {
        aggregate.daily_records.remove(&today);
    }

    storage::write_aggregate(store, DATA_KEY, &aggregate)?;
    tracing::info!("Migration complete");
    Ok(aggregate)
}

pub fn cleanup_legacy_keys(store: &dyn LocalStore) -> Result<(), StoreError> {
    tracing::info!("Cleaning up legacy keys");
    for key in LEGACY_KEYS {
        store.remove(key)?;
    }
    Ok(())
}

/// Migrates if needed. Returns the migrated aggregate, or `None` when no
/// migration ran or it failed (failures are logged).
pub fn run_migration(
    store: &dyn LocalStore,
    now: DateTime<Utc>,
    options: MigrationOptions,
) -> Option<Aggregate> {
    if !needs_migration(store) {
        tracing::debug!("No migration needed");
        return None;
    }

    match migrate(store, now) {
        Ok(aggregate) => {
            if options.cleanup_legacy_keys {
                if let Err(e) = cleanup_legacy_keys(store) {
                    tracing::warn!("Failed to remove legacy keys: {}", e);
                }
            }
            Some(aggregate)
        }
        Err(e) => {
            tracing::error!("Migration failed: {}", e);
            None
        }
    }
}

/// Pretty-printed JSON of the stored aggregate.
pub fn export_data(store: &dyn LocalStore) -> Result<String, MigrationError> {
    let raw = store.get(DATA_KEY).ok_or(MigrationError::NoData)?;
    let value: Value = serde_json::from_str(&raw)?;
    Ok(serde_json::to_string_pretty(&value)?)
}

/// Replaces the stored aggregate with `json` once it parses as one with
/// valid settings.
pub fn import_data(store: &dyn LocalStore, json: &str) -> Result<Aggregate, MigrationError> {
    let aggregate: Aggregate = serde_json::from_str(json)?;
    aggregate.settings.validate()?;
    storage::write_aggregate(store, DATA_KEY, &aggregate)?;
    tracing::info!("Data imported successfully");
    Ok(aggregate)
}

/// Legacy settings merged over the defaults. Missing, mistyped or invalid
/// fields keep the default.
fn legacy_settings(store: &dyn LocalStore) -> Settings {
    let defaults = Settings::default();
    let Some(raw) = store.get(LEGACY_SETTINGS_KEY) else {
        return defaults;
    };
    let parsed: Value = match serde_json::from_str(&raw) {
        Ok(Value::Object(map)) => Value::Object(map),
        _ => {
            tracing::warn!("Failed to parse legacy settings, using defaults");
            return defaults;
        }
    };

    let minutes = |field: &str, default: u32| {
        parsed
            .get(field)
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(default)
    };
    let text = |field: &str, default: &str| {
        parsed
            .get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(default)
            .to_string()
    };

    Settings {
        work_duration: minutes("workDuration", defaults.work_duration),
        short_break_duration: minutes("shortBreakDuration", defaults.short_break_duration),
        long_break_duration: minutes("longBreakDuration", defaults.long_break_duration),
        long_break_interval: minutes("longBreakInterval", defaults.long_break_interval),
        sound_enabled: parsed
            .get("soundEnabled")
            .and_then(Value::as_bool)
            .unwrap_or(defaults.sound_enabled),
        theme: text("theme", &defaults.theme),
        timezone: text("timezone", &defaults.timezone),
    }
    .sanitized()
}

fn legacy_quests(store: &dyn LocalStore, now: DateTime<Utc>) -> Vec<CompletedQuest> {
    let Some(raw) = store.get(LEGACY_COMPLETED_QUESTS_KEY) else {
        return Vec::new();
    };
    let entries = match serde_json::from_str::<Vec<Value>>(&raw) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("Failed to parse legacy completed quests: {}", e);
            return Vec::new();
        }
    };

    entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| match serde_json::from_value::<LegacyQuest>(entry) {
            Ok(quest) => Some(quest.into_completed(now)),
            Err(e) => {
                tracing::warn!("Skipping legacy quest {}: {}", index, e);
                None
            }
        })
        .collect()
}

fn legacy_session_count(store: &dyn LocalStore) -> u32 {
    store
        .get(LEGACY_SESSION_COUNT_KEY)
        .and_then(|raw| legacy_string(&raw).trim().parse().ok())
        .unwrap_or(0)
}

/// Legacy scalars were stored either raw or JSON-encoded.
fn legacy_string(raw: &str) -> String {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::String(s)) => s,
        _ => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ACTIVE_QUEST_ID;
    use crate::storage::MemoryStore;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn legacy_store() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .set(
                LEGACY_SETTINGS_KEY,
                r#"{"workDuration":50,"shortBreakDuration":0,"soundEnabled":false,"theme":"light"}"#,
            )
            .unwrap();
        store
            .set(
                LEGACY_COMPLETED_QUESTS_KEY,
                r#"[{"id":"q1","title":"read","completedAt":1737964800000},
                    {"id":1737964900000,"title":"write","completedAt":1737964900000}]"#,
            )
            .unwrap();
        store.set(LEGACY_TASK_KEY, "\"ship it\"").unwrap();
        store.set(LEGACY_SESSION_COUNT_KEY, "3").unwrap();
        store
    }

    #[test]
    fn test_needs_migration() {
        let store = MemoryStore::new();
        assert!(!needs_migration(&store));

        store.set(LEGACY_TASK_KEY, "only a task").unwrap();
        assert!(!needs_migration(&store));

        store.set(LEGACY_COMPLETED_QUESTS_KEY, "[]").unwrap();
        assert!(needs_migration(&store));

        store.set(DATA_KEY, "{}").unwrap();
        assert!(!needs_migration(&store));
    }

    #[test]
    fn test_migrate_reshapes_legacy_data() {
        let store = legacy_store();
        let now = utc("2025-01-28T20:00:00Z");

        let aggregate = migrate(&store, now).unwrap();

        assert_eq!(aggregate.settings.work_duration, 50);
        assert_eq!(aggregate.settings.short_break_duration, 5);
        assert!(!aggregate.settings.sound_enabled);
        assert_eq!(aggregate.settings.theme, "light");
        assert_eq!(aggregate.settings.timezone, "America/Los_Angeles");

        let today = aggregate.date_key(now);
        let record = aggregate.record(&today).unwrap();
        assert_eq!(record.completed_quests.len(), 2);
        assert_eq!(record.completed_quests[1].id, "1737964900000");
        assert_eq!(record.pomodoro_count, 3);

        let active = record.active_quest.as_ref().unwrap();
        assert_eq!(active.id, ACTIVE_QUEST_ID);
        assert_eq!(active.title, "ship it");
    }

    #[test]
    fn test_migrated_round_trip_through_store() {
        let store = legacy_store();
        let now = utc("2025-01-28T20:00:00Z");

        let migrated = run_migration(&store, now, MigrationOptions::default()).unwrap();

        assert_eq!(storage::load_aggregate(&store, now), migrated);
        assert!(store.contains(LEGACY_SETTINGS_KEY));
        assert!(run_migration(&store, now, MigrationOptions::default()).is_none());
    }

    #[test]
    fn test_cleanup_option_removes_legacy_keys() {
        let store = legacy_store();
        let options = MigrationOptions {
            cleanup_legacy_keys: true,
        };

        run_migration(&store, Utc::now(), options).unwrap();

        for key in LEGACY_KEYS {
            assert!(!store.contains(key));
        }
        assert!(store.contains(DATA_KEY));
    }

    #[test]
    fn test_malformed_legacy_values_fall_back() {
        let store = MemoryStore::new();
        store.set(LEGACY_SETTINGS_KEY, "{oops").unwrap();
        store.set(LEGACY_COMPLETED_QUESTS_KEY, "not a list").unwrap();

        let aggregate = run_migration(&store, Utc::now(), MigrationOptions::default()).unwrap();
        assert_eq!(aggregate.settings, Settings::default());
        assert!(aggregate.daily_records.is_empty());
    }

    #[test]
    fn test_bad_legacy_quest_skipped_alone() {
        let store = MemoryStore::new();
        store
            .set(
                LEGACY_COMPLETED_QUESTS_KEY,
                r#"[{"id":"q1","title":"read","completedAt":1737964800000},
                    {"id":"q2","title":"write","completedAt":1737964900000},
                    {"id":"q3","title":null,"completedAt":1737965000000},
                    {"id":"q4","title":"edit","completedAt":"yesterday"}]"#,
            )
            .unwrap();

        let aggregate = run_migration(&store, Utc::now(), MigrationOptions::default()).unwrap();
        let titles: Vec<_> = aggregate
            .completed_quests()
            .into_iter()
            .map(|q| q.title.clone())
            .collect();
        assert_eq!(titles.len(), 2);
        assert!(titles.contains(&"read".to_string()));
        assert!(titles.contains(&"write".to_string()));
    }

    #[test]
    fn test_invalid_legacy_settings_use_defaults() {
        let store = MemoryStore::new();
        store
            .set(
                LEGACY_SETTINGS_KEY,
                r#"{"workDuration":45,"longBreakInterval":1,"timezone":"Nowhere/City"}"#,
            )
            .unwrap();

        let aggregate = run_migration(&store, Utc::now(), MigrationOptions::default()).unwrap();
        assert!(aggregate.settings.validate().is_ok());
        assert_eq!(aggregate.settings.work_duration, 45);
        assert_eq!(aggregate.settings.long_break_interval, 4);
        assert_eq!(aggregate.settings.timezone, "America/Los_Angeles");
    }

    #[test]
    fn test_import_rejects_invalid_settings() {
        let store = MemoryStore::new();
        let now = utc("2025-01-28T20:00:00Z");
        let mut aggregate = Aggregate::empty(now);
        aggregate.settings.work_duration = 0;
        aggregate.settings.long_break_interval = 0;
        let json = serde_json::to_string(&aggregate).unwrap();

        assert!(matches!(
            import_data(&store, &json),
            Err(MigrationError::InvalidSettings(_))
        ));
        assert!(!store.contains(DATA_KEY));

        aggregate.settings = Settings {
            timezone: "Nowhere/City".to_string(),
            ..Settings::default()
        };
        let json = serde_json::to_string(&aggregate).unwrap();
        assert!(import_data(&store, &json).is_err());
        assert!(!store.contains(DATA_KEY));
    }

    #[test]
    fn test_export_import() {
        let store = MemoryStore::new();
        assert!(matches!(export_data(&store), Err(MigrationError::NoData)));

        let now = utc("2025-01-28T20:00:00Z");
        let mut aggregate = Aggregate::empty(now);
        aggregate.set_active_quest("focus", now);
        storage::save_aggregate(&store, &aggregate);

        let exported = export_data(&store).unwrap();
        assert!(exported.contains('\n'));

        let other = MemoryStore::new();
        let imported = import_data(&other, &exported).unwrap();
        assert_eq!(imported, aggregate);
        assert_eq!(storage::load_aggregate(&other, now), aggregate);
    }

    #[test]
    fn test_import_rejects_invalid_json() {
        let store = MemoryStore::new();
        assert!(matches!(
            import_data(&store, "[1, 2]"),
            Err(MigrationError::InvalidData(_))
        ));
        assert!(!store.contains(DATA_KEY));
    }
}
