//! The data store: sole owner and mutator of the in-memory aggregate.
//!
//! Every mutation is applied to a clone of the current aggregate, saved to
//! the local store, handed to the [`SyncManager`] and only then swapped in.
//! Remote snapshots replace the aggregate wholesale when the sync manager's
//! gate lets them through.

mod carryover;

use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::migration::{self, MigrationOptions};
use crate::models::{
    Aggregate, CompletedQuest, DailyRecord, EndReason, Quest, Session, Settings, SettingsError,
    SettingsPatch,
};
use crate::remote::{RemoteDocument, RemoteSnapshot};
use crate::storage::{self, LocalStore};
use crate::sync::SyncManager;

pub use carryover::CarryoverQuest;

pub struct DataStore {
    aggregate: Mutex<Aggregate>,
    local: Arc<dyn LocalStore>,
    sync: SyncManager,
    clock: Arc<dyn Clock>,
    migration: MigrationOptions,
}

impl DataStore {
    /// Creates a store seeded from the local store. Call [`load`](Self::load)
    /// to migrate legacy data and pick up the remote document.
    pub fn new(local: Arc<dyn LocalStore>, sync: SyncManager, clock: Arc<dyn Clock>) -> Self {
        let aggregate = storage::load_aggregate(local.as_ref(), clock.now());
        Self {
            aggregate: Mutex::new(aggregate),
            local,
            sync,
            clock,
            migration: MigrationOptions::default(),
        }
    }

    pub fn with_migration_options(mut self, options: MigrationOptions) -> Self {
        self.migration = options;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Aggregate> {
        self.aggregate.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn sync(&self) -> &SyncManager {
        &self.sync
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Loads the aggregate from the best available source.
    ///
    /// Order: legacy migration, a deferred local write, the remote document
    /// when signed in, and finally the local store.
    pub async fn load(&self) -> Aggregate {
        let now = self.clock.now();

        if let Some(migrated) =
            migration::run_migration(self.local.as_ref(), now, self.migration)
        {
            self.sync.schedule_write(migrated.clone());
            *self.lock() = migrated.clone();
            return migrated;
        }

        let mut local = storage::load_aggregate(self.local.as_ref(), now);
        local.settings = checked_settings(&local.settings);
        let loaded = match self.sync.session().current_user() {
            None => local,
            Some(user) => {
                if let Some(pending) = self.sync.pending_data() {
                    tracing::info!("Unsynced local changes found, keeping them");
                    self.sync.retry_pending_write();
                    pending
                } else {
                    match self.sync.remote().get_document(&user.uid).await {
                        Ok(Some(document)) => {
                            tracing::info!("Loaded data from remote store");
                            let data = adopt_document(document);
                            storage::save_aggregate(self.local.as_ref(), &data);
                            data
                        }
                        Ok(None) => {
                            tracing::info!("No remote data yet, uploading local data");
                            self.sync.schedule_write(local.clone());
                            local
                        }
                        Err(e) => {
                            tracing::warn!("Failed to load remote data, using local: {}", e);
                            local
                        }
                    }
                }
            }
        };

        *self.lock() = loaded.clone();
        loaded
    }

    /// Applies `mutate` to a copy of the aggregate and commits it when
    /// `mutate` reports a change.
    fn try_commit<E>(
        &self,
        mutate: impl FnOnce(&mut Aggregate, DateTime<Utc>) -> Result<bool, E>,
    ) -> Result<bool, E> {
        let mut current = self.lock();
        let now = self.clock.now();

        let mut next = current.clone();
        if !mutate(&mut next, now)? {
            return Ok(false);
        }
        next.last_updated = now;

        storage::save_aggregate(self.local.as_ref(), &next);
        self.sync.schedule_write(next.clone());
        *current = next;
        Ok(true)
    }

    fn commit(&self, mutate: impl FnOnce(&mut Aggregate, DateTime<Utc>) -> bool) -> bool {
        match self.try_commit::<Infallible>(|data, now| Ok(mutate(data, now))) {
            Ok(changed) => changed,
            Err(never) => match never {},
        }
    }

    pub fn update_settings(&self, patch: &SettingsPatch) -> Result<(), SettingsError> {
        self.try_commit(|data, _| {
            let settings = data.settings.merged(patch);
            settings.validate()?;
            let changed = settings != data.settings;
            data.settings = settings;
            Ok(changed)
        })
        .map(|_| ())
    }

    /// Sets today's active quest; blank text clears it.
    pub fn set_active_quest(&self, text: &str) {
        self.commit(|data, now| {
            data.set_active_quest(text, now);
            true
        });
    }

    pub fn add_completed_quest(&self, quest: CompletedQuest) {
        self.commit(|data, now| {
            data.add_completed_quest(quest, now);
            true
        });
    }

    /// Completes today's active quest. Returns the completed quest, or
    /// `None` when there was nothing to complete.
    pub fn complete_active_quest(&self) -> Option<CompletedQuest> {
        let mut completed = None;
        self.commit(|data, now| {
            let today = data.date_key(now);
            let Some(title) = data
                .record(&today)
                .and_then(|r| r.active_quest.as_ref())
                .map(|q| q.title.clone())
            else {
                return false;
            };
            let quest = CompletedQuest::new(title, now);
            completed = Some(quest.clone());
            data.add_completed_quest(quest, now);
            true
        });
        completed
    }

    /// Deletes a completed quest. Returns false if no quest has that id.
    pub fn delete_quest(&self, id: &str) -> bool {
        self.commit(|data, now| data.delete_quest(id, now))
    }

    pub fn record_session(&self, session: Session) {
        self.commit(|data, now| {
            data.record_session(session, now);
            true
        });
    }

    /// Ends a session; `reason` is `None` for a session that ran to completion.
    pub fn end_session(&self, id: &str, ended_at: DateTime<Utc>, reason: Option<EndReason>) -> bool {
        self.commit(|data, now| data.end_session(id, ended_at, reason, now))
    }

    pub fn increment_today_pomodoro_count(&self) {
        self.commit(|data, now| {
            data.increment_pomodoro_count(now);
            true
        });
    }

    /// Replaces everything, e.g. after importing a backup.
    pub fn replace_all(&self, aggregate: Aggregate) {
        self.commit(|data, _| {
            *data = aggregate;
            true
        });
    }

    pub fn snapshot(&self) -> Aggregate {
        self.lock().clone()
    }

    pub fn settings(&self) -> Settings {
        self.lock().settings.clone()
    }

    /// Key of today's record in the configured timezone.
    pub fn today_key(&self) -> String {
        self.lock().date_key(self.clock.now())
    }

    /// Today's active quest.
    pub fn active_quest(&self) -> Option<Quest> {
        let data = self.lock();
        let today = data.date_key(self.clock.now());
        data.record(&today).and_then(|r| r.active_quest.clone())
    }

    pub fn active_quest_text(&self) -> String {
        self.active_quest().map(|q| q.title).unwrap_or_default()
    }

    pub fn completed_quests(&self) -> Vec<CompletedQuest> {
        self.lock().completed_quests()
    }

    pub fn sessions(&self) -> Vec<Session> {
        self.lock().sessions()
    }

    pub fn today_pomodoro_count(&self) -> u32 {
        let data = self.lock();
        data.pomodoro_count(&data.date_key(self.clock.now()))
    }

    /// Daily records, most recent first.
    pub fn daily_records_desc(&self) -> Vec<DailyRecord> {
        self.lock().daily_records.values().rev().cloned().collect()
    }

    /// Adopts a remote snapshot if the sync manager allows it. Returns
    /// whether the aggregate was replaced.
    pub fn apply_remote_snapshot(&self, snapshot: RemoteSnapshot) -> bool {
        let mut current = self.lock();
        if !self.sync.should_accept_cloud_data(snapshot.has_pending_writes) {
            return false;
        }
        let Some(document) = snapshot.document else {
            return false;
        };

        let data = adopt_document(document);
        if *current == data {
            return false;
        }

        tracing::debug!("Accepting cloud data");
        storage::save_aggregate(self.local.as_ref(), &data);
        *current = data;
        true
    }

    /// Feeds the signed-in user's remote document into
    /// [`apply_remote_snapshot`](Self::apply_remote_snapshot). Returns `None`
    /// when nobody is signed in.
    pub fn subscribe_remote(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let user = self.sync.session().current_user()?;
        let mut snapshots = self.sync.remote().subscribe(&user.uid);
        let store = Arc::downgrade(self);

        Some(tokio::spawn(async move {
            while let Some(snapshot) = snapshots.next().await {
                let Some(store) = store.upgrade() else {
                    break;
                };
                store.apply_remote_snapshot(snapshot);
            }
            tracing::debug!("Remote subscription ended");
        }))
    }

    /// Reloads from the local store, e.g. after signing out.
    pub fn reset_to_local(&self) {
        let data = storage::load_aggregate(self.local.as_ref(), self.clock.now());
        *self.lock() = data;
    }
}

/// Remote document as an aggregate stamped with the server's update time.
fn adopt_document(document: RemoteDocument) -> Aggregate {
    let mut data = document.data;
    if let Some(update_time) = document.update_time {
        data.last_updated = update_time;
    }
    data.settings = checked_settings(&data.settings);
    data
}

/// Settings written by another client or an older build may not validate.
fn checked_settings(settings: &Settings) -> Settings {
    match settings.validate() {
        Ok(()) => settings.clone(),
        Err(e) => {
            tracing::warn!("Replacing invalid settings field with default: {}", e);
            settings.sanitized()
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::time::Duration;

    use crate::auth::{StaticSession, User};
    use crate::clock::FixedClock;
    use crate::migration::LEGACY_COMPLETED_QUESTS_KEY;
    use crate::models::TimerMode;
    use crate::remote::{MemoryRemoteStore, RemoteDocument};
    use crate::storage::{MemoryStore, DATA_KEY};
    use crate::sync::SyncConfig;

    pub(crate) struct Harness {
        pub store: Arc<DataStore>,
        pub local: Arc<MemoryStore>,
        pub remote: MemoryRemoteStore,
        pub session: Arc<StaticSession>,
        pub clock: Arc<FixedClock>,
    }

    pub(crate) fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    pub(crate) fn harness_with(local: Arc<MemoryStore>, session: StaticSession, now: &str) -> Harness {
        let remote = MemoryRemoteStore::new();
        let session = Arc::new(session);
        let clock = Arc::new(FixedClock::new(utc(now)));
        let sync = SyncManager::new(
            local.clone(),
            Arc::new(remote.clone()),
            session.clone(),
            SyncConfig::default(),
        );
        let store = Arc::new(DataStore::new(local.clone(), sync, clock.clone()));
        Harness {
            store,
            local,
            remote,
            session,
            clock,
        }
    }

    pub(crate) fn harness(now: &str) -> Harness {
        harness_with(
            Arc::new(MemoryStore::new()),
            StaticSession::signed_in(User::new("user-1")),
            now,
        )
    }

    pub(crate) async fn wait(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    fn shanghai() -> SettingsPatch {
        SettingsPatch {
            timezone: Some("Asia/Shanghai".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_mutations_save_locally_and_push_once() {
        let h = harness("2025-01-28T08:00:00Z");

        h.store.set_active_quest("focus");
        h.store.increment_today_pomodoro_count();
        h.store.increment_today_pomodoro_count();

        assert_eq!(storage::load_aggregate(h.local.as_ref(), h.clock.now()), h.store.snapshot());
        assert!(h.remote.writes().is_empty());

        wait(2000).await;
        let writes = h.remote.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].data, h.store.snapshot());
        assert_eq!(h.store.today_pomodoro_count(), 2);
        assert_eq!(h.store.active_quest_text(), "focus");
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_bucketed_in_configured_timezone() {
        let h = harness("2025-01-28T16:30:00Z");
        h.store.update_settings(&shanghai()).unwrap();

        h.store
            .add_completed_quest(CompletedQuest::new("late night", h.clock.now()));

        let records = h.store.daily_records_desc();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].date, "2025-01-29");
        assert_eq!(h.store.today_key(), "2025-01-29");
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_settings_rejected_without_commit() {
        let h = harness("2025-01-28T08:00:00Z");
        let before = h.store.snapshot();

        let err = h
            .store
            .update_settings(&SettingsPatch {
                long_break_interval: Some(1),
                ..Default::default()
            })
            .unwrap_err();

        assert_eq!(err, SettingsError::IntervalTooShort(1));
        assert_eq!(h.store.snapshot(), before);
        assert!(!h.store.sync().has_pending_changes());
    }

    #[tokio::test(start_paused = true)]
    async fn test_active_quest_unique_across_days() {
        let h = harness("2025-01-27T08:00:00Z");
        h.store.set_active_quest("monday");
        h.clock.advance(chrono::Duration::days(1));
        h.store.set_active_quest("tuesday");

        let active: Vec<Quest> = h
            .store
            .daily_records_desc()
            .into_iter()
            .filter_map(|r| r.active_quest)
            .collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].title, "tuesday");
    }

    #[tokio::test(start_paused = true)]
    async fn test_complete_active_quest() {
        let h = harness("2025-01-28T08:00:00Z");
        assert!(h.store.complete_active_quest().is_none());

        h.store.set_active_quest("write tests");
        let done = h.store.complete_active_quest().unwrap();

        assert_eq!(done.title, "write tests");
        assert!(h.store.active_quest().is_none());
        assert_eq!(h.store.completed_quests(), vec![done.clone()]);

        assert!(h.store.delete_quest(&done.id));
        assert!(!h.store.delete_quest(&done.id));
        assert!(h.store.completed_quests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_lifecycle() {
        let h = harness("2025-01-28T08:00:00Z");
        let session = Session::start(TimerMode::Work, h.clock.now());
        let id = session.id.clone();

        h.store.record_session(session);
        assert!(h.store.sessions()[0].is_running());

        let ended_at = h.clock.now() + chrono::Duration::minutes(25);
        assert!(h.store.end_session(&id, ended_at, None));
        let ended = &h.store.sessions()[0];
        assert!(ended.completed);
        assert_eq!(ended.ended_at, Some(ended_at));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_snapshot_gate() {
        let h = harness("2025-01-28T08:00:00Z");
        let now = h.clock.now();
        let mut theirs = Aggregate::empty(now);
        theirs.set_active_quest("from laptop", now);
        let snapshot = |pending| RemoteSnapshot {
            document: Some(RemoteDocument {
                data: theirs.clone(),
                update_time: Some(now),
            }),
            has_pending_writes: pending,
        };

        assert!(!h.store.apply_remote_snapshot(snapshot(true)));

        h.store.set_active_quest("local edit");
        assert!(!h.store.apply_remote_snapshot(snapshot(false)));
        assert_eq!(h.store.active_quest_text(), "local edit");

        wait(2000).await;
        assert!(h.store.apply_remote_snapshot(snapshot(false)));
        assert_eq!(h.store.active_quest_text(), "from laptop");
        assert_eq!(
            storage::load_aggregate(h.local.as_ref(), now).daily_records,
            theirs.daily_records
        );
        // Adopting cloud data never pushes it back.
        assert_eq!(h.remote.writes().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_settings_checked_on_adoption() {
        let h = harness("2025-01-28T08:00:00Z");
        let now = h.clock.now();
        let mut theirs = Aggregate::empty(now);
        theirs.settings.long_break_interval = 1;
        theirs.settings.work_duration = 40;

        assert!(h.store.apply_remote_snapshot(RemoteSnapshot {
            document: Some(RemoteDocument {
                data: theirs.clone(),
                update_time: Some(now),
            }),
            has_pending_writes: false,
        }));
        let settings = h.store.settings();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.long_break_interval, 4);
        assert_eq!(settings.work_duration, 40);

        theirs.settings.timezone = "Nowhere/City".to_string();
        h.remote.put_from_other_device("user-1", theirs);
        let loaded = h.store.load().await;
        assert_eq!(loaded.settings.timezone, "America/Los_Angeles");
        assert_eq!(loaded.settings.long_break_interval, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_adopts_remote_document() {
        let h = harness("2025-01-28T08:00:00Z");
        let now = h.clock.now();
        let mut theirs = Aggregate::empty(now);
        theirs.add_completed_quest(CompletedQuest::new("synced", now), now);
        h.remote.put_from_other_device("user-1", theirs.clone());

        let loaded = h.store.load().await;

        assert_eq!(loaded.daily_records, theirs.daily_records);
        assert_eq!(h.store.completed_quests()[0].title, "synced");
        assert!(h.local.contains(DATA_KEY));
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_uploads_local_when_remote_empty() {
        let local = Arc::new(MemoryStore::new());
        let now = utc("2025-01-28T08:00:00Z");
        let mut mine = Aggregate::empty(now);
        mine.set_active_quest("offline", now);
        storage::save_aggregate(local.as_ref(), &mine);

        let h = harness_with(local, StaticSession::signed_in(User::new("user-1")), "2025-01-28T08:00:00Z");
        h.store.load().await;
        wait(2000).await;

        let document = h.remote.document("user-1").unwrap();
        assert_eq!(document.data, mine);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_migrates_legacy_data() {
        let local = Arc::new(MemoryStore::new());
        local
            .set(
                LEGACY_COMPLETED_QUESTS_KEY,
                r#"[{"id":"q1","title":"legacy","completedAt":1737964800000}]"#,
            )
            .unwrap();

        let h = harness_with(local, StaticSession::signed_out(), "2025-01-28T08:00:00Z");
        let loaded = h.store.load().await;

        assert_eq!(loaded.completed_quests()[0].id, "q1");
        assert_eq!(h.store.completed_quests()[0].title, "legacy");
        assert!(h.local.contains(DATA_KEY));
    }

    #[tokio::test(start_paused = true)]
    async fn test_signed_out_changes_pushed_after_login() {
        let h = harness_with(
            Arc::new(MemoryStore::new()),
            StaticSession::signed_out(),
            "2025-01-28T08:00:00Z",
        );
        let _watcher = h.store.sync().watch_session();

        h.store.set_active_quest("offline quest");
        wait(3000).await;
        assert!(h.remote.writes().is_empty());
        assert!(h.local.contains(DATA_KEY));

        h.session.sign_in_as(User::new("user-1"));
        wait(3000).await;

        let writes = h.remote.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].data, h.store.snapshot());
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscription_applies_other_device_changes() {
        let h = harness("2025-01-28T08:00:00Z");
        let _subscription = h.store.subscribe_remote().unwrap();
        wait(10).await;

        let now = h.clock.now();
        let mut theirs = Aggregate::empty(now);
        theirs.set_active_quest("phone", now);
        h.remote.put_from_other_device("user-1", theirs);
        wait(10).await;

        assert_eq!(h.store.active_quest_text(), "phone");
    }

    #[tokio::test(start_paused = true)]
    async fn test_own_echo_does_not_clobber_newer_edit() {
        let h = harness("2025-01-28T08:00:00Z");
        let _subscription = h.store.subscribe_remote().unwrap();
        h.remote.hold_writes();

        h.store.set_active_quest("first");
        wait(1300).await;
        h.store.set_active_quest("second");
        h.remote.release_writes(2);
        wait(3000).await;

        assert_eq!(h.store.active_quest_text(), "second");
        assert_eq!(
            h.remote.document("user-1").unwrap().data.daily_records,
            h.store.snapshot().daily_records
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_to_local() {
        let h = harness("2025-01-28T08:00:00Z");
        h.store.set_active_quest("kept");
        wait(2000).await;

        let now = h.clock.now();
        let mut theirs = Aggregate::empty(now);
        theirs.set_active_quest("remote", now);
        h.store.apply_remote_snapshot(RemoteSnapshot {
            document: Some(RemoteDocument {
                data: theirs,
                update_time: Some(now),
            }),
            has_pending_writes: false,
        });
        h.local.set(DATA_KEY, "{broken").unwrap();

        h.store.reset_to_local();
        assert!(h.store.active_quest().is_none());
        assert_eq!(h.store.settings(), Settings::default());
    }
}
