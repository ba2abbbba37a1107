use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use super::state::{DeferReason, SyncConfig, SyncPhase, SyncStatus};
use crate::auth::SessionProvider;
use crate::models::Aggregate;
use crate::remote::{RemoteError, RemoteStore};
use crate::storage::{self, LocalStore, PENDING_WRITE_KEY};

/// An aggregate waiting to be pushed. `revision` increases with every
/// scheduled write so a finished push can tell whether it is still the newest.
#[derive(Debug, Clone)]
struct PendingWrite {
    data: Aggregate,
    revision: u64,
}

struct SyncState {
    phase: SyncPhase,
    pending: Option<PendingWrite>,
    revision: u64,
    debounce: Option<JoinHandle<()>>,
    last_synced_at: Option<DateTime<Utc>>,
}

enum PushOutcome {
    Written(DateTime<Utc>),
    Throttled,
    Unauthenticated,
    Exhausted,
}

struct Inner {
    local: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteStore>,
    session: Arc<dyn SessionProvider>,
    config: SyncConfig,
    state: Mutex<SyncState>,
}

/// Debounced, single-flight pusher of the aggregate to the remote store.
///
/// Cloning is cheap and clones share state; timer tasks hold clones.
/// Scheduling spawns tasks, so it must be called from within a tokio runtime.
#[derive(Clone)]
pub struct SyncManager {
    inner: Arc<Inner>,
}

impl SyncManager {
    /// Creates a manager, restoring the last sync time and any write a
    /// previous run left unconfirmed.
    pub fn new(
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        session: Arc<dyn SessionProvider>,
        config: SyncConfig,
    ) -> Self {
        let last_synced_at = storage::load_last_synced(local.as_ref());
        let restored = storage::read_aggregate(local.as_ref(), PENDING_WRITE_KEY);

        let (phase, pending, revision) = match restored {
            Some(data) => {
                tracing::info!("Restored unconfirmed write from previous run");
                (
                    SyncPhase::Deferred(DeferReason::Restored),
                    Some(PendingWrite { data, revision: 1 }),
                    1,
                )
            }
            None => (SyncPhase::Idle, None, 0),
        };

        Self {
            inner: Arc::new(Inner {
                local,
                remote,
                session,
                config,
                state: Mutex::new(SyncState {
                    phase,
                    pending,
                    revision,
                    debounce: None,
                    last_synced_at,
                }),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SyncState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.inner.remote
    }

    pub fn session(&self) -> &Arc<dyn SessionProvider> {
        &self.inner.session
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn status(&self) -> SyncStatus {
        let state = self.lock();
        SyncStatus {
            phase: state.phase,
            has_pending: state.pending.is_some(),
            last_synced_at: state.last_synced_at,
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.lock().phase
    }

    /// True while a write is pending or being pushed.
    pub fn has_pending_changes(&self) -> bool {
        let state = self.lock();
        state.pending.is_some() || state.phase.is_in_flight()
    }

    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.lock().last_synced_at
    }

    /// The aggregate waiting to be pushed, if any.
    pub fn pending_data(&self) -> Option<Aggregate> {
        self.lock().pending.as_ref().map(|p| p.data.clone())
    }

    /// Records `data` as the write to push and restarts the debounce timer.
    ///
    /// Calls within the debounce window replace each other; only the last
    /// payload is pushed.
    pub fn schedule_write(&self, data: Aggregate) {
        let mut state = self.lock();

        if let Err(e) = storage::write_aggregate(self.inner.local.as_ref(), PENDING_WRITE_KEY, &data)
        {
            tracing::warn!("Failed to persist pending write: {}", e);
        }

        state.revision += 1;
        state.pending = Some(PendingWrite {
            data,
            revision: state.revision,
        });

        if let Some(timer) = state.debounce.take() {
            timer.abort();
        }

        let manager = self.clone();
        let delay = self.inner.config.debounce;
        // The flush runs in its own task so aborting the timer never
        // cancels a push that already started.
        state.debounce = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tokio::spawn(async move { manager.flush().await });
        }));

        if !state.phase.is_in_flight() {
            state.phase = SyncPhase::Debounced;
        }
        tracing::debug!("Write scheduled, flushing in {:?}", delay);
    }

    /// Skips the debounce and pushes now.
    pub async fn force_write(&self) {
        if let Some(timer) = self.lock().debounce.take() {
            timer.abort();
        }
        self.flush().await;
    }

    /// Re-schedules the pending write, if any and none is in flight.
    ///
    /// Called on reconnect and on sign-in.
    pub fn retry_pending_write(&self) {
        let data = {
            let state = self.lock();
            if state.phase.is_in_flight() {
                return;
            }
            match &state.pending {
                Some(pending) => pending.data.clone(),
                None => return,
            }
        };
        tracing::info!("Retrying pending write");
        self.schedule_write(data);
    }

    /// Drops the pending write and its recovery copy.
    pub fn clear_pending(&self) {
        let mut state = self.lock();
        if let Some(timer) = state.debounce.take() {
            timer.abort();
        }
        state.pending = None;
        if !state.phase.is_in_flight() {
            state.phase = SyncPhase::Idle;
        }
        if let Err(e) = self.inner.local.remove(PENDING_WRITE_KEY) {
            tracing::warn!("Failed to clear pending write: {}", e);
        }
    }

    /// Whether an incoming remote snapshot may replace local state.
    ///
    /// Rejects local echoes, and anything arriving while a local write is
    /// pending or in flight.
    pub fn should_accept_cloud_data(&self, has_pending_writes: bool) -> bool {
        if has_pending_writes {
            tracing::debug!("Ignoring snapshot: local echo");
            return false;
        }
        let state = self.lock();
        if state.pending.is_some() {
            tracing::debug!("Rejecting cloud data: pending write exists");
            return false;
        }
        if state.phase.is_in_flight() {
            tracing::debug!("Rejecting cloud data: write in progress");
            return false;
        }
        true
    }

    /// Spawns a task that retries the pending write on every sign-in.
    pub fn watch_session(&self) -> JoinHandle<()> {
        let mut rx = self.inner.session.watch();
        let manager = self.clone();

        tokio::spawn(async move {
            let mut signed_in = rx.borrow_and_update().is_some();
            while rx.changed().await.is_ok() {
                let now_signed_in = rx.borrow_and_update().is_some();
                if now_signed_in && !signed_in {
                    manager.retry_pending_write();
                }
                signed_in = now_signed_in;
            }
        })
    }

    /// Pushes the pending write. Runs at most one push at a time; a flush
    /// requested meanwhile is remembered and run once the current one ends.
    pub(crate) async fn flush(&self) {
        loop {
            let Some((user_id, pending)) = self.begin_flush() else {
                return;
            };
            let outcome = self.push(&user_id, &pending.data).await;
            if !self.finish_flush(pending.revision, outcome) {
                return;
            }
        }
    }

    fn begin_flush(&self) -> Option<(String, PendingWrite)> {
        let mut state = self.lock();

        if state.phase.is_in_flight() {
            state.phase = state.phase.with_rerun();
            return None;
        }

        let Some(pending) = state.pending.clone() else {
            state.phase = SyncPhase::Idle;
            return None;
        };

        let Some(user) = self.inner.session.current_user() else {
            tracing::warn!("Not signed in, keeping pending write for later");
            state.phase = SyncPhase::Deferred(DeferReason::NotAuthenticated);
            return None;
        };

        state.phase = SyncPhase::Writing {
            attempt: 1,
            rerun_requested: false,
        };
        Some((user.uid, pending))
    }

    async fn push(&self, user_id: &str, data: &Aggregate) -> PushOutcome {
        let config = &self.inner.config;
        let mut attempt = 1;

        loop {
            {
                let mut state = self.lock();
                let rerun_requested = state.phase.rerun_requested();
                state.phase = SyncPhase::Writing {
                    attempt,
                    rerun_requested,
                };
            }

            match self.inner.remote.set_document(user_id, data).await {
                Ok(written_at) => {
                    tracing::info!("Write successful");
                    return PushOutcome::Written(written_at);
                }
                Err(e) if e.is_throttled() => {
                    tracing::warn!("{} (rate limit?), will retry later", e);
                    return PushOutcome::Throttled;
                }
                Err(RemoteError::Unauthenticated) => {
                    tracing::warn!("Remote store rejected credentials, keeping write for later");
                    return PushOutcome::Unauthenticated;
                }
                Err(e) => {
                    tracing::warn!(
                        "Write failed, attempt {}/{}: {}",
                        attempt,
                        config.max_retries,
                        e
                    );
                    if attempt >= config.max_retries {
                        return PushOutcome::Exhausted;
                    }
                    {
                        let mut state = self.lock();
                        let rerun_requested = state.phase.rerun_requested();
                        state.phase = SyncPhase::Retrying {
                            attempt,
                            rerun_requested,
                        };
                    }
                    tokio::time::sleep(config.backoff(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Settles state after a push. Returns true if another flush should run.
    fn finish_flush(&self, revision: u64, outcome: PushOutcome) -> bool {
        let mut state = self.lock();
        let rerun = state.phase.rerun_requested();
        let superseded = state
            .pending
            .as_ref()
            .is_some_and(|p| p.revision != revision);

        match outcome {
            PushOutcome::Written(written_at) => {
                state.last_synced_at = Some(written_at);
                storage::save_last_synced(self.inner.local.as_ref(), written_at);

                if superseded {
                    // A newer write arrived mid-push; its timer or the rerun
                    // flag will push it.
                    state.phase = SyncPhase::Debounced;
                } else {
                    state.pending = None;
                    state.phase = SyncPhase::Idle;
                    if let Err(e) = self.inner.local.remove(PENDING_WRITE_KEY) {
                        tracing::warn!("Failed to clear pending write: {}", e);
                    }
                }
            }
            PushOutcome::Throttled => {
                state.phase = SyncPhase::Deferred(DeferReason::Throttled);
                let manager = self.clone();
                let delay = self.inner.config.throttle_delay;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    manager.retry_pending_write();
                });
                return false;
            }
            PushOutcome::Unauthenticated => {
                state.phase = SyncPhase::Deferred(DeferReason::NotAuthenticated);
                return false;
            }
            PushOutcome::Exhausted if superseded => {
                tracing::warn!("Failed to write after all retries, a newer write is queued");
                state.phase = SyncPhase::Debounced;
            }
            PushOutcome::Exhausted => {
                tracing::error!("Failed to write after all retries, keeping for later");
                state.phase = SyncPhase::Deferred(DeferReason::RetriesExhausted);
            }
        }

        rerun && state.pending.is_some()
    }
}
