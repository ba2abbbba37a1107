use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::channel::mpsc;
use futures::stream::{BoxStream, StreamExt};
use tokio::sync::Semaphore;
use tokio::time::Instant;

use super::{RemoteDocument, RemoteError, RemoteSnapshot, RemoteStore};
use crate::models::Aggregate;

/// A write attempt seen by [`MemoryRemoteStore`].
#[derive(Debug, Clone)]
pub struct RecordedWrite {
    pub user_id: String,
    pub data: Aggregate,
    pub at: Instant,
}

#[derive(Default)]
struct State {
    documents: HashMap<String, RemoteDocument>,
    subscribers: Vec<(String, mpsc::UnboundedSender<RemoteSnapshot>)>,
    writes: Vec<RecordedWrite>,
    scripted_failures: VecDeque<RemoteError>,
    failing: Option<RemoteError>,
    gate: Option<Arc<Semaphore>>,
}

impl State {
    fn notify(&mut self, user_id: &str, snapshot: &RemoteSnapshot) {
        self.subscribers
            .retain(|(id, tx)| id != user_id || tx.unbounded_send(snapshot.clone()).is_ok());
    }
}

/// In-process remote store.
///
/// Behaves like a cloud document database seen from one client: every
/// write first delivers a local-echo snapshot to subscribers, then a
/// confirmed snapshot once it succeeds. Failures and slow writes can be
/// scripted.
#[derive(Clone, Default)]
pub struct MemoryRemoteStore {
    state: Arc<Mutex<State>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Makes the next write attempts fail with `errors`, in order.
    pub fn fail_next(&self, errors: impl IntoIterator<Item = RemoteError>) {
        self.lock().scripted_failures.extend(errors);
    }

    /// Makes every write fail with `error` until cleared with `None`.
    pub fn fail_always(&self, error: Option<RemoteError>) {
        self.lock().failing = error;
    }

    /// Holds every write until [`release_writes`](Self::release_writes) lets it through.
    pub fn hold_writes(&self) {
        self.lock().gate = Some(Arc::new(Semaphore::new(0)));
    }

    /// Lets `count` held writes complete.
    pub fn release_writes(&self, count: usize) {
        if let Some(gate) = &self.lock().gate {
            gate.add_permits(count);
        }
    }

    /// Every write attempt so far, including failed ones.
    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.lock().writes.clone()
    }

    /// Highest number of writes that were ever running at once.
    pub fn max_concurrent_writes(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn document(&self, user_id: &str) -> Option<RemoteDocument> {
        self.lock().documents.get(user_id).cloned()
    }

    /// Stores a document as if another device wrote it.
    pub fn put_from_other_device(&self, user_id: &str, data: Aggregate) {
        let document = RemoteDocument {
            data,
            update_time: Some(Utc::now()),
        };
        let mut state = self.lock();
        state.documents.insert(user_id.to_string(), document.clone());
        state.notify(
            user_id,
            &RemoteSnapshot {
                document: Some(document),
                has_pending_writes: false,
            },
        );
    }

    fn next_failure(&self) -> Option<RemoteError> {
        let mut state = self.lock();
        state
            .scripted_failures
            .pop_front()
            .or_else(|| state.failing.clone())
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn get_document(&self, user_id: &str) -> Result<Option<RemoteDocument>, RemoteError> {
        Ok(self.document(user_id))
    }

    async fn set_document(
        &self,
        user_id: &str,
        data: &Aggregate,
    ) -> Result<DateTime<Utc>, RemoteError> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        let gate = {
            let mut state = self.lock();
            state.writes.push(RecordedWrite {
                user_id: user_id.to_string(),
                data: data.clone(),
                at: Instant::now(),
            });
            state.notify(
                user_id,
                &RemoteSnapshot {
                    document: Some(RemoteDocument {
                        data: data.clone(),
                        update_time: None,
                    }),
                    has_pending_writes: true,
                },
            );
            state.gate.clone()
        };

        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        if let Some(error) = self.next_failure() {
            return Err(error);
        }

        let update_time = Utc::now();
        let document = RemoteDocument {
            data: data.clone(),
            update_time: Some(update_time),
        };
        let mut state = self.lock();
        state.documents.insert(user_id.to_string(), document.clone());
        state.notify(
            user_id,
            &RemoteSnapshot {
                document: Some(document),
                has_pending_writes: false,
            },
        );
        Ok(update_time)
    }

    fn subscribe(&self, user_id: &str) -> BoxStream<'static, RemoteSnapshot> {
        let (tx, rx) = mpsc::unbounded();
        let mut state = self.lock();
        let current = RemoteSnapshot {
            document: state.documents.get(user_id).cloned(),
            has_pending_writes: false,
        };
        let _ = tx.unbounded_send(current);
        state.subscribers.push((user_id.to_string(), tx));
        rx.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_delivers_echo_then_confirmation() {
        let store = MemoryRemoteStore::new();
        let mut snapshots = store.subscribe("u1");

        let initial = snapshots.next().await.unwrap();
        assert!(initial.document.is_none());

        let data = Aggregate::default();
        store.set_document("u1", &data).await.unwrap();

        let echo = snapshots.next().await.unwrap();
        assert!(echo.has_pending_writes);
        assert!(echo.document.unwrap().update_time.is_none());

        let confirmed = snapshots.next().await.unwrap();
        assert!(!confirmed.has_pending_writes);
        assert_eq!(confirmed.document.unwrap().data, data);
    }

    #[tokio::test]
    async fn test_scripted_failures_run_in_order() {
        let store = MemoryRemoteStore::new();
        store.fail_next([RemoteError::RateLimited]);
        let data = Aggregate::default();

        assert_eq!(
            store.set_document("u1", &data).await,
            Err(RemoteError::RateLimited)
        );
        assert!(store.set_document("u1", &data).await.is_ok());
        assert_eq!(store.writes().len(), 2);
        assert!(store.document("u1").is_some());
    }

    #[tokio::test]
    async fn test_other_users_not_notified() {
        let store = MemoryRemoteStore::new();
        let mut snapshots = store.subscribe("u1");
        snapshots.next().await.unwrap();

        store.put_from_other_device("u2", Aggregate::default());
        store.put_from_other_device("u1", Aggregate::default());

        let next = snapshots.next().await.unwrap();
        assert!(next.document.is_some());
        assert!(store.document("u2").is_some());
    }
}
