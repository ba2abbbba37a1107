//! Wiring of the core library for one CLI invocation.

use std::sync::Arc;

use pomoquest_core::{
    DataStore, FileStore, HttpRemoteStore, LocalStore, MemoryRemoteStore, RemoteStore,
    StaticSession, SyncManager, SyncPhase, SystemClock, User,
};

use crate::config::Config;

/// Whether this invocation talks to the sync server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Local store only; changes stay pending for a later push.
    Offline,
    /// Signed in as the configured user.
    Online,
}

pub struct App {
    pub store: Arc<DataStore>,
    pub local: Arc<FileStore>,
    mode: Mode,
}

impl App {
    /// Opens the local store and, when requested and configured, the remote one.
    pub async fn open(config: &Config, mode: Mode) -> Self {
        let local = Arc::new(FileStore::new(config.data_dir.value.clone()));

        let online = mode == Mode::Online && config.sync.is_configured();
        if mode == Mode::Online && !online {
            tracing::debug!("Sync requested but not configured, staying offline");
        }
        let (remote, session): (Arc<dyn RemoteStore>, StaticSession) = match (
            online,
            &config.sync.server_url,
            &config.sync.api_key,
            &config.sync.user_id,
        ) {
            (true, Some(url), Some(key), Some(user_id)) => {
                tracing::debug!("Online as {} against {}", user_id, url);
                (
                    Arc::new(HttpRemoteStore::new(url.clone(), key.clone())) as Arc<dyn RemoteStore>,
                    StaticSession::signed_in(User::new(user_id.clone())),
                )
            }
            // Nobody is signed in, so nothing is ever pushed here.
            _ => (
                Arc::new(MemoryRemoteStore::new()) as Arc<dyn RemoteStore>,
                StaticSession::signed_out(),
            ),
        };

        let sync = SyncManager::new(
            local.clone() as Arc<dyn LocalStore>,
            remote,
            Arc::new(session),
            pomoquest_core::SyncConfig::default(),
        );
        let store = Arc::new(DataStore::new(local.clone(), sync, Arc::new(SystemClock)));
        store.load().await;

        Self {
            store,
            local,
            mode: if online { Mode::Online } else { Mode::Offline },
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Pushes changes still waiting out the debounce before the process exits.
    pub async fn finish(&self) {
        let sync = self.store.sync();
        if self.mode == Mode::Online && sync.phase() == SyncPhase::Debounced {
            tracing::debug!("Pushing pending changes before exit");
            sync.force_write().await;
            if sync.has_pending_changes() {
                tracing::warn!("Changes were not pushed; they will be retried on the next run");
            }
        }
    }
}
