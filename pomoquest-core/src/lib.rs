//! Pomoquest Core Library
//!
//! Data model, local persistence and cloud synchronization shared by the
//! pomoquest front ends.

pub mod auth;
pub mod clock;
pub mod data;
pub mod migration;
pub mod models;
pub mod remote;
pub mod storage;
pub mod sync;
pub mod timezone;

pub use auth::{
    AccountLinking, AuthError, AuthProvider, Authenticator, PendingLink, SessionProvider,
    SignInResult, StaticSession, User,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use data::{CarryoverQuest, DataStore};
pub use migration::{export_data, import_data, run_migration, MigrationError, MigrationOptions};
pub use models::{
    Aggregate, CompletedQuest, DailyRecord, EndReason, Quest, Session, Settings, SettingsError,
    SettingsPatch, TimerMode, ACTIVE_QUEST_ID,
};
pub use remote::{
    HttpRemoteStore, MemoryRemoteStore, RemoteDocument, RemoteError, RemoteSnapshot, RemoteStore,
};
pub use storage::{FileStore, LocalStore, MemoryStore, StoreError};
pub use sync::{DeferReason, SyncConfig, SyncManager, SyncPhase, SyncStatus};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
