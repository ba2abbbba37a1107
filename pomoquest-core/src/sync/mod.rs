//! Push pipeline between the local aggregate and the remote document.
//!
//! ## Model
//!
//! Mutations hand the newest aggregate to [`SyncManager::schedule_write`].
//! Writes are debounced so bursts collapse into one push of the latest
//! state, pushed by a single flush at a time, retried with exponential
//! backoff, and kept pending (never dropped) when retries run out or
//! nobody is signed in.
//!
//! Incoming remote snapshots are only adopted when the local side is
//! quiescent: see [`SyncManager::should_accept_cloud_data`]. This gives
//! whole-document last-writer-wins with the local writer winning until its
//! push is confirmed.

mod manager;
mod state;

pub use manager::SyncManager;
pub use state::{DeferReason, SyncConfig, SyncPhase, SyncStatus};
