//! Remote document store interface.
//!
//! Each signed-in user owns a single document holding their whole
//! aggregate. The store supports point reads, full-document overwrites
//! stamped with a server write time, and a live subscription whose
//! snapshots say whether they are an unconfirmed echo of a local write.

mod http;
mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use thiserror::Error;

use crate::models::Aggregate;

pub use http::HttpRemoteStore;
pub use memory::{MemoryRemoteStore, RecordedWrite};

/// A stored user document.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteDocument {
    pub data: Aggregate,
    /// Server write time; `None` while a local write is unconfirmed.
    pub update_time: Option<DateTime<Utc>>,
}

/// One delivery from a document subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteSnapshot {
    pub document: Option<RemoteDocument>,
    /// Set when the snapshot reflects this client's own write before the
    /// server confirmed it.
    pub has_pending_writes: bool,
}

/// Errors returned by remote store operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoteError {
    #[error("Not signed in")]
    Unauthenticated,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Rate limited")]
    RateLimited,

    #[error("Remote store error: {0}")]
    Transient(String),

    #[error("Invalid remote document: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Failures that will not clear up within a quick retry loop.
    pub fn is_throttled(&self) -> bool {
        matches!(self, RemoteError::PermissionDenied | RemoteError::RateLimited)
    }
}

/// Client for the per-user remote document.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Reads the user's document, `None` if it does not exist yet.
    async fn get_document(&self, user_id: &str) -> Result<Option<RemoteDocument>, RemoteError>;

    /// Overwrites the user's document. Returns the server write time.
    async fn set_document(
        &self,
        user_id: &str,
        data: &Aggregate,
    ) -> Result<DateTime<Utc>, RemoteError>;

    /// Streams snapshots of the user's document, starting with the current one.
    fn subscribe(&self, user_id: &str) -> BoxStream<'static, RemoteSnapshot>;
}
