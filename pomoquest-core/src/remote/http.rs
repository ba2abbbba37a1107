//! HTTP client for a REST document endpoint.
//!
//! `GET  {server}/user_data/{user_id}` returns `{ data, updatedAt }` or 404.
//! `PUT  {server}/user_data/{user_id}` takes `{ data }` and returns
//! `{ updatedAt }` assigned by the server.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::{RemoteDocument, RemoteError, RemoteSnapshot, RemoteStore};
use crate::models::Aggregate;

/// How often the subscription polls for changes.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const COLLECTION: &str = "user_data";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredDocument {
    data: Aggregate,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct WriteRequest<'a> {
    data: &'a Aggregate,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WriteResponse {
    updated_at: DateTime<Utc>,
}

/// Remote store backed by an HTTP document service.
#[derive(Debug, Clone)]
pub struct HttpRemoteStore {
    server_url: String,
    api_key: String,
    poll_interval: Duration,
    client: reqwest::Client,
}

impl HttpRemoteStore {
    pub fn new(server_url: String, api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            server_url,
            api_key,
            poll_interval: DEFAULT_POLL_INTERVAL,
            client,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Builds the document URL for a user.
    fn document_url(&self, user_id: &str) -> String {
        let base_url = if self.server_url.starts_with("http://")
            || self.server_url.starts_with("https://")
        {
            self.server_url.clone()
        } else {
            format!("http://{}", self.server_url)
        };

        format!(
            "{}/{}/{}",
            base_url.trim_end_matches('/'),
            COLLECTION,
            urlencoding::encode(user_id)
        )
    }
}

/// Maps a failed HTTP status onto the sync error taxonomy.
fn classify(status: StatusCode) -> RemoteError {
    match status {
        StatusCode::UNAUTHORIZED => RemoteError::Unauthenticated,
        StatusCode::FORBIDDEN => RemoteError::PermissionDenied,
        StatusCode::TOO_MANY_REQUESTS => RemoteError::RateLimited,
        other => RemoteError::Transient(format!("Server returned status {}", other)),
    }
}

fn transport(e: reqwest::Error) -> RemoteError {
    RemoteError::Transient(e.to_string())
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn get_document(&self, user_id: &str) -> Result<Option<RemoteDocument>, RemoteError> {
        let response = self
            .client
            .get(self.document_url(user_id))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(transport)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(classify(response.status()));
        }

        let stored: StoredDocument = response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;

        Ok(Some(RemoteDocument {
            data: stored.data,
            update_time: Some(stored.updated_at),
        }))
    }

    async fn set_document(
        &self,
        user_id: &str,
        data: &Aggregate,
    ) -> Result<DateTime<Utc>, RemoteError> {
        let response = self
            .client
            .put(self.document_url(user_id))
            .bearer_auth(&self.api_key)
            .json(&WriteRequest { data })
            .send()
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            return Err(classify(response.status()));
        }

        let written: WriteResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        Ok(written.updated_at)
    }

    fn subscribe(&self, user_id: &str) -> BoxStream<'static, RemoteSnapshot> {
        let store = self.clone();
        let user_id = user_id.to_string();

        stream::unfold(None, move |last_seen: Option<DateTime<Utc>>| {
            let store = store.clone();
            let user_id = user_id.clone();
            async move {
                loop {
                    match store.get_document(&user_id).await {
                        Ok(Some(document)) if document.update_time != last_seen => {
                            let seen = document.update_time;
                            let snapshot = RemoteSnapshot {
                                document: Some(document),
                                has_pending_writes: false,
                            };
                            return Some((snapshot, seen));
                        }
                        Ok(_) => {}
                        Err(e) => tracing::warn!("Polling remote document failed: {}", e),
                    }
                    tokio::time::sleep(store.poll_interval).await;
                }
            }
        })
        .boxed()
    }
}
