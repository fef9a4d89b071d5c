pub mod error;
pub mod types;

pub use error::{DirectoryError, Result};
pub use types::Profile;

use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::debug;

use types::FollowPage;

/// The directory API rate-limits aggressively; lookups fan out in small
/// parallel groups with a short pause between groups.
const PARALLEL_LOOKUPS: usize = 10;
const INTER_BATCH_DELAY_MS: u64 = 250;

pub struct DirectoryClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl DirectoryClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Look up a single profile by handle. 404 maps to `NotFound`.
    pub async fn lookup(&self, handle: &str) -> Result<Profile> {
        let url = format!("{}/profiles/{}", self.base_url, handle);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() == 404 {
            return Err(DirectoryError::NotFound(handle.to_string()));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DirectoryError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        Ok(resp.json().await?)
    }

    /// Look up many profiles with bounded parallelism. Per-handle failures
    /// are returned alongside successes; one dead handle never aborts the
    /// rest of the batch.
    pub async fn lookup_many(&self, handles: &[String]) -> Vec<(String, Result<Profile>)> {
        let mut results = Vec::with_capacity(handles.len());

        for group in handles.chunks(PARALLEL_LOOKUPS) {
            let group_results: Vec<(String, Result<Profile>)> =
                stream::iter(group.iter().cloned().map(|handle| async move {
                    let result = self.lookup(&handle).await;
                    (handle, result)
                }))
                .buffer_unordered(PARALLEL_LOOKUPS)
                .collect()
                .await;

            results.extend(group_results);

            if results.len() < handles.len() {
                tokio::time::sleep(Duration::from_millis(INTER_BATCH_DELAY_MS)).await;
            }
        }

        debug!(
            requested = handles.len(),
            returned = results.len(),
            "Directory batch lookup complete"
        );
        results
    }

    /// Fetch the full set of handles an account follows, paging until the
    /// cursor runs out.
    pub async fn following(&self, handle: &str) -> Result<Vec<String>> {
        self.follow_set(handle, "following").await
    }

    /// Fetch the full set of handles following an account.
    pub async fn followers(&self, handle: &str) -> Result<Vec<String>> {
        self.follow_set(handle, "followers").await
    }

    async fn follow_set(&self, handle: &str, direction: &str) -> Result<Vec<String>> {
        let mut handles = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut url = format!("{}/profiles/{}/{}", self.base_url, handle, direction);
            if let Some(ref c) = cursor {
                url.push_str(&format!("?cursor={c}"));
            }

            let resp = self
                .client
                .get(&url)
                .bearer_auth(&self.api_key)
                .send()
                .await?;

            let status = resp.status();
            if status.as_u16() == 404 {
                return Err(DirectoryError::NotFound(handle.to_string()));
            }
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(DirectoryError::Api {
                    status: status.as_u16(),
                    message: body,
                });
            }

            let page: FollowPage = resp.json().await?;
            handles.extend(page.handles);

            match page.next_cursor {
                Some(c) => cursor = Some(c),
                None => break,
            }
        }

        Ok(handles)
    }
}
