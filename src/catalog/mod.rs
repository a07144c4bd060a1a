//! Catalog adapters.
//!
//! Stateless search clients that normalize external catalog results into
//! [`Candidate`]s. Persistence and dedup are layered on top by the
//! acquisition module.

pub mod book_mirror;
pub mod musicbrainz;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};

use crate::acquisition::{retry, AcquisitionError, MediaKind, QueuePayload, RetryPolicy};

pub use book_mirror::{BookMirrorAdapter, INVALID_EXTERNAL_ID};
pub use musicbrainz::MusicBrainzAdapter;

/// A search result not yet queued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub external_id: String,
    pub title: String,
    pub subtitle: String,
    pub cover_url: Option<String>,
    pub source_mirror: Option<String>,
    /// Snapshot stored with the queue entry if the candidate is queued
    pub payload: QueuePayload,
}

#[async_trait]
pub trait CatalogAdapter: Send + Sync {
    fn kind(&self) -> MediaKind;

    async fn search(&self, terms: &str) -> Result<Vec<Candidate>, AcquisitionError>;
}

/// Resolve a possibly relative link against `base`.
pub(crate) fn resolve_url(base: &str, link: &str) -> Result<Url, AcquisitionError> {
    let base = Url::parse(base)
        .map_err(|e| AcquisitionError::parse(format!("invalid base url {}: {}", base, e)))?;
    base.join(link)
        .map_err(|e| AcquisitionError::parse(format!("invalid link {}: {}", link, e)))
}

/// GET `url` through the retry harness and return the body as text.
pub(crate) async fn fetch_text(
    client: &Client,
    url: &str,
    policy: &RetryPolicy,
) -> Result<String, AcquisitionError> {
    retry(policy, url, move || async move {
        let response = client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AcquisitionError::Status {
                url: url.to_string(),
                status,
            });
        }
        Ok(response.text().await?)
    })
    .await
}
