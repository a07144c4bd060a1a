//! MusicBrainz recording search adapter.
//!
//! Rate limited to 1 request per 1.1s per MusicBrainz API policy. Cover art
//! comes from the Cover Art Archive, which has no such limit.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use super::{Candidate, CatalogAdapter};
use crate::acquisition::{
    retry, AcquisitionError, MediaKind, QueuePayload, RetryPolicy, SongPayload,
};
use crate::config::MusicBrainzSettings;

const RATE_LIMIT_INTERVAL: Duration = Duration::from_millis(1100);

pub struct MusicBrainzAdapter {
    client: Client,
    settings: MusicBrainzSettings,
    retry_policy: RetryPolicy,
    last_request: Mutex<Option<Instant>>,
}

#[derive(Debug, Deserialize)]
struct RecordingSearchResponse {
    #[serde(default)]
    recordings: Vec<MbRecording>,
}

#[derive(Debug, Deserialize)]
struct MbRecording {
    id: String,
    title: String,
    #[serde(rename = "artist-credit", default)]
    artist_credit: Vec<MbArtistCredit>,
    #[serde(default)]
    releases: Vec<MbRelease>,
    #[serde(default)]
    isrcs: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct MbArtistCredit {
    name: String,
}

#[derive(Debug, Deserialize)]
struct MbRelease {
    id: String,
    title: String,
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CoverArtResponse {
    #[serde(default)]
    images: Vec<CoverArtImage>,
}

#[derive(Debug, Deserialize)]
struct CoverArtImage {
    #[serde(default)]
    front: bool,
    image: Option<String>,
    #[serde(default)]
    thumbnails: CoverArtThumbnails,
}

#[derive(Debug, Default, Deserialize)]
struct CoverArtThumbnails {
    #[serde(rename = "250")]
    small_250: Option<String>,
    small: Option<String>,
}

impl MusicBrainzAdapter {
    pub fn new(
        settings: MusicBrainzSettings,
        request_timeout: Duration,
        retry_policy: RetryPolicy,
    ) -> Result<Self, AcquisitionError> {
        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            settings,
            retry_policy,
            last_request: Mutex::new(None),
        })
    }

    async fn rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < RATE_LIMIT_INTERVAL {
                tokio::time::sleep(RATE_LIMIT_INTERVAL - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    fn search_url(&self, terms: &str) -> String {
        format!(
            "{}/recording?query={}&fmt=json&limit={}",
            self.settings.base_url.trim_end_matches('/'),
            urlencoding::encode(terms),
            self.settings.search_limit
        )
    }

    async fn search_recordings(&self, terms: &str) -> Result<RecordingSearchResponse, AcquisitionError> {
        let url = self.search_url(terms);
        debug!("Searching MusicBrainz: {}", url);
        let url = url.as_str();
        retry(&self.retry_policy, url, move || async move {
            self.rate_limit().await;
            let response = self.client.get(url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(AcquisitionError::Status {
                    url: url.to_string(),
                    status,
                });
            }
            Ok(response.json::<RecordingSearchResponse>().await?)
        })
        .await
    }

    /// Front cover thumbnail of a release, or None on any failure.
    async fn lookup_cover(&self, release_id: &str) -> Option<String> {
        let url = format!(
            "{}/release/{}",
            self.settings.cover_art_url.trim_end_matches('/'),
            release_id
        );
        let response = match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                debug!("No cover for release {}: {}", release_id, response.status());
                return None;
            }
            Err(e) => {
                debug!("Cover lookup for release {} failed: {}", release_id, e);
                return None;
            }
        };
        match response.json::<CoverArtResponse>().await {
            Ok(body) => front_cover_url(body),
            Err(e) => {
                debug!("Malformed cover response for release {}: {}", release_id, e);
                None
            }
        }
    }
}

#[async_trait]
impl CatalogAdapter for MusicBrainzAdapter {
    fn kind(&self) -> MediaKind {
        MediaKind::Song
    }

    async fn search(&self, terms: &str) -> Result<Vec<Candidate>, AcquisitionError> {
        let response = self.search_recordings(terms).await?;
        let recordings = normalize_recordings(response);

        let covers = join_all(recordings.iter().map(move |(_, release_id)| async move {
            match release_id {
                Some(id) => self.lookup_cover(id).await,
                None => None,
            }
        }))
        .await;

        Ok(recordings
            .into_iter()
            .zip(covers)
            .map(|((mut candidate, _), cover_url)| {
                candidate.cover_url = cover_url;
                candidate
            })
            .collect())
    }
}

/// Convert recordings into candidates, paired with the release id whose
/// cover should be looked up.
fn normalize_recordings(response: RecordingSearchResponse) -> Vec<(Candidate, Option<String>)> {
    response
        .recordings
        .into_iter()
        .map(|recording| {
            let artist = recording
                .artist_credit
                .into_iter()
                .next()
                .map(|credit| credit.name)
                .unwrap_or_default();
            let release = recording.releases.into_iter().next();
            let album = release.as_ref().map(|r| r.title.clone());
            let release_date = release.as_ref().and_then(|r| r.date.clone());
            let release_id = release.map(|r| r.id);

            let subtitle = match &album {
                Some(album) => format!("{} - {}", artist, album),
                None => artist.clone(),
            };

            let payload = SongPayload {
                title: recording.title.clone(),
                artist,
                album,
                release_date,
                recording_id: recording.id.clone(),
                isrc: recording.isrcs.into_iter().next(),
            };

            let candidate = Candidate {
                external_id: recording.id,
                title: recording.title,
                subtitle,
                cover_url: None,
                source_mirror: None,
                payload: QueuePayload::Song(payload),
            };
            (candidate, release_id)
        })
        .collect()
}

fn front_cover_url(body: CoverArtResponse) -> Option<String> {
    let front = body.images.into_iter().find(|image| image.front)?;
    front
        .thumbnails
        .small_250
        .or(front.thumbnails.small)
        .or(front.image)
}
