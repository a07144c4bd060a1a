//! Book downloads: resolve the mirror's download link, then stream the file
//! into the book directory.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use lazy_static::lazy_static;
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{debug, info};

use super::{move_into_library, open_stream, stream_to_file, DownloadExecutor};
use crate::acquisition::error::AcquisitionError;
use crate::acquisition::filename::{content_disposition_filename, sanitize_filename};
use crate::acquisition::models::{NewBook, NewLibraryRecord, QueueEntry, QueuePayload};
use crate::acquisition::progress::{DownloadStage, ProgressHandle};
use crate::acquisition::retry::RetryPolicy;
use crate::catalog::{fetch_text, resolve_url};

lazy_static! {
    static ref DOWNLOAD_LINK: Selector =
        Selector::parse("#download a[href]").expect("valid download link selector");
}

pub struct BookExecutor {
    /// Detail page requests, bounded by the request timeout
    page_client: Client,
    /// File downloads, bounded only while connecting
    download_client: Client,
    mirror_base_url: String,
    book_dir: PathBuf,
    retry_policy: RetryPolicy,
}

impl BookExecutor {
    pub fn new(
        mirror_base_url: impl Into<String>,
        book_dir: PathBuf,
        request_timeout: Duration,
        retry_policy: RetryPolicy,
    ) -> Result<Self, AcquisitionError> {
        Ok(Self {
            page_client: Client::builder().timeout(request_timeout).build()?,
            download_client: Client::builder().connect_timeout(request_timeout).build()?,
            mirror_base_url: mirror_base_url.into(),
            book_dir,
            retry_policy,
        })
    }
}

#[async_trait]
impl DownloadExecutor for BookExecutor {
    async fn execute(
        &self,
        entry: &QueueEntry,
        progress: ProgressHandle,
    ) -> Result<NewLibraryRecord, AcquisitionError> {
        let book = match &entry.payload {
            QueuePayload::Book(book) => book,
            other => {
                return Err(AcquisitionError::parse(format!(
                    "book executor got a {} entry",
                    other.kind().as_str()
                )))
            }
        };
        if book.mirror.is_empty() {
            return Err(AcquisitionError::MissingField("mirror".to_string()));
        }

        // Resolve
        progress.set_stage(DownloadStage::Resolving);
        let detail_url = resolve_url(&self.mirror_base_url, &book.mirror)?;
        let page = fetch_text(&self.page_client, detail_url.as_str(), &self.retry_policy).await?;
        let download_url = parse_download_link(&page, detail_url.as_str())?;
        debug!("Resolved {} to {}", entry.display_title(), download_url);

        // Fetch
        progress.set_stage(DownloadStage::Fetching);
        let response =
            open_stream(&self.download_client, &download_url, &self.retry_policy).await?;
        let filename = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .and_then(content_disposition_filename)
            .ok_or_else(|| AcquisitionError::MissingField("content-disposition filename".into()))?;
        let filename = sanitize_filename(&filename);
        progress.set_total_bytes(response.content_length());

        tokio::fs::create_dir_all(&self.book_dir).await?;
        // One part file per entry, so entries sharing a server filename never
        // write into the same file.
        let part_path = self.book_dir.join(format!(".{}.part", entry.id));

        let bytes = stream_to_file(response, &part_path, &progress).await?;
        let final_path = match move_into_library(&part_path, &self.book_dir, &filename).await {
            Ok(path) => path,
            Err(e) => {
                let _ = tokio::fs::remove_file(&part_path).await;
                return Err(e);
            }
        };
        info!(
            "Fetched {} ({} bytes) to {:?}",
            entry.display_title(),
            bytes,
            final_path
        );

        let extension = if book.extension.is_empty() {
            final_path
                .extension()
                .map(|ext| ext.to_string_lossy().to_lowercase())
                .unwrap_or_default()
        } else {
            book.extension.clone()
        };

        Ok(NewLibraryRecord::Book(NewBook {
            title: book.title.clone(),
            author: book.author.clone(),
            publisher: book.publisher.clone(),
            year: book.year.clone(),
            extension,
            path: final_path,
            external_id: entry.external_id.clone(),
        }))
    }
}

/// The download link on a mirror detail page: the first anchor inside the
/// `#download` block, resolved against the page URL.
pub fn parse_download_link(html: &str, page_url: &str) -> Result<String, AcquisitionError> {
    let document = Html::parse_document(html);
    let href = document
        .select(&DOWNLOAD_LINK)
        .next()
        .and_then(|a| a.value().attr("href"))
        .ok_or_else(|| AcquisitionError::parse("download link not found on detail page"))?;
    Ok(resolve_url(page_url, href)?.to_string())
}
