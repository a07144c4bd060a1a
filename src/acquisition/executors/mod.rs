//! Download executors.
//!
//! An executor turns an eligible queue entry into a file in the library and
//! returns the record describing it. Persisting that record is left to the
//! caller so the library insert and the queue removal share a transaction.

mod book;
mod song;

pub use book::{parse_download_link, BookExecutor};
pub use song::{AudioToolchain, ExternalToolchain, SongExecutor, TagMetadata};

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::error::AcquisitionError;
use super::filename::numbered_filename;
use super::models::{MediaKind, NewLibraryRecord, QueueEntry};
use super::progress::ProgressHandle;
use super::retry::{retry, RetryPolicy};

/// Numbered variants tried before giving up on a library file name.
const MAX_NAME_VARIANTS: u32 = 1000;

#[async_trait]
pub trait DownloadExecutor: Send + Sync {
    async fn execute(
        &self,
        entry: &QueueEntry,
        progress: ProgressHandle,
    ) -> Result<NewLibraryRecord, AcquisitionError>;
}

/// One executor per media kind.
#[derive(Clone)]
pub struct Executors {
    pub book: Arc<dyn DownloadExecutor>,
    pub song: Arc<dyn DownloadExecutor>,
}

impl Executors {
    pub fn for_kind(&self, kind: MediaKind) -> Arc<dyn DownloadExecutor> {
        match kind {
            MediaKind::Book => self.book.clone(),
            MediaKind::Song => self.song.clone(),
        }
    }
}

/// Open a GET response through the retry harness, failing on non-success
/// statuses. The body is left unread.
pub(crate) async fn open_stream(
    client: &Client,
    url: &str,
    policy: &RetryPolicy,
) -> Result<Response, AcquisitionError> {
    retry(policy, url, move || async move {
        let response = client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AcquisitionError::Status {
                url: url.to_string(),
                status,
            });
        }
        Ok(response)
    })
    .await
}

/// Stream a response body into `dest`, reporting bytes to `progress`.
///
/// Returns the number of bytes written. A partially written file is removed
/// on failure.
pub(crate) async fn stream_to_file(
    response: Response,
    dest: &Path,
    progress: &ProgressHandle,
) -> Result<u64, AcquisitionError> {
    let result = write_body(response, dest, progress).await;
    if result.is_err() {
        let _ = tokio::fs::remove_file(dest).await;
    }
    result
}

async fn write_body(
    response: Response,
    dest: &Path,
    progress: &ProgressHandle,
) -> Result<u64, AcquisitionError> {
    let mut file = File::create(dest).await?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
        progress.add_bytes(chunk.len() as u64);
    }

    file.flush().await?;
    Ok(written)
}

/// Move a finished file into `dir` under `filename`, or under the first free
/// numbered variant of it. Existing library files are never replaced.
///
/// The chosen name is claimed with an exclusive create before the rename, so
/// concurrent callers asking for the same name end up at different paths.
pub(crate) async fn move_into_library(
    src: &Path,
    dir: &Path,
    filename: &str,
) -> Result<PathBuf, AcquisitionError> {
    let dest = claim_free_path(dir, filename).await?;
    if let Err(e) = tokio::fs::rename(src, &dest).await {
        let _ = tokio::fs::remove_file(&dest).await;
        return Err(e.into());
    }
    Ok(dest)
}

async fn claim_free_path(dir: &Path, filename: &str) -> Result<PathBuf, AcquisitionError> {
    for n in 0..MAX_NAME_VARIANTS {
        let candidate = dir.join(numbered_filename(filename, n));
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(std::io::Error::new(
        ErrorKind::AlreadyExists,
        format!("no free name for {} in {:?}", filename, dir),
    )
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_move_into_library_keeps_existing_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let first = dir.path().join("first.tmp");
        let second = dir.path().join("second.tmp");
        std::fs::write(&first, "first").unwrap();
        std::fs::write(&second, "second").unwrap();

        let a = move_into_library(&first, dir.path(), "book.pdf").await.unwrap();
        let b = move_into_library(&second, dir.path(), "book.pdf").await.unwrap();

        assert_eq!(a, dir.path().join("book.pdf"));
        assert_eq!(b, dir.path().join("book (1).pdf"));
        assert_eq!(std::fs::read_to_string(&a).unwrap(), "first");
        assert_eq!(std::fs::read_to_string(&b).unwrap(), "second");
        assert!(!first.exists());
        assert!(!second.exists());
    }

    #[tokio::test]
    async fn test_move_into_library_concurrent_same_name() {
        let dir = tempfile::TempDir::new().unwrap();
        let sources: Vec<PathBuf> = (0..4)
            .map(|i| {
                let path = dir.path().join(format!("{}.tmp", i));
                std::fs::write(&path, i.to_string()).unwrap();
                path
            })
            .collect();

        let moves = sources
            .iter()
            .map(|src| move_into_library(src, dir.path(), "song.flac"));
        let mut paths: Vec<PathBuf> = futures::future::join_all(moves)
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 4);
    }

    #[tokio::test]
    async fn test_move_into_library_missing_source_releases_name() {
        let dir = tempfile::TempDir::new().unwrap();

        let result = move_into_library(&dir.path().join("gone.tmp"), dir.path(), "x.pdf").await;

        assert!(matches!(result, Err(AcquisitionError::Io(_))));
        assert!(!dir.path().join("x.pdf").exists());
    }
}
