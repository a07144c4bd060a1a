#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use acquisition_server::acquisition::{
    AcquisitionError, AcquisitionStore, ActiveDownloads, BookExecutor, DedupFilter,
    DownloadExecutor, Executors, MediaKind, NewLibraryRecord, ProgressHandle, QueueEntry,
    QueuePayload, QueueService, RetryPolicy, SqliteAcquisitionStore, SongPayload,
};
use acquisition_server::catalog::{BookMirrorAdapter, Candidate, CatalogAdapter};
use acquisition_server::server::{ServerConfig, ServerState};
use async_trait::async_trait;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

pub const BOOK_CONTENTS: &str = "It was a warm night on Caladan.";

pub const RESULTS_PAGE: &str = r#"
<html><body>
<table id="tablelibgen">
  <tbody>
    <tr>
      <td>Frank Herbert</td>
      <td><a href="book/index.php?id=1234&md5=abc">Dune</a></td>
      <td>Chilton Books</td>
      <td>1965</td>
      <td>English</td>
      <td>412</td>
      <td>1 Mb</td>
      <td>epub</td>
      <td><a href="/ads.php?md5=abc">[1]</a></td>
      <td></td>
    </tr>
    <tr>
      <td>Frank Herbert</td>
      <td><a href="book/index.php?id=5678&md5=def">Dune Messiah</a></td>
      <td>Putnam</td>
      <td>1969</td>
      <td>English</td>
      <td>256</td>
      <td>800 Kb</td>
      <td>epub</td>
      <td><a href="/ads.php?md5=def">[1]</a></td>
      <td></td>
    </tr>
  </tbody>
</table>
</body></html>
"#;

const DETAIL_PAGE: &str = r#"
<html><body>
  <div id="download"><h2><a href="/get.php?md5=abc">GET</a></h2></div>
</body></html>
"#;

async fn search_page() -> impl IntoResponse {
    axum::response::Html(RESULTS_PAGE)
}

async fn detail_page() -> impl IntoResponse {
    axum::response::Html(DETAIL_PAGE)
}

async fn book_file() -> impl IntoResponse {
    (
        [(header::CONTENT_DISPOSITION, r#"attachment; filename="Dune.epub""#)],
        BOOK_CONTENTS,
    )
}

/// Serves a search page, a detail page and a file, like a book mirror.
pub async fn spawn_stub_mirror() -> String {
    let app = Router::new()
        .route("/search.php", get(search_page))
        .route("/ads.php", get(detail_page))
        .route("/get.php", get(book_file));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        delay: Duration::from_millis(1),
        ..Default::default()
    }
}

/// Song search that never leaves the process.
pub struct StubSongCatalog;

#[async_trait]
impl CatalogAdapter for StubSongCatalog {
    fn kind(&self) -> MediaKind {
        MediaKind::Song
    }

    async fn search(&self, terms: &str) -> Result<Vec<Candidate>, AcquisitionError> {
        Ok(vec![Candidate {
            external_id: "mbid-1".into(),
            title: terms.to_string(),
            subtitle: "Miles Davis - Kind of Blue".into(),
            cover_url: None,
            source_mirror: None,
            payload: QueuePayload::Song(SongPayload {
                title: terms.to_string(),
                artist: "Miles Davis".into(),
                album: Some("Kind of Blue".into()),
                release_date: Some("1959".into()),
                recording_id: "mbid-1".into(),
                isrc: None,
            }),
        }])
    }
}

/// Song downloads are not exercised end to end; any attempt fails.
pub struct RefusingExecutor;

#[async_trait]
impl DownloadExecutor for RefusingExecutor {
    async fn execute(
        &self,
        _entry: &QueueEntry,
        _progress: ProgressHandle,
    ) -> Result<NewLibraryRecord, AcquisitionError> {
        Err(AcquisitionError::NotFound("no audio source".into()))
    }
}

pub struct Harness {
    pub store: Arc<SqliteAcquisitionStore>,
    pub queue: Arc<QueueService>,
    pub mirror_url: String,
    pub library_dir: tempfile::TempDir,
}

impl Harness {
    pub async fn new() -> Self {
        let store = Arc::new(SqliteAcquisitionStore::in_memory().unwrap());
        let queue = Arc::new(QueueService::new(store.clone() as Arc<dyn AcquisitionStore>));
        Self {
            store,
            queue,
            mirror_url: spawn_stub_mirror().await,
            library_dir: tempfile::TempDir::new().unwrap(),
        }
    }

    pub fn executors(&self) -> Executors {
        Executors {
            book: Arc::new(
                BookExecutor::new(
                    self.mirror_url.clone(),
                    self.library_dir.path().join("books"),
                    Duration::from_secs(5),
                    fast_retry(),
                )
                .unwrap(),
            ),
            song: Arc::new(RefusingExecutor),
        }
    }

    pub fn book_catalog(&self) -> Arc<dyn CatalogAdapter> {
        Arc::new(
            BookMirrorAdapter::new(self.mirror_url.clone(), Duration::from_secs(5), fast_retry())
                .unwrap(),
        )
    }

    pub fn server_state(&self, active_downloads: ActiveDownloads) -> ServerState {
        ServerState::new(
            ServerConfig::default(),
            self.queue.clone(),
            Arc::new(DedupFilter::new(self.store.clone())),
            self.book_catalog(),
            Arc::new(StubSongCatalog),
            active_downloads,
        )
    }
}
