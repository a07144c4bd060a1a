//! Data models for the acquisition pipeline.
//!
//! Defines queue entries, their per-kind payloads, library records,
//! blacklist and activity entries.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Highest `attempts` value at which a queue entry is still picked up by the
/// scheduler. The failure that moves an entry past this value is terminal.
pub const MAX_QUEUE_ATTEMPTS: i64 = 3;

/// Kind of media an entry or record refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Book,
    Song,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Book => "book",
            MediaKind::Song => "song",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "book" => Some(MediaKind::Book),
            "song" => Some(MediaKind::Song),
            _ => None,
        }
    }

    /// Library table holding downloaded records of this kind.
    pub(crate) fn library_table(&self) -> &'static str {
        match self {
            MediaKind::Book => "books",
            MediaKind::Song => "songs",
        }
    }
}

/// Snapshot of the book metadata taken when a candidate is queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookPayload {
    pub title: String,
    pub author: String,
    pub publisher: String,
    pub year: String,
    pub language: String,
    pub pages: String,
    pub size: String,
    pub extension: String,
    /// Link to the mirror detail page, possibly relative to the mirror base.
    pub mirror: String,
}

/// Snapshot of the recording metadata taken when a candidate is queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongPayload {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub release_date: Option<String>,
    /// MusicBrainz recording identifier.
    pub recording_id: String,
    pub isrc: Option<String>,
}

/// Per-kind data needed to perform a download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueuePayload {
    Book(BookPayload),
    Song(SongPayload),
}

impl QueuePayload {
    pub fn kind(&self) -> MediaKind {
        match self {
            QueuePayload::Book(_) => MediaKind::Book,
            QueuePayload::Song(_) => MediaKind::Song,
        }
    }

    /// Human readable title used in activity entries and logs.
    pub fn display_title(&self) -> String {
        match self {
            QueuePayload::Book(book) if book.author.is_empty() => book.title.clone(),
            QueuePayload::Book(book) => format!("{} by {}", book.title, book.author),
            QueuePayload::Song(song) => format!("{} - {}", song.artist, song.title),
        }
    }
}

/// A persisted acquisition request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueEntry {
    /// Unique identifier (UUID)
    pub id: String,
    pub media_kind: MediaKind,
    /// Identifier of the candidate in its source catalog
    pub external_id: String,
    pub cover_url: Option<String>,
    pub payload: QueuePayload,
    pub requested_by: String,
    /// Set once an approver signed off; the scheduler ignores entries without it
    pub approved_by: Option<String>,
    /// Number of failed download attempts
    pub attempts: i64,
    /// Unix timestamp (seconds)
    pub created_at: i64,
}

impl QueueEntry {
    pub fn new(
        external_id: String,
        cover_url: Option<String>,
        payload: QueuePayload,
        requested_by: String,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            media_kind: payload.kind(),
            external_id,
            cover_url,
            payload,
            requested_by,
            approved_by: None,
            attempts: 0,
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn with_approver(mut self, approver: String) -> Self {
        self.approved_by = Some(approver);
        self
    }

    pub fn is_eligible(&self) -> bool {
        self.approved_by.is_some() && self.attempts <= MAX_QUEUE_ATTEMPTS
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts > MAX_QUEUE_ATTEMPTS
    }

    pub fn display_title(&self) -> String {
        self.payload.display_title()
    }
}

/// Book row to insert once a download completed.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub publisher: String,
    pub year: String,
    pub extension: String,
    pub path: PathBuf,
    pub external_id: String,
}

/// Song row to insert once a download completed.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSong {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub release_date: Option<String>,
    pub isrc: Option<String>,
    pub path: PathBuf,
    pub external_id: String,
}

/// Outcome of a successful executor run, persisted together with the queue
/// entry removal.
#[derive(Debug, Clone, PartialEq)]
pub enum NewLibraryRecord {
    Book(NewBook),
    Song(NewSong),
}

impl NewLibraryRecord {
    pub fn kind(&self) -> MediaKind {
        match self {
            NewLibraryRecord::Book(_) => MediaKind::Book,
            NewLibraryRecord::Song(_) => MediaKind::Song,
        }
    }

    pub fn path(&self) -> &PathBuf {
        match self {
            NewLibraryRecord::Book(book) => &book.path,
            NewLibraryRecord::Song(song) => &song.path,
        }
    }
}

/// Reference to a row in one of the library tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LibraryRecordRef {
    pub kind: MediaKind,
    pub id: i64,
}

/// Common view over a downloaded book or song.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LibraryRecord {
    pub id: i64,
    pub kind: MediaKind,
    pub title: String,
    /// Author for books, artist for songs
    pub contributors: String,
    pub path: PathBuf,
    pub external_id: String,
    /// Cache-busting token for served covers; bumped when the file changes
    pub cache_key: i64,
    pub created_at: i64,
}

/// An external id that must never be suggested or queued again.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlacklistEntry {
    pub external_id: String,
    pub media_kind: MediaKind,
    pub created_by: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Queued,
    Succeeded,
    Failed,
    Updated,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Queued => "queued",
            ActivityKind::Succeeded => "succeeded",
            ActivityKind::Failed => "failed",
            ActivityKind::Updated => "updated",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(ActivityKind::Queued),
            "succeeded" => Some(ActivityKind::Succeeded),
            "failed" => Some(ActivityKind::Failed),
            "updated" => Some(ActivityKind::Updated),
            _ => None,
        }
    }
}

/// Append-only audit entry surfaced in the activity feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityRecord {
    /// Auto-assigned on insert, 0 for records not yet stored
    pub id: i64,
    pub kind: ActivityKind,
    pub detail: String,
    pub library_record: Option<LibraryRecordRef>,
    pub user_id: Option<String>,
    pub created_at: i64,
}

impl ActivityRecord {
    pub fn new(kind: ActivityKind, detail: impl Into<String>) -> Self {
        Self {
            id: 0,
            kind,
            detail: detail.into(),
            library_record: None,
            user_id: None,
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_library_record(mut self, record: LibraryRecordRef) -> Self {
        self.library_record = Some(record);
        self
    }
}
