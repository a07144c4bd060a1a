//! Acquisition storage and persistence.
//!
//! Provides SQLite-backed storage for queue entries, library records, the
//! blacklist and the activity log.

use super::models::*;
use super::schema::ACQUISITION_VERSIONED_SCHEMAS;
use crate::sqlite_persistence::open_versioned;
use anyhow::{anyhow, Context, Result};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Trait for acquisition storage operations.
///
/// Every mutation touches a single queue row (by id) or runs in a single
/// transaction, so concurrent executors never contend on each other's rows.
pub trait AcquisitionStore: Send + Sync {
    // === Queue ===

    /// Insert a new queue entry.
    fn insert_queue_entry(&self, entry: &QueueEntry) -> Result<()>;

    /// Get a queue entry by ID.
    fn get_queue_entry(&self, id: &str) -> Result<Option<QueueEntry>>;

    /// List queue entries, oldest first.
    fn list_queue_entries(&self, limit: usize, offset: usize) -> Result<Vec<QueueEntry>>;

    /// Entries that are approved and still within the attempt budget.
    fn list_eligible_entries(&self) -> Result<Vec<QueueEntry>>;

    /// Increment `attempts`, returning the new value, or None if the entry no
    /// longer exists. When the new value first exceeds the attempt budget,
    /// `exhausted` is appended to the activity log in the same transaction.
    fn record_failed_attempt(&self, id: &str, exhausted: &ActivityRecord) -> Result<Option<i64>>;

    /// Set `approved_by` if not already set. Returns true if the entry changed.
    fn approve_entry(&self, id: &str, approver: &str) -> Result<bool>;

    /// Delete a queue entry. Returns true if a row was removed.
    fn delete_queue_entry(&self, id: &str) -> Result<bool>;

    /// Delete the queue entry and insert the library record in one
    /// transaction. Returns None, inserting nothing, if the entry is gone.
    fn complete_entry(
        &self,
        entry_id: &str,
        record: &NewLibraryRecord,
    ) -> Result<Option<LibraryRecordRef>>;

    // === Library ===

    fn get_library_record(&self, kind: MediaKind, id: i64) -> Result<Option<LibraryRecord>>;

    /// Delete a library record, returning what was removed.
    fn delete_library_record(&self, kind: MediaKind, id: i64) -> Result<Option<LibraryRecord>>;

    /// Bump the cache key of a record whose file or cover changed.
    fn bump_cache_key(&self, kind: MediaKind, id: i64) -> Result<Option<i64>>;

    // === Batched membership lookups ===

    fn queued_external_ids(&self, external_ids: &[String]) -> Result<HashSet<String>>;

    fn downloaded_external_ids(
        &self,
        kind: MediaKind,
        external_ids: &[String],
    ) -> Result<HashSet<String>>;

    fn blacklisted_external_ids(&self, external_ids: &[String]) -> Result<HashSet<String>>;

    // === Blacklist ===

    /// Insert a blacklist entry. Returns false if the id was already present.
    fn add_to_blacklist(&self, entry: &BlacklistEntry) -> Result<bool>;

    // === Activity ===

    /// Append an activity record, returning its ID.
    fn append_activity(&self, record: &ActivityRecord) -> Result<i64>;

    /// List activity, newest first.
    fn list_activity(&self, limit: usize, offset: usize) -> Result<Vec<ActivityRecord>>;
}

/// SQLite-backed acquisition store.
pub struct SqliteAcquisitionStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteAcquisitionStore {
    /// Open an existing database or create a new one with the current schema.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned(&db_path, ACQUISITION_VERSIONED_SCHEMAS)
            .with_context(|| format!("Failed to open acquisition db {:?}", db_path.as_ref()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store for testing.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        ACQUISITION_VERSIONED_SCHEMAS
            .last()
            .context("No schemas defined")?
            .create(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Acquisition store connection mutex poisoned"))
    }

    fn row_to_queue_entry(row: &rusqlite::Row) -> rusqlite::Result<QueueEntry> {
        let kind_str: String = row.get("media_kind")?;
        let media_kind = MediaKind::from_str(&kind_str).ok_or_else(|| {
            conversion_error(1, anyhow!("Unknown media kind '{}'", kind_str))
        })?;

        let payload_json: String = row.get("payload")?;
        let payload: QueuePayload =
            serde_json::from_str(&payload_json).map_err(|e| conversion_error(4, e.into()))?;
        if payload.kind() != media_kind {
            return Err(conversion_error(
                4,
                anyhow!(
                    "Payload kind {} does not match row kind {}",
                    payload.kind().as_str(),
                    media_kind.as_str()
                ),
            ));
        }

        Ok(QueueEntry {
            id: row.get("id")?,
            media_kind,
            external_id: row.get("external_id")?,
            cover_url: row.get("cover_url")?,
            payload,
            requested_by: row.get("requested_by")?,
            approved_by: row.get("approved_by")?,
            attempts: row.get("attempts")?,
            created_at: row.get("created_at")?,
        })
    }

    fn row_to_library_record(kind: MediaKind, row: &rusqlite::Row) -> rusqlite::Result<LibraryRecord> {
        let contributors_column = match kind {
            MediaKind::Book => "author",
            MediaKind::Song => "artist",
        };
        Ok(LibraryRecord {
            id: row.get("id")?,
            kind,
            title: row.get("title")?,
            contributors: row.get(contributors_column)?,
            path: PathBuf::from(row.get::<_, String>("path")?),
            external_id: row.get("external_id")?,
            cache_key: row.get("cache_key")?,
            created_at: row.get("created_at")?,
        })
    }

    fn row_to_activity(row: &rusqlite::Row) -> rusqlite::Result<ActivityRecord> {
        let kind_str: String = row.get("kind")?;
        let kind = ActivityKind::from_str(&kind_str)
            .ok_or_else(|| conversion_error(1, anyhow!("Unknown activity kind '{}'", kind_str)))?;

        let library_kind: Option<String> = row.get("library_kind")?;
        let library_id: Option<i64> = row.get("library_id")?;
        let library_record = match (library_kind.as_deref().and_then(MediaKind::from_str), library_id) {
            (Some(kind), Some(id)) => Some(LibraryRecordRef { kind, id }),
            _ => None,
        };

        Ok(ActivityRecord {
            id: row.get("id")?,
            kind,
            detail: row.get("detail")?,
            library_record,
            user_id: row.get("user_id")?,
            created_at: row.get("created_at")?,
        })
    }

    /// Run `SELECT external_id FROM <table> WHERE external_id IN (...)`.
    fn external_ids_in(
        &self,
        table: &str,
        external_ids: &[String],
    ) -> Result<HashSet<String>> {
        if external_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let placeholders = (1..=external_ids.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT DISTINCT external_id FROM {} WHERE external_id IN ({})",
            table, placeholders
        );

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt
            .query_map(params_from_iter(external_ids.iter()), |row| row.get(0))?
            .collect::<rusqlite::Result<HashSet<String>>>()?;
        Ok(ids)
    }
}

fn conversion_error(column: usize, error: anyhow::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, error.into())
}

fn insert_activity(conn: &Connection, record: &ActivityRecord) -> rusqlite::Result<i64> {
    conn.execute(
        r#"INSERT INTO activity (kind, detail, library_kind, library_id, user_id, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
        params![
            record.kind.as_str(),
            record.detail,
            record.library_record.map(|r| r.kind.as_str()),
            record.library_record.map(|r| r.id),
            record.user_id,
            record.created_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn path_to_db(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl AcquisitionStore for SqliteAcquisitionStore {
    fn insert_queue_entry(&self, entry: &QueueEntry) -> Result<()> {
        let payload = serde_json::to_string(&entry.payload)?;
        let conn = self.conn()?;
        conn.execute(
            r#"INSERT INTO queue_entries (
                id, media_kind, external_id, cover_url, payload,
                requested_by, approved_by, attempts, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
            params![
                entry.id,
                entry.media_kind.as_str(),
                entry.external_id,
                entry.cover_url,
                payload,
                entry.requested_by,
                entry.approved_by,
                entry.attempts,
                entry.created_at,
            ],
        )?;
        Ok(())
    }

    fn get_queue_entry(&self, id: &str) -> Result<Option<QueueEntry>> {
        let conn = self.conn()?;
        let entry = conn
            .query_row(
                "SELECT * FROM queue_entries WHERE id = ?1",
                [id],
                Self::row_to_queue_entry,
            )
            .optional()?;
        Ok(entry)
    }

    fn list_queue_entries(&self, limit: usize, offset: usize) -> Result<Vec<QueueEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT * FROM queue_entries
               ORDER BY created_at ASC, rowid ASC
               LIMIT ?1 OFFSET ?2"#,
        )?;
        let entries = stmt
            .query_map(
                params![limit as i64, offset as i64],
                Self::row_to_queue_entry,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    fn list_eligible_entries(&self) -> Result<Vec<QueueEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT * FROM queue_entries
               WHERE approved_by IS NOT NULL AND attempts <= ?1
               ORDER BY created_at ASC, rowid ASC"#,
        )?;
        let entries = stmt
            .query_map([MAX_QUEUE_ATTEMPTS], Self::row_to_queue_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    fn record_failed_attempt(&self, id: &str, exhausted: &ActivityRecord) -> Result<Option<i64>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let attempts: Option<i64> = tx
            .query_row(
                "UPDATE queue_entries SET attempts = attempts + 1 WHERE id = ?1 RETURNING attempts",
                [id],
                |row| row.get(0),
            )
            .optional()?;
        if attempts == Some(MAX_QUEUE_ATTEMPTS + 1) {
            insert_activity(&tx, exhausted)?;
        }
        tx.commit()?;

        Ok(attempts)
    }

    fn approve_entry(&self, id: &str, approver: &str) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE queue_entries SET approved_by = ?2 WHERE id = ?1 AND approved_by IS NULL",
            params![id, approver],
        )?;
        Ok(changed > 0)
    }

    fn delete_queue_entry(&self, id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM queue_entries WHERE id = ?1", [id])?;
        Ok(deleted > 0)
    }

    fn complete_entry(
        &self,
        entry_id: &str,
        record: &NewLibraryRecord,
    ) -> Result<Option<LibraryRecordRef>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let deleted = tx.execute("DELETE FROM queue_entries WHERE id = ?1", [entry_id])?;
        if deleted == 0 {
            // Dropping the transaction rolls it back.
            return Ok(None);
        }

        let kind = record.kind();
        let path = path_to_db(record.path());

        // An earlier record pointing at the same file now sees different bytes.
        tx.execute(
            &format!(
                "UPDATE {} SET cache_key = cache_key + 1 WHERE path = ?1",
                kind.library_table()
            ),
            [&path],
        )?;

        match record {
            NewLibraryRecord::Book(book) => {
                tx.execute(
                    r#"INSERT INTO books (title, author, publisher, year, extension, path, external_id)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
                    params![
                        book.title,
                        book.author,
                        book.publisher,
                        book.year,
                        book.extension,
                        path,
                        book.external_id,
                    ],
                )?;
            }
            NewLibraryRecord::Song(song) => {
                tx.execute(
                    r#"INSERT INTO songs (title, artist, album, release_date, isrc, path, external_id)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
                    params![
                        song.title,
                        song.artist,
                        song.album,
                        song.release_date,
                        song.isrc,
                        path,
                        song.external_id,
                    ],
                )?;
            }
        }
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(Some(LibraryRecordRef { kind, id }))
    }

    fn get_library_record(&self, kind: MediaKind, id: i64) -> Result<Option<LibraryRecord>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                &format!("SELECT * FROM {} WHERE id = ?1", kind.library_table()),
                [id],
                |row| Self::row_to_library_record(kind, row),
            )
            .optional()?;
        Ok(record)
    }

    fn delete_library_record(&self, kind: MediaKind, id: i64) -> Result<Option<LibraryRecord>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                &format!(
                    "DELETE FROM {} WHERE id = ?1 RETURNING *",
                    kind.library_table()
                ),
                [id],
                |row| Self::row_to_library_record(kind, row),
            )
            .optional()?;
        Ok(record)
    }

    fn bump_cache_key(&self, kind: MediaKind, id: i64) -> Result<Option<i64>> {
        let conn = self.conn()?;
        let cache_key = conn
            .query_row(
                &format!(
                    "UPDATE {} SET cache_key = cache_key + 1 WHERE id = ?1 RETURNING cache_key",
                    kind.library_table()
                ),
                [id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(cache_key)
    }

    fn queued_external_ids(&self, external_ids: &[String]) -> Result<HashSet<String>> {
        self.external_ids_in("queue_entries", external_ids)
    }

    fn downloaded_external_ids(
        &self,
        kind: MediaKind,
        external_ids: &[String],
    ) -> Result<HashSet<String>> {
        self.external_ids_in(kind.library_table(), external_ids)
    }

    fn blacklisted_external_ids(&self, external_ids: &[String]) -> Result<HashSet<String>> {
        self.external_ids_in("blacklist", external_ids)
    }

    fn add_to_blacklist(&self, entry: &BlacklistEntry) -> Result<bool> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            r#"INSERT OR IGNORE INTO blacklist (external_id, media_kind, created_by, created_at)
               VALUES (?1, ?2, ?3, ?4)"#,
            params![
                entry.external_id,
                entry.media_kind.as_str(),
                entry.created_by,
                entry.created_at,
            ],
        )?;
        Ok(inserted > 0)
    }

    fn append_activity(&self, record: &ActivityRecord) -> Result<i64> {
        let conn = self.conn()?;
        Ok(insert_activity(&conn, record)?)
    }

    fn list_activity(&self, limit: usize, offset: usize) -> Result<Vec<ActivityRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT * FROM activity
               ORDER BY created_at DESC, id DESC
               LIMIT ?1 OFFSET ?2"#,
        )?;
        let records = stmt
            .query_map(params![limit as i64, offset as i64], Self::row_to_activity)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn book_payload(title: &str) -> QueuePayload {
        QueuePayload::Book(BookPayload {
            title: title.to_string(),
            author: "Frank Herbert".to_string(),
            publisher: "Chilton".to_string(),
            year: "1965".to_string(),
            language: "English".to_string(),
            pages: "412".to_string(),
            size: "1 Mb".to_string(),
            extension: "epub".to_string(),
            mirror: "/ads.php?md5=abc".to_string(),
        })
    }

    pub(crate) fn approved_book(external_id: &str) -> QueueEntry {
        QueueEntry::new(external_id.to_string(), None, book_payload("Dune"), "user-1".into())
            .with_approver("admin".into())
    }

    fn new_book(external_id: &str, path: &str) -> NewLibraryRecord {
        NewLibraryRecord::Book(NewBook {
            title: "Dune".to_string(),
            author: "Frank Herbert".to_string(),
            publisher: "Chilton".to_string(),
            year: "1965".to_string(),
            extension: "epub".to_string(),
            path: PathBuf::from(path),
            external_id: external_id.to_string(),
        })
    }

    #[test]
    fn test_insert_and_get_queue_entry() {
        let store = SqliteAcquisitionStore::in_memory().unwrap();
        let entry = approved_book("ext-1");
        store.insert_queue_entry(&entry).unwrap();

        let loaded = store.get_queue_entry(&entry.id).unwrap().unwrap();
        assert_eq!(loaded, entry);
    }

    #[test]
    fn test_get_missing_queue_entry() {
        let store = SqliteAcquisitionStore::in_memory().unwrap();
        assert!(store.get_queue_entry("missing").unwrap().is_none());
    }

    #[test]
    fn test_list_eligible_filters_approval_and_attempts() {
        let store = SqliteAcquisitionStore::in_memory().unwrap();

        let unapproved = QueueEntry::new("a".into(), None, book_payload("A"), "user-1".into());
        let approved = approved_book("b");
        let mut at_limit = approved_book("c");
        at_limit.attempts = MAX_QUEUE_ATTEMPTS;
        let mut exhausted = approved_book("d");
        exhausted.attempts = MAX_QUEUE_ATTEMPTS + 1;

        for entry in [&unapproved, &approved, &at_limit, &exhausted] {
            store.insert_queue_entry(entry).unwrap();
        }

        let eligible: Vec<String> = store
            .list_eligible_entries()
            .unwrap()
            .into_iter()
            .map(|e| e.external_id)
            .collect();
        assert_eq!(eligible.len(), 2);
        assert!(eligible.contains(&"b".to_string()));
        assert!(eligible.contains(&"c".to_string()));
    }

    #[test]
    fn test_list_queue_entries_is_ordered_and_paginated() {
        let store = SqliteAcquisitionStore::in_memory().unwrap();
        for i in 0..5 {
            let mut entry = approved_book(&format!("ext-{}", i));
            entry.created_at = 1000 + i;
            store.insert_queue_entry(&entry).unwrap();
        }

        let page1 = store.list_queue_entries(2, 0).unwrap();
        let page3 = store.list_queue_entries(2, 4).unwrap();
        assert_eq!(page1.len(), 2);
        assert_eq!(page1[0].external_id, "ext-0");
        assert_eq!(page3.len(), 1);
        assert_eq!(page3[0].external_id, "ext-4");
    }

    fn exhausted(entry: &QueueEntry) -> ActivityRecord {
        ActivityRecord::new(ActivityKind::Failed, format!("Failed to download {}", entry.display_title()))
    }

    #[test]
    fn test_record_failed_attempt() {
        let store = SqliteAcquisitionStore::in_memory().unwrap();
        let entry = approved_book("ext-1");
        store.insert_queue_entry(&entry).unwrap();

        assert_eq!(store.record_failed_attempt(&entry.id, &exhausted(&entry)).unwrap(), Some(1));
        assert_eq!(store.record_failed_attempt(&entry.id, &exhausted(&entry)).unwrap(), Some(2));
        assert_eq!(store.record_failed_attempt("missing", &exhausted(&entry)).unwrap(), None);
        assert!(store.list_activity(10, 0).unwrap().is_empty());
    }

    #[test]
    fn test_record_failed_attempt_logs_exhaustion_once() {
        let store = SqliteAcquisitionStore::in_memory().unwrap();
        let entry = approved_book("ext-1");
        store.insert_queue_entry(&entry).unwrap();

        for _ in 0..MAX_QUEUE_ATTEMPTS + 2 {
            store.record_failed_attempt(&entry.id, &exhausted(&entry)).unwrap();
        }

        let activity = store.list_activity(10, 0).unwrap();
        assert_eq!(activity.len(), 1);
        assert_eq!(activity[0].kind, ActivityKind::Failed);
        assert_eq!(
            store.get_queue_entry(&entry.id).unwrap().unwrap().attempts,
            MAX_QUEUE_ATTEMPTS + 2
        );
    }

    #[test]
    fn test_record_failed_attempt_rolls_back_when_activity_insert_fails() {
        let store = SqliteAcquisitionStore::in_memory().unwrap();
        let mut entry = approved_book("ext-1");
        entry.attempts = MAX_QUEUE_ATTEMPTS;
        store.insert_queue_entry(&entry).unwrap();
        store
            .conn()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER reject_activity BEFORE INSERT ON activity
                 BEGIN SELECT RAISE(ABORT, 'activity unavailable'); END;",
            )
            .unwrap();

        assert!(store.record_failed_attempt(&entry.id, &exhausted(&entry)).is_err());
        assert_eq!(
            store.get_queue_entry(&entry.id).unwrap().unwrap().attempts,
            MAX_QUEUE_ATTEMPTS
        );

        // The next failure gets another chance to record the exhaustion.
        store.conn().unwrap().execute_batch("DROP TRIGGER reject_activity").unwrap();
        assert_eq!(
            store.record_failed_attempt(&entry.id, &exhausted(&entry)).unwrap(),
            Some(MAX_QUEUE_ATTEMPTS + 1)
        );
        assert_eq!(store.list_activity(10, 0).unwrap().len(), 1);
    }

    #[test]
    fn test_approve_entry_only_once() {
        let store = SqliteAcquisitionStore::in_memory().unwrap();
        let entry = QueueEntry::new("x".into(), None, book_payload("X"), "user-1".into());
        store.insert_queue_entry(&entry).unwrap();

        assert!(store.approve_entry(&entry.id, "admin-1").unwrap());
        assert!(!store.approve_entry(&entry.id, "admin-2").unwrap());

        let loaded = store.get_queue_entry(&entry.id).unwrap().unwrap();
        assert_eq!(loaded.approved_by.as_deref(), Some("admin-1"));
    }

    #[test]
    fn test_complete_entry_moves_entry_to_library() {
        let store = SqliteAcquisitionStore::in_memory().unwrap();
        let entry = approved_book("ext-1");
        store.insert_queue_entry(&entry).unwrap();

        let record_ref = store
            .complete_entry(&entry.id, &new_book("ext-1", "/books/dune.epub"))
            .unwrap()
            .unwrap();
        assert_eq!(record_ref.kind, MediaKind::Book);

        assert!(store.get_queue_entry(&entry.id).unwrap().is_none());
        let record = store
            .get_library_record(MediaKind::Book, record_ref.id)
            .unwrap()
            .unwrap();
        assert_eq!(record.contributors, "Frank Herbert");
        assert_eq!(record.path, PathBuf::from("/books/dune.epub"));
        assert_eq!(record.cache_key, 1);
    }

    #[test]
    fn test_complete_entry_twice_inserts_once() {
        let store = SqliteAcquisitionStore::in_memory().unwrap();
        let entry = approved_book("ext-1");
        store.insert_queue_entry(&entry).unwrap();

        let record = new_book("ext-1", "/books/dune.epub");
        assert!(store.complete_entry(&entry.id, &record).unwrap().is_some());
        assert!(store.complete_entry(&entry.id, &record).unwrap().is_none());

        let downloaded = store
            .downloaded_external_ids(MediaKind::Book, &["ext-1".to_string()])
            .unwrap();
        assert_eq!(downloaded.len(), 1);
        let count: i64 = store
            .conn()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM books", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_complete_entry_bumps_cache_key_of_overwritten_file() {
        let store = SqliteAcquisitionStore::in_memory().unwrap();
        let first = approved_book("ext-1");
        let second = approved_book("ext-1");
        store.insert_queue_entry(&first).unwrap();
        store.insert_queue_entry(&second).unwrap();

        let old = store
            .complete_entry(&first.id, &new_book("ext-1", "/books/dune.epub"))
            .unwrap()
            .unwrap();
        store
            .complete_entry(&second.id, &new_book("ext-1", "/books/dune.epub"))
            .unwrap()
            .unwrap();

        let old = store.get_library_record(MediaKind::Book, old.id).unwrap().unwrap();
        assert_eq!(old.cache_key, 2);
    }

    #[test]
    fn test_delete_library_record_returns_row() {
        let store = SqliteAcquisitionStore::in_memory().unwrap();
        let entry = approved_book("ext-1");
        store.insert_queue_entry(&entry).unwrap();
        let record_ref = store
            .complete_entry(&entry.id, &new_book("ext-1", "/books/dune.epub"))
            .unwrap()
            .unwrap();

        let deleted = store
            .delete_library_record(MediaKind::Book, record_ref.id)
            .unwrap()
            .unwrap();
        assert_eq!(deleted.external_id, "ext-1");
        assert!(store
            .delete_library_record(MediaKind::Book, record_ref.id)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_bump_cache_key() {
        let store = SqliteAcquisitionStore::in_memory().unwrap();
        let entry = approved_book("ext-1");
        store.insert_queue_entry(&entry).unwrap();
        let record_ref = store
            .complete_entry(&entry.id, &new_book("ext-1", "/books/dune.epub"))
            .unwrap()
            .unwrap();

        assert_eq!(
            store.bump_cache_key(MediaKind::Book, record_ref.id).unwrap(),
            Some(2)
        );
        assert_eq!(store.bump_cache_key(MediaKind::Song, record_ref.id).unwrap(), None);
    }

    #[test]
    fn test_membership_lookups() {
        let store = SqliteAcquisitionStore::in_memory().unwrap();
        store.insert_queue_entry(&approved_book("queued")).unwrap();
        store
            .add_to_blacklist(&BlacklistEntry {
                external_id: "banned".to_string(),
                media_kind: MediaKind::Book,
                created_by: Some("admin".to_string()),
                created_at: 0,
            })
            .unwrap();

        let ids = vec![
            "queued".to_string(),
            "banned".to_string(),
            "unknown".to_string(),
        ];
        let queued = store.queued_external_ids(&ids).unwrap();
        let banned = store.blacklisted_external_ids(&ids).unwrap();

        assert_eq!(queued, HashSet::from(["queued".to_string()]));
        assert_eq!(banned, HashSet::from(["banned".to_string()]));
        assert!(store.queued_external_ids(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_add_to_blacklist_is_idempotent() {
        let store = SqliteAcquisitionStore::in_memory().unwrap();
        let entry = BlacklistEntry {
            external_id: "x".to_string(),
            media_kind: MediaKind::Song,
            created_by: None,
            created_at: 0,
        };
        assert!(store.add_to_blacklist(&entry).unwrap());
        assert!(!store.add_to_blacklist(&entry).unwrap());
    }

    #[test]
    fn test_activity_round_trip_newest_first() {
        let store = SqliteAcquisitionStore::in_memory().unwrap();
        let mut first = ActivityRecord::new(ActivityKind::Queued, "Dune").with_user("user-1");
        first.created_at = 100;
        let mut second = ActivityRecord::new(ActivityKind::Succeeded, "Dune")
            .with_library_record(LibraryRecordRef {
                kind: MediaKind::Book,
                id: 7,
            });
        second.created_at = 200;

        store.append_activity(&first).unwrap();
        store.append_activity(&second).unwrap();

        let feed = store.list_activity(10, 0).unwrap();
        assert_eq!(feed.len(), 2);
        assert_eq!(feed[0].kind, ActivityKind::Succeeded);
        assert_eq!(
            feed[0].library_record,
            Some(LibraryRecordRef {
                kind: MediaKind::Book,
                id: 7
            })
        );
        assert_eq!(feed[1].user_id.as_deref(), Some("user-1"));
    }

    #[test]
    fn test_file_backed_store_persists() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("acquisition.db");
        let entry = approved_book("ext-1");
        {
            let store = SqliteAcquisitionStore::new(&path).unwrap();
            store.insert_queue_entry(&entry).unwrap();
        }
        let store = SqliteAcquisitionStore::new(&path).unwrap();
        assert!(store.get_queue_entry(&entry.id).unwrap().is_some());
    }
}
