//! Cross-references search candidates with the queue, the library and the
//! blacklist.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use super::models::MediaKind;
use super::store::AcquisitionStore;
use crate::catalog::Candidate;

/// A candidate with its queue and library status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotatedCandidate {
    #[serde(flatten)]
    pub candidate: Candidate,
    pub queued: bool,
    pub downloaded: bool,
}

pub struct DedupFilter {
    store: Arc<dyn AcquisitionStore>,
}

impl DedupFilter {
    pub fn new(store: Arc<dyn AcquisitionStore>) -> Self {
        Self { store }
    }

    /// Drop blacklisted candidates and flag the rest, keeping adapter order.
    ///
    /// Runs one batched lookup per category regardless of the batch size.
    pub fn annotate(
        &self,
        kind: MediaKind,
        candidates: Vec<Candidate>,
    ) -> Result<Vec<AnnotatedCandidate>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = candidates.iter().map(|c| c.external_id.clone()).collect();
        let blacklisted = self.store.blacklisted_external_ids(&ids)?;
        let queued = self.store.queued_external_ids(&ids)?;
        let downloaded = self.store.downloaded_external_ids(kind, &ids)?;

        Ok(candidates
            .into_iter()
            .filter(|c| !blacklisted.contains(&c.external_id))
            .map(|candidate| AnnotatedCandidate {
                queued: queued.contains(&candidate.external_id),
                downloaded: downloaded.contains(&candidate.external_id),
                candidate,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::models::*;
    use crate::acquisition::store::tests::{approved_book, book_payload};
    use crate::acquisition::store::SqliteAcquisitionStore;
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn candidate(external_id: &str) -> Candidate {
        Candidate {
            external_id: external_id.to_string(),
            title: format!("Book {}", external_id),
            subtitle: String::new(),
            cover_url: None,
            source_mirror: None,
            payload: book_payload("Book"),
        }
    }

    fn seeded_store() -> Arc<SqliteAcquisitionStore> {
        let store = SqliteAcquisitionStore::in_memory().unwrap();

        store.insert_queue_entry(&approved_book("queued")).unwrap();

        let done = approved_book("downloaded");
        store.insert_queue_entry(&done).unwrap();
        store
            .complete_entry(
                &done.id,
                &NewLibraryRecord::Book(NewBook {
                    title: "Book".into(),
                    author: "Author".into(),
                    publisher: String::new(),
                    year: String::new(),
                    extension: "pdf".into(),
                    path: PathBuf::from("/books/book.pdf"),
                    external_id: "downloaded".into(),
                }),
            )
            .unwrap();

        store
            .add_to_blacklist(&BlacklistEntry {
                external_id: "banned".into(),
                media_kind: MediaKind::Book,
                created_by: None,
                created_at: 0,
            })
            .unwrap();

        Arc::new(store)
    }

    #[test]
    fn test_annotates_and_drops_blacklisted() {
        let filter = DedupFilter::new(seeded_store());
        let result = filter
            .annotate(
                MediaKind::Book,
                vec![
                    candidate("fresh"),
                    candidate("banned"),
                    candidate("queued"),
                    candidate("downloaded"),
                ],
            )
            .unwrap();

        let ids: Vec<&str> = result
            .iter()
            .map(|a| a.candidate.external_id.as_str())
            .collect();
        assert_eq!(ids, vec!["fresh", "queued", "downloaded"]);

        assert!(!result[0].queued && !result[0].downloaded);
        assert!(result[1].queued && !result[1].downloaded);
        assert!(!result[2].queued && result[2].downloaded);
    }

    #[test]
    fn test_downloaded_is_scoped_to_kind() {
        let filter = DedupFilter::new(seeded_store());
        let result = filter
            .annotate(MediaKind::Song, vec![candidate("downloaded")])
            .unwrap();
        assert!(!result[0].downloaded);
    }

    #[test]
    fn test_annotated_candidate_serializes_flat() {
        let annotated = AnnotatedCandidate {
            candidate: candidate("x"),
            queued: true,
            downloaded: false,
        };
        let json = serde_json::to_value(&annotated).unwrap();
        assert_eq!(json["external_id"], "x");
        assert_eq!(json["queued"], true);
        assert_eq!(json["payload"]["kind"], "book");
    }

    /// Counts lookups to verify batching.
    struct CountingStore {
        inner: SqliteAcquisitionStore,
        lookups: AtomicUsize,
    }

    impl AcquisitionStore for CountingStore {
        fn insert_queue_entry(&self, entry: &QueueEntry) -> Result<()> {
            self.inner.insert_queue_entry(entry)
        }
        fn get_queue_entry(&self, id: &str) -> Result<Option<QueueEntry>> {
            self.inner.get_queue_entry(id)
        }
        fn list_queue_entries(&self, limit: usize, offset: usize) -> Result<Vec<QueueEntry>> {
            self.inner.list_queue_entries(limit, offset)
        }
        fn list_eligible_entries(&self) -> Result<Vec<QueueEntry>> {
            self.inner.list_eligible_entries()
        }
        fn record_failed_attempt(
            &self,
            id: &str,
            exhausted: &ActivityRecord,
        ) -> Result<Option<i64>> {
            self.inner.record_failed_attempt(id, exhausted)
        }
        fn approve_entry(&self, id: &str, approver: &str) -> Result<bool> {
            self.inner.approve_entry(id, approver)
        }
        fn delete_queue_entry(&self, id: &str) -> Result<bool> {
            self.inner.delete_queue_entry(id)
        }
        fn complete_entry(
            &self,
            entry_id: &str,
            record: &NewLibraryRecord,
        ) -> Result<Option<LibraryRecordRef>> {
            self.inner.complete_entry(entry_id, record)
        }
        fn get_library_record(&self, kind: MediaKind, id: i64) -> Result<Option<LibraryRecord>> {
            self.inner.get_library_record(kind, id)
        }
        fn delete_library_record(
            &self,
            kind: MediaKind,
            id: i64,
        ) -> Result<Option<LibraryRecord>> {
            self.inner.delete_library_record(kind, id)
        }
        fn bump_cache_key(&self, kind: MediaKind, id: i64) -> Result<Option<i64>> {
            self.inner.bump_cache_key(kind, id)
        }
        fn queued_external_ids(&self, ids: &[String]) -> Result<HashSet<String>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.queued_external_ids(ids)
        }
        fn downloaded_external_ids(
            &self,
            kind: MediaKind,
            ids: &[String],
        ) -> Result<HashSet<String>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.downloaded_external_ids(kind, ids)
        }
        fn blacklisted_external_ids(&self, ids: &[String]) -> Result<HashSet<String>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.blacklisted_external_ids(ids)
        }
        fn add_to_blacklist(&self, entry: &BlacklistEntry) -> Result<bool> {
            self.inner.add_to_blacklist(entry)
        }
        fn append_activity(&self, record: &ActivityRecord) -> Result<i64> {
            self.inner.append_activity(record)
        }
        fn list_activity(&self, limit: usize, offset: usize) -> Result<Vec<ActivityRecord>> {
            self.inner.list_activity(limit, offset)
        }
    }

    #[test]
    fn test_lookups_are_batched() {
        let store = Arc::new(CountingStore {
            inner: SqliteAcquisitionStore::in_memory().unwrap(),
            lookups: AtomicUsize::new(0),
        });
        let filter = DedupFilter::new(store.clone());

        let candidates: Vec<Candidate> = (0..40).map(|i| candidate(&i.to_string())).collect();
        let result = filter.annotate(MediaKind::Book, candidates).unwrap();

        assert_eq!(result.len(), 40);
        assert_eq!(store.lookups.load(Ordering::SeqCst), 3);
    }
}
