//! Activity reporting for acquisition events.
//!
//! Provides a higher-level interface over the store's append-only activity
//! log. This is the only place failures become user visible.

use std::sync::Arc;

use anyhow::Result;

use super::models::{ActivityKind, ActivityRecord, LibraryRecord, LibraryRecordRef, QueueEntry};
use super::store::AcquisitionStore;

/// Helper for recording activity entries from queue and library events.
pub struct ActivityReporter {
    store: Arc<dyn AcquisitionStore>,
}

impl ActivityReporter {
    pub fn new(store: Arc<dyn AcquisitionStore>) -> Self {
        Self { store }
    }

    /// A user queued a new request.
    pub fn log_queued(&self, entry: &QueueEntry) -> Result<i64> {
        let record = ActivityRecord::new(
            ActivityKind::Queued,
            format!("Queued {}", entry.display_title()),
        )
        .with_user(entry.requested_by.clone());
        self.store.append_activity(&record)
    }

    /// A download finished and produced a library record.
    pub fn log_succeeded(&self, entry: &QueueEntry, record: LibraryRecordRef) -> Result<i64> {
        let activity = ActivityRecord::new(
            ActivityKind::Succeeded,
            format!("Downloaded {}", entry.display_title()),
        )
        .with_user(entry.requested_by.clone())
        .with_library_record(record);
        self.store.append_activity(&activity)
    }

    /// Count a failed download attempt. The failure that runs the entry out of
    /// attempts is logged together with the counter update.
    ///
    /// Returns the new attempt count, or None if the entry is gone.
    pub fn log_failed_attempt(&self, entry: &QueueEntry) -> Result<Option<i64>> {
        let exhausted = ActivityRecord::new(
            ActivityKind::Failed,
            format!("Failed to download {}", entry.display_title()),
        )
        .with_user(entry.requested_by.clone());
        self.store.record_failed_attempt(&entry.id, &exhausted)
    }

    /// An approver signed off a pending request.
    pub fn log_approved(&self, entry: &QueueEntry, approver: &str) -> Result<i64> {
        let record = ActivityRecord::new(
            ActivityKind::Updated,
            format!("Approved {}", entry.display_title()),
        )
        .with_user(approver);
        self.store.append_activity(&record)
    }

    /// A pending request was dropped from the queue, optionally blacklisting
    /// its source.
    pub fn log_queue_removed(
        &self,
        entry: &QueueEntry,
        blacklisted: bool,
        user_id: &str,
    ) -> Result<i64> {
        let verb = if blacklisted {
            "Removed and blacklisted"
        } else {
            "Removed"
        };
        let record = ActivityRecord::new(
            ActivityKind::Updated,
            format!("{} {} from the queue", verb, entry.display_title()),
        )
        .with_user(user_id);
        self.store.append_activity(&record)
    }

    /// A library record was removed, optionally blacklisting its source.
    pub fn log_library_removed(
        &self,
        record: &LibraryRecord,
        blacklisted: bool,
        user_id: &str,
    ) -> Result<i64> {
        let verb = if blacklisted {
            "Removed and blacklisted"
        } else {
            "Removed"
        };
        let activity = ActivityRecord::new(
            ActivityKind::Updated,
            format!("{} {} by {}", verb, record.title, record.contributors),
        )
        .with_user(user_id)
        .with_library_record(LibraryRecordRef {
            kind: record.kind,
            id: record.id,
        });
        self.store.append_activity(&activity)
    }

    pub fn recent(&self, limit: usize, offset: usize) -> Result<Vec<ActivityRecord>> {
        self.store.list_activity(limit, offset)
    }
}
