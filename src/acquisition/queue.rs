//! Queue operations.
//!
//! All queue and library mutations go through [`QueueService`], which pairs
//! each state change with its activity entry.

use std::sync::Arc;

use anyhow::Result;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::activity::ActivityReporter;
use super::error::AcquisitionError;
use super::models::*;
use super::store::AcquisitionStore;
use crate::catalog::{Candidate, INVALID_EXTERNAL_ID};
use crate::user::{Permission, Requester};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Missing permission {}", .0.as_str())]
    Forbidden(Permission),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub struct QueueService {
    store: Arc<dyn AcquisitionStore>,
    reporter: ActivityReporter,
}

fn require(requester: &Requester, permission: Permission) -> Result<(), QueueError> {
    if requester.has_permission(permission) {
        Ok(())
    } else {
        Err(QueueError::Forbidden(permission))
    }
}

impl QueueService {
    pub fn new(store: Arc<dyn AcquisitionStore>) -> Self {
        Self {
            reporter: ActivityReporter::new(store.clone()),
            store,
        }
    }

    /// Queue a candidate on behalf of `requester`.
    ///
    /// Approvers' requests are approved on creation. The same external id may
    /// be queued more than once; search results flag already queued items.
    pub fn enqueue(&self, candidate: Candidate, requester: &Requester) -> Result<QueueEntry, QueueError> {
        require(requester, Permission::RequestContent)?;

        let external_id = candidate.external_id.trim();
        if external_id.is_empty() || external_id == INVALID_EXTERNAL_ID {
            return Err(QueueError::InvalidRequest(format!(
                "candidate '{}' has no usable external id",
                candidate.title
            )));
        }
        if !self
            .store
            .blacklisted_external_ids(&[external_id.to_string()])?
            .is_empty()
        {
            return Err(QueueError::InvalidRequest(format!(
                "{} is blacklisted",
                external_id
            )));
        }

        let mut entry = QueueEntry::new(
            external_id.to_string(),
            candidate.cover_url,
            candidate.payload,
            requester.user_id.clone(),
        );
        if requester.has_permission(Permission::ApproveRequests) {
            entry = entry.with_approver(requester.user_id.clone());
        }

        self.store.insert_queue_entry(&entry)?;
        self.reporter.log_queued(&entry)?;

        info!(
            "Queued {} {} ({}) for {}{}",
            entry.media_kind.as_str(),
            entry.external_id,
            entry.display_title(),
            entry.requested_by,
            if entry.approved_by.is_some() { ", pre-approved" } else { "" }
        );
        Ok(entry)
    }

    /// Approved entries still within their attempt budget, oldest first.
    pub fn list_eligible(&self) -> Result<Vec<QueueEntry>> {
        self.store.list_eligible_entries()
    }

    /// Count a failed download. Returns the new attempt count, or None if the
    /// entry was removed in the meantime.
    ///
    /// The failure that exhausts the entry emits a single `failed` activity.
    pub fn record_failure(&self, entry: &QueueEntry, error: &AcquisitionError) -> Result<Option<i64>> {
        let attempts = match self.reporter.log_failed_attempt(entry)? {
            Some(attempts) => attempts,
            None => {
                debug!(
                    "Queue entry {} vanished before its failure was recorded",
                    entry.id
                );
                return Ok(None);
            }
        };

        warn!(
            "Download of {} failed (attempt {}): {}",
            entry.display_title(),
            attempts,
            error
        );

        if attempts == MAX_QUEUE_ATTEMPTS + 1 {
            warn!(
                "Giving up on {} after {} attempts",
                entry.display_title(),
                attempts
            );
        }
        Ok(Some(attempts))
    }

    /// Remove the entry and store its library record atomically.
    ///
    /// Returns None, inserting nothing, if the entry is already gone.
    pub fn record_success(
        &self,
        entry: &QueueEntry,
        record: &NewLibraryRecord,
    ) -> Result<Option<LibraryRecordRef>> {
        let record_ref = match self.store.complete_entry(&entry.id, record)? {
            Some(record_ref) => record_ref,
            None => {
                debug!("Queue entry {} already completed", entry.id);
                return Ok(None);
            }
        };

        self.reporter.log_succeeded(entry, record_ref)?;
        info!(
            "Downloaded {} to {:?}",
            entry.display_title(),
            record.path()
        );
        Ok(Some(record_ref))
    }

    /// Approve a pending entry. Approving an approved entry changes nothing.
    pub fn approve(&self, entry_id: &str, approver: &Requester) -> Result<QueueEntry, QueueError> {
        require(approver, Permission::ApproveRequests)?;

        let entry = self
            .store
            .get_queue_entry(entry_id)?
            .ok_or_else(|| QueueError::NotFound(format!("queue entry {}", entry_id)))?;
        if entry.approved_by.is_some() {
            return Ok(entry);
        }

        if self.store.approve_entry(entry_id, &approver.user_id)? {
            self.reporter.log_approved(&entry, &approver.user_id)?;
            info!("{} approved {}", approver.user_id, entry.display_title());
        }

        self.store
            .get_queue_entry(entry_id)?
            .ok_or_else(|| QueueError::NotFound(format!("queue entry {}", entry_id)))
    }

    pub fn list(&self, limit: usize, offset: usize) -> Result<Vec<QueueEntry>> {
        self.store.list_queue_entries(limit, offset)
    }

    /// Delete a queue entry, optionally blacklisting its external id.
    ///
    /// Requesters may withdraw their own entries; anything else, including
    /// blacklisting, needs approval rights.
    pub fn remove(&self, entry_id: &str, blacklist: bool, requester: &Requester) -> Result<QueueEntry, QueueError> {
        let entry = self
            .store
            .get_queue_entry(entry_id)?
            .ok_or_else(|| QueueError::NotFound(format!("queue entry {}", entry_id)))?;

        if blacklist || entry.requested_by != requester.user_id {
            require(requester, Permission::ApproveRequests)?;
        }

        if !self.store.delete_queue_entry(entry_id)? {
            return Err(QueueError::NotFound(format!("queue entry {}", entry_id)));
        }
        if blacklist {
            self.add_to_blacklist(&entry.external_id, entry.media_kind, &requester.user_id)?;
        }
        self.reporter
            .log_queue_removed(&entry, blacklist, &requester.user_id)?;

        info!(
            "{} removed {} from the queue{}",
            requester.user_id,
            entry.display_title(),
            if blacklist { " and blacklisted it" } else { "" }
        );
        Ok(entry)
    }

    /// Delete a library record and its file, optionally blacklisting its
    /// external id. A missing file is not an error.
    pub async fn remove_library_record(
        &self,
        kind: MediaKind,
        id: i64,
        blacklist: bool,
        requester: &Requester,
    ) -> Result<LibraryRecord, QueueError> {
        require(requester, Permission::ManageLibrary)?;

        let record = self
            .store
            .delete_library_record(kind, id)?
            .ok_or_else(|| QueueError::NotFound(format!("{} {}", kind.as_str(), id)))?;

        if let Err(e) = tokio::fs::remove_file(&record.path).await {
            warn!("Could not remove {:?}: {}", record.path, e);
        }
        if blacklist {
            self.add_to_blacklist(&record.external_id, kind, &requester.user_id)?;
        }

        self.reporter
            .log_library_removed(&record, blacklist, &requester.user_id)?;
        info!(
            "{} removed {} {} ({})",
            requester.user_id,
            kind.as_str(),
            id,
            record.title
        );
        Ok(record)
    }

    pub fn activity(&self, limit: usize, offset: usize) -> Result<Vec<ActivityRecord>> {
        self.reporter.recent(limit, offset)
    }

    fn add_to_blacklist(&self, external_id: &str, kind: MediaKind, user_id: &str) -> Result<()> {
        let inserted = self.store.add_to_blacklist(&BlacklistEntry {
            external_id: external_id.to_string(),
            media_kind: kind,
            created_by: Some(user_id.to_string()),
            created_at: chrono::Utc::now().timestamp(),
        })?;
        if !inserted {
            debug!("{} was already blacklisted", external_id);
        }
        Ok(())
    }
}
