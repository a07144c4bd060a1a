//! Live progress of running downloads.
//!
//! Each scheduler owns an [`ActiveDownloads`] registry. Executors receive a
//! [`ProgressHandle`] for their entry; the registration guard removes it when
//! the task ends, however it ends.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, RwLock};

use serde::Serialize;

use super::models::{MediaKind, QueueEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStage {
    Resolving,
    Fetching,
    Transcoding,
    Tagging,
}

impl DownloadStage {
    fn as_u8(self) -> u8 {
        match self {
            DownloadStage::Resolving => 0,
            DownloadStage::Fetching => 1,
            DownloadStage::Transcoding => 2,
            DownloadStage::Tagging => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => DownloadStage::Fetching,
            2 => DownloadStage::Transcoding,
            3 => DownloadStage::Tagging,
            _ => DownloadStage::Resolving,
        }
    }
}

#[derive(Debug, Default)]
struct ProgressState {
    stage: AtomicU8,
    bytes_received: AtomicU64,
    /// 0 when the length is not known
    total_bytes: AtomicU64,
}

/// Write side of a single download's progress. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct ProgressHandle {
    state: Arc<ProgressState>,
}

impl ProgressHandle {
    pub fn set_stage(&self, stage: DownloadStage) {
        self.state.stage.store(stage.as_u8(), Ordering::Relaxed);
    }

    pub fn set_total_bytes(&self, total: Option<u64>) {
        self.state
            .total_bytes
            .store(total.unwrap_or(0), Ordering::Relaxed);
    }

    pub fn add_bytes(&self, bytes: u64) {
        self.state.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn stage(&self) -> DownloadStage {
        DownloadStage::from_u8(self.state.stage.load(Ordering::Relaxed))
    }

    pub fn bytes_received(&self) -> u64 {
        self.state.bytes_received.load(Ordering::Relaxed)
    }

    pub fn total_bytes(&self) -> Option<u64> {
        match self.state.total_bytes.load(Ordering::Relaxed) {
            0 => None,
            total => Some(total),
        }
    }
}

/// Point-in-time view of a running download.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadProgress {
    pub entry_id: String,
    pub media_kind: MediaKind,
    pub title: String,
    pub stage: DownloadStage,
    pub bytes_received: u64,
    pub total_bytes: Option<u64>,
    /// Percent complete, when the total size is known
    pub percent: Option<f64>,
}

struct ActiveDownload {
    media_kind: MediaKind,
    title: String,
    handle: ProgressHandle,
}

/// Registry of downloads currently executing.
#[derive(Clone, Default)]
pub struct ActiveDownloads {
    inner: Arc<RwLock<HashMap<String, ActiveDownload>>>,
}

impl ActiveDownloads {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a download. It stays listed until the guard is dropped.
    pub fn register(&self, entry: &QueueEntry) -> ActiveDownloadGuard {
        let handle = ProgressHandle::default();
        if let Ok(mut map) = self.inner.write() {
            map.insert(
                entry.id.clone(),
                ActiveDownload {
                    media_kind: entry.media_kind,
                    title: entry.display_title(),
                    handle: handle.clone(),
                },
            );
        }
        ActiveDownloadGuard {
            registry: self.clone(),
            entry_id: entry.id.clone(),
            handle,
        }
    }

    pub fn snapshot(&self) -> Vec<DownloadProgress> {
        let map = match self.inner.read() {
            Ok(map) => map,
            Err(_) => return Vec::new(),
        };
        let mut downloads: Vec<DownloadProgress> = map
            .iter()
            .map(|(entry_id, download)| {
                let bytes_received = download.handle.bytes_received();
                let total_bytes = download.handle.total_bytes();
                DownloadProgress {
                    entry_id: entry_id.clone(),
                    media_kind: download.media_kind,
                    title: download.title.clone(),
                    stage: download.handle.stage(),
                    bytes_received,
                    total_bytes,
                    percent: total_bytes
                        .map(|total| (bytes_received as f64 / total as f64 * 100.0).min(100.0)),
                }
            })
            .collect();
        downloads.sort_by(|a, b| a.entry_id.cmp(&b.entry_id));
        downloads
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, entry_id: &str) {
        if let Ok(mut map) = self.inner.write() {
            map.remove(entry_id);
        }
    }
}

/// Keeps a download listed in its registry while alive.
pub struct ActiveDownloadGuard {
    registry: ActiveDownloads,
    entry_id: String,
    handle: ProgressHandle,
}

impl ActiveDownloadGuard {
    pub fn handle(&self) -> ProgressHandle {
        self.handle.clone()
    }
}

impl Drop for ActiveDownloadGuard {
    fn drop(&mut self) {
        self.registry.remove(&self.entry_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::store::tests::approved_book;

    #[test]
    fn test_guard_registers_and_removes() {
        let registry = ActiveDownloads::new();
        let entry = approved_book("1");
        {
            let _guard = registry.register(&entry);
            assert_eq!(registry.len(), 1);
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_reflects_handle_updates() {
        let registry = ActiveDownloads::new();
        let entry = approved_book("1");
        let guard = registry.register(&entry);
        let handle = guard.handle();

        handle.set_stage(DownloadStage::Fetching);
        handle.set_total_bytes(Some(200));
        handle.add_bytes(50);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].entry_id, entry.id);
        assert_eq!(snapshot[0].stage, DownloadStage::Fetching);
        assert_eq!(snapshot[0].bytes_received, 50);
        assert_eq!(snapshot[0].percent, Some(25.0));
    }

    #[test]
    fn test_unknown_total_has_no_percent() {
        let registry = ActiveDownloads::new();
        let guard = registry.register(&approved_book("1"));
        guard.handle().add_bytes(10);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot[0].total_bytes, None);
        assert_eq!(snapshot[0].percent, None);
    }

    #[test]
    fn test_registries_are_independent() {
        let a = ActiveDownloads::new();
        let b = ActiveDownloads::new();
        let _guard = a.register(&approved_book("1"));
        assert_eq!(a.len(), 1);
        assert!(b.is_empty());
    }
}
