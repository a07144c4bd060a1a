//! Background scheduler draining the acquisition queue.
//!
//! Runs in a loop:
//! 1. Fetch eligible entries
//! 2. Run each in its own task, bounded by the download slot semaphore
//! 3. Record every outcome, including panics, against its entry
//! 4. Sleep for the poll interval

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::error::AcquisitionError;
use super::executors::Executors;
use super::progress::ActiveDownloads;
use super::queue::QueueService;
use crate::config::AcquisitionSettings;

/// Outcome counts of a single scheduler pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    pub dispatched: usize,
    pub succeeded: usize,
    pub failed: usize,
}

pub struct Scheduler {
    queue: Arc<QueueService>,
    executors: Executors,
    active: ActiveDownloads,
    download_slots: Arc<Semaphore>,
    poll_interval: Duration,
}

impl Scheduler {
    pub fn new(queue: Arc<QueueService>, executors: Executors, settings: &AcquisitionSettings) -> Self {
        Self {
            queue,
            executors,
            active: ActiveDownloads::new(),
            download_slots: Arc::new(Semaphore::new(settings.max_concurrent_downloads.max(1))),
            poll_interval: Duration::from_secs(settings.poll_interval_secs),
        }
    }

    /// Registry of downloads this scheduler is running.
    pub fn active_downloads(&self) -> ActiveDownloads {
        self.active.clone()
    }

    /// Main loop - call from a spawned task.
    ///
    /// A pass in progress always completes; shutdown is only observed
    /// between passes.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            "Acquisition scheduler starting (poll_interval={}s)",
            self.poll_interval.as_secs()
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let summary = self.run_pass().await;
            if summary.dispatched > 0 {
                info!(
                    "Scheduler pass finished: {} dispatched, {} succeeded, {} failed",
                    summary.dispatched, summary.succeeded, summary.failed
                );
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = shutdown.cancelled() => {
                    info!("Acquisition scheduler shutting down");
                    break;
                }
            }
        }

        info!("Acquisition scheduler stopped");
    }

    /// Dispatch every eligible entry and wait for all of them.
    ///
    /// Never fails: every error is recorded against its entry or logged.
    pub async fn run_pass(&self) -> PassSummary {
        let entries = match self.queue.list_eligible() {
            Ok(entries) => entries,
            Err(e) => {
                error!("Failed to list eligible queue entries: {:#}", e);
                return PassSummary::default();
            }
        };
        debug!("Scheduler pass: {} eligible entries", entries.len());

        let mut tasks = Vec::with_capacity(entries.len());
        for entry in entries {
            let executor = self.executors.for_kind(entry.media_kind);
            let slots = self.download_slots.clone();
            let active = self.active.clone();
            let task_entry = entry.clone();

            let handle = tokio::spawn(async move {
                let _permit = slots
                    .acquire_owned()
                    .await
                    .map_err(|e| AcquisitionError::Store(e.into()))?;
                let registration = active.register(&task_entry);
                info!(
                    "Downloading {} (attempt {})",
                    task_entry.display_title(),
                    task_entry.attempts + 1
                );
                executor.execute(&task_entry, registration.handle()).await
            });
            tasks.push((entry, handle));
        }

        let mut summary = PassSummary {
            dispatched: tasks.len(),
            ..Default::default()
        };

        for (entry, handle) in tasks {
            let outcome = handle
                .await
                .unwrap_or_else(|e| Err(AcquisitionError::Panicked(join_error_message(e))));

            match outcome {
                Ok(record) => match self.queue.record_success(&entry, &record) {
                    Ok(_) => summary.succeeded += 1,
                    Err(e) => {
                        error!(
                            "Failed to record completed download of {}: {:#}",
                            entry.display_title(),
                            e
                        );
                        summary.failed += 1;
                    }
                },
                Err(e) => {
                    summary.failed += 1;
                    if let Err(store_error) = self.queue.record_failure(&entry, &e) {
                        error!(
                            "Failed to record failure of {}: {:#}",
                            entry.display_title(),
                            store_error
                        );
                    }
                }
            }
        }

        summary
    }
}

fn join_error_message(error: JoinError) -> String {
    if !error.is_panic() {
        return error.to_string();
    }
    let payload = error.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
