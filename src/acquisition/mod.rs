//! Acquisition pipeline.
//!
//! Queue storage with an approval gate, the scheduler that drains approved
//! entries, and the executors that turn entries into library files.

mod activity;
mod dedup;
mod error;
pub mod executors;
mod filename;
mod models;
mod progress;
mod queue;
mod retry;
mod scheduler;
mod schema;
mod store;

pub use activity::ActivityReporter;
pub use dedup::{AnnotatedCandidate, DedupFilter};
pub use error::AcquisitionError;
pub use executors::{
    AudioToolchain, BookExecutor, DownloadExecutor, Executors, ExternalToolchain, SongExecutor,
};
pub use filename::{content_disposition_filename, sanitize_filename};
pub use models::*;
pub use progress::{ActiveDownloads, DownloadProgress, DownloadStage, ProgressHandle};
pub use queue::{QueueError, QueueService};
pub use retry::{retry, RetryPolicy};
pub use scheduler::{PassSummary, Scheduler};
pub use schema::ACQUISITION_VERSIONED_SCHEMAS;
pub use store::{AcquisitionStore, SqliteAcquisitionStore};
