//! Acquisition Server Library
//!
//! Media acquisition pipeline: catalog search, an approval-gated download
//! queue, and the background scheduler that fills the library.

pub mod acquisition;
pub mod catalog;
pub mod config;
pub mod server;
pub mod sqlite_persistence;
pub mod user;

// Re-export commonly used types for convenience
pub use acquisition::{AcquisitionStore, QueueService, Scheduler, SqliteAcquisitionStore};
pub use server::{make_app, run_server, RequestsLoggingLevel};
