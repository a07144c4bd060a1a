use axum::extract::FromRef;

use crate::acquisition::{ActiveDownloads, DedupFilter, QueueService};
use crate::catalog::CatalogAdapter;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedQueueService = Arc<QueueService>;
pub type GuardedDedupFilter = Arc<DedupFilter>;
pub type GuardedCatalogAdapter = Arc<dyn CatalogAdapter>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub queue: GuardedQueueService,
    pub dedup: GuardedDedupFilter,
    pub book_catalog: GuardedCatalogAdapter,
    pub song_catalog: GuardedCatalogAdapter,
    pub active_downloads: ActiveDownloads,
}

impl ServerState {
    pub fn new(
        config: ServerConfig,
        queue: GuardedQueueService,
        dedup: GuardedDedupFilter,
        book_catalog: GuardedCatalogAdapter,
        song_catalog: GuardedCatalogAdapter,
        active_downloads: ActiveDownloads,
    ) -> Self {
        ServerState {
            config,
            start_time: Instant::now(),
            queue,
            dedup,
            book_catalog,
            song_catalog,
            active_downloads,
        }
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}

impl FromRef<ServerState> for GuardedQueueService {
    fn from_ref(input: &ServerState) -> Self {
        input.queue.clone()
    }
}

impl FromRef<ServerState> for ActiveDownloads {
    fn from_ref(input: &ServerState) -> Self {
        input.active_downloads.clone()
    }
}
