//! Acquisition HTTP routes.
//!
//! Provides endpoints for:
//! - Catalog search, annotated with queue/library/blacklist state
//! - Queue management (enqueue, list, approve, remove)
//! - Library record removal
//! - Activity feed and live download progress

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::warn;

use crate::acquisition::{AcquisitionError, ActiveDownloads, MediaKind, QueueError};
use crate::catalog::{CatalogAdapter, Candidate};
use crate::server::state::{GuardedQueueService, ServerState};
use crate::user::{Permission, Requester};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

#[derive(Debug, Deserialize)]
pub struct RemoveQuery {
    #[serde(default)]
    pub blacklist: bool,
}

/// Handler failures, mapped to status codes at the boundary.
#[derive(Debug)]
pub enum ApiError {
    Queue(QueueError),
    Catalog(AcquisitionError),
    Internal(anyhow::Error),
}

impl From<QueueError> for ApiError {
    fn from(e: QueueError) -> Self {
        ApiError::Queue(e)
    }
}

impl From<AcquisitionError> for ApiError {
    fn from(e: AcquisitionError) -> Self {
        ApiError::Catalog(e)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Queue(QueueError::Forbidden(_)) => StatusCode::FORBIDDEN.into_response(),
            ApiError::Queue(e @ QueueError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, e.to_string()).into_response()
            }
            ApiError::Queue(e @ QueueError::InvalidRequest(_)) => {
                (StatusCode::BAD_REQUEST, e.to_string()).into_response()
            }
            ApiError::Queue(QueueError::Store(e)) | ApiError::Internal(e) => {
                warn!("Store failure: {:#}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Store failure").into_response()
            }
            ApiError::Catalog(e) => {
                warn!("Catalog failure: {}", e);
                (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
            }
        }
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn require(requester: &Requester, permission: Permission) -> ApiResult<()> {
    if requester.has_permission(permission) {
        Ok(())
    } else {
        Err(QueueError::Forbidden(permission).into())
    }
}

// =============================================================================
// Search
// =============================================================================

async fn search(
    state: &ServerState,
    adapter: &dyn CatalogAdapter,
    requester: &Requester,
    terms: &str,
) -> ApiResult<Response> {
    require(requester, Permission::RequestContent)?;
    let terms = terms.trim();
    if terms.is_empty() {
        return Err(QueueError::InvalidRequest("empty search terms".to_string()).into());
    }

    let candidates = adapter.search(terms).await?;
    let annotated = state.dedup.annotate(adapter.kind(), candidates)?;
    Ok(Json(annotated).into_response())
}

async fn search_books(
    State(state): State<ServerState>,
    requester: Requester,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Response> {
    search(&state, state.book_catalog.as_ref(), &requester, &query.q).await
}

async fn search_songs(
    State(state): State<ServerState>,
    requester: Requester,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Response> {
    search(&state, state.song_catalog.as_ref(), &requester, &query.q).await
}

// =============================================================================
// Queue
// =============================================================================

async fn enqueue(
    State(queue): State<GuardedQueueService>,
    requester: Requester,
    Json(candidate): Json<Candidate>,
) -> ApiResult<Response> {
    let entry = queue.enqueue(candidate, &requester)?;
    Ok((StatusCode::CREATED, Json(entry)).into_response())
}

async fn list_queue(
    State(queue): State<GuardedQueueService>,
    requester: Requester,
    Query(page): Query<PaginationQuery>,
) -> ApiResult<Response> {
    require(&requester, Permission::RequestContent)?;
    let entries = queue.list(page.limit, page.offset)?;
    Ok(Json(entries).into_response())
}

async fn approve_entry(
    State(queue): State<GuardedQueueService>,
    requester: Requester,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    require(&requester, Permission::RequestContent)?;
    let entry = queue.approve(&id, &requester)?;
    Ok(Json(entry).into_response())
}

async fn remove_entry(
    State(queue): State<GuardedQueueService>,
    requester: Requester,
    Path(id): Path<String>,
    Query(query): Query<RemoveQuery>,
) -> ApiResult<Response> {
    require(&requester, Permission::RequestContent)?;
    let entry = queue.remove(&id, query.blacklist, &requester)?;
    Ok(Json(entry).into_response())
}

// =============================================================================
// Library
// =============================================================================

async fn remove_library_record(
    State(queue): State<GuardedQueueService>,
    requester: Requester,
    Path((kind, id)): Path<(String, i64)>,
    Query(query): Query<RemoveQuery>,
) -> ApiResult<Response> {
    require(&requester, Permission::RequestContent)?;
    let kind = MediaKind::from_str(&kind)
        .ok_or_else(|| QueueError::InvalidRequest(format!("unknown media kind {}", kind)))?;
    let record = queue
        .remove_library_record(kind, id, query.blacklist, &requester)
        .await?;
    Ok(Json(record).into_response())
}

// =============================================================================
// Activity and progress
// =============================================================================

async fn get_activity(
    State(queue): State<GuardedQueueService>,
    requester: Requester,
    Query(page): Query<PaginationQuery>,
) -> ApiResult<Response> {
    require(&requester, Permission::RequestContent)?;
    let records = queue.activity(page.limit, page.offset)?;
    Ok(Json(records).into_response())
}

async fn get_active_downloads(
    State(active): State<ActiveDownloads>,
    requester: Requester,
) -> ApiResult<Response> {
    require(&requester, Permission::RequestContent)?;
    Ok(Json(active.snapshot()).into_response())
}

pub fn make_acquisition_routes(state: ServerState) -> Router {
    Router::new()
        .route("/search/books", get(search_books))
        .route("/search/songs", get(search_songs))
        .route("/queue", post(enqueue).get(list_queue))
        .route("/queue/{id}/approve", post(approve_entry))
        .route("/queue/{id}", delete(remove_entry))
        .route("/library/{kind}/{id}", delete(remove_library_record))
        .route("/activity", get(get_activity))
        .route("/downloads/active", get(get_active_downloads))
        .with_state(state)
}
