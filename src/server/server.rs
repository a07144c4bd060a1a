use anyhow::{Context, Result};
use std::time::Duration;

use axum::{
    extract::State, middleware, response::IntoResponse, routing::get, Json, Router,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{log_requests, make_acquisition_routes, state::ServerState};

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub active_downloads: usize,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn health(State(state): State<ServerState>) -> impl IntoResponse {
    Json(ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        active_downloads: state.active_downloads.len(),
    })
}

pub fn make_app(state: ServerState) -> Router {
    let health_routes: Router = Router::new()
        .route("/health", get(health))
        .with_state(state.clone());

    let app: Router = Router::new()
        .nest("/v1", health_routes.merge(make_acquisition_routes(state.clone())));

    app.layer(middleware::from_fn_with_state(state, log_requests))
}

/// Serve the API until `shutdown` fires.
pub async fn run_server(state: ServerState, shutdown: CancellationToken) -> Result<()> {
    let port = state.config.port;
    let app = make_app(state);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .context("Server error")
}
