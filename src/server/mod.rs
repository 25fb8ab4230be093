//! HTTP dispatch layer
//!
//! Maps `GET /instagram/p/{id}` onto the orchestrator and writes the payload
//! back; resolve errors become the upstream status (or 502/503) with the
//! error text as body.

pub mod protocol;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::orchestrator::FetchOrchestrator;
use protocol::{HealthResponse, SharedTierInfo, PAYLOAD_CONTENT_TYPE};

/// Application state shared across handlers.
pub struct AppState {
    pub orchestrator: Arc<FetchOrchestrator>,
    /// Longest one request may queue for a rate limit permit
    pub permit_wait_timeout: Duration,
    pub start_time: Instant,
}

/// Build the axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/instagram/p/{id}", get(resolve_post))
        .route("/health", get(health))
        .with_state(state)
}

/// Bind `listen` and serve until Ctrl+C
pub async fn serve(listen: &str, router: Router) -> Result<()> {
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("Failed to bind {}", listen))?;

    info!(listen = listen, "HTTP server started");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Received shutdown signal");
        })
        .await
        .context("HTTP server error")
}

async fn resolve_post(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    // Cancelled when the deadline passes or this handler goes away
    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();
    spawn_deadline(cancel.clone(), state.permit_wait_timeout);

    match state.orchestrator.resolve_with_cancel(&id, &cancel).await {
        Ok(payload) => ([(header::CONTENT_TYPE, PAYLOAD_CONTENT_TYPE)], payload).into_response(),
        Err(e) => {
            let status = StatusCode::from_u16(e.to_status()).unwrap_or(StatusCode::BAD_GATEWAY);
            debug!(id = %id, status = status.as_u16(), error = %e, "Resolve failed");
            (status, e.to_string()).into_response()
        }
    }
}

fn spawn_deadline(cancel: CancellationToken, after: Duration) {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(after) => {
                debug!(timeout_secs = after.as_secs(), "Permit wait deadline reached");
                cancel.cancel();
            }
        }
    });
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let cache = state.orchestrator.cache();
    Json(HealthResponse {
        status: "ok",
        shared_tier: SharedTierInfo {
            backend: cache.shared_tier_name().to_string(),
            health: cache.health_status().to_string(),
        },
        cache: cache.stats(),
        fetches: state.orchestrator.fetch_count(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}
