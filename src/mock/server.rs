//! Mock dev server.
//!
//! Serves mock definitions through the dispatch middleware, hot-reloads them
//! via the directory watcher, and exposes a small internal surface under
//! `/_vack` for health checks and remote stop.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use tokio::sync::broadcast;
use tokio::time::Duration;
use tracing::{debug, info, warn};

use super::middleware::{mock_dispatch, MockDispatchState};
use super::proxy;
use super::registry::MockRegistry;
use super::watcher::start_mock_watcher;
use crate::config::MockSettings;

/// Shutdown signal broadcast to the server and its background tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    Stop,
}

#[derive(Clone)]
struct AppState {
    shutdown_tx: broadcast::Sender<Shutdown>,
    registry: Arc<MockRegistry>,
}

#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    entries: usize,
    urls: Vec<String>,
}

/// Run the mock server with a pre-bound listener.
/// The listener is passed in to avoid TOCTOU race conditions with port allocation.
pub async fn run_server(
    settings: MockSettings,
    listener: tokio::net::TcpListener,
) -> Result<(), String> {
    let local_addr = listener
        .local_addr()
        .map_err(|err| format!("Failed to get listener address: {err}"))?;

    debug!(
        dir = %settings.dir.display(),
        addr = %local_addr,
        "Starting mock server."
    );

    let registry = Arc::new(MockRegistry::new(&settings.dir));
    let summary = registry.reload().await;
    info!(
        files = summary.files,
        entries = summary.entries,
        failed = summary.failed,
        "Mocks loaded."
    );
    for url in registry.urls().await {
        info!("  mock {url}");
    }

    let (shutdown_tx, _) = broadcast::channel::<Shutdown>(16);

    if let Err(err) = start_mock_watcher(
        Arc::clone(&registry),
        Duration::from_millis(settings.debounce_ms),
        shutdown_tx.subscribe(),
    ) {
        warn!("Failed to start mock watcher: {err}. Hot reload disabled.");
    }

    let state = AppState {
        shutdown_tx: shutdown_tx.clone(),
        registry: Arc::clone(&registry),
    };

    let internal_router = Router::new()
        .route("/health", get(health))
        .route("/stop", get(stop))
        .with_state(state);

    // Requests without a mock fall through the dispatch middleware into
    // either the proxy or a plain 404.
    let fallback: Router = match &settings.proxy {
        Some(upstream) => {
            info!("Proxying unmatched requests to {upstream}.");
            proxy::router(upstream)?
        }
        None => Router::new().fallback(|| async { StatusCode::NOT_FOUND }),
    };

    let dispatch_state = MockDispatchState {
        registry,
        settings: settings.clone(),
    };
    // The internal router is nested after the dispatch layer so mock
    // definitions can never shadow the control routes.
    let app = Router::new()
        .merge(fallback)
        .layer(axum::middleware::from_fn_with_state(
            dispatch_state,
            mock_dispatch,
        ))
        .nest("/_vack", internal_router);

    info!("Mock server listening on http://{local_addr}");

    let mut shutdown_rx = shutdown_tx.subscribe();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            match shutdown_rx.recv().await {
                Ok(Shutdown::Stop) => {
                    debug!("Stop signal received, shutting down server.");
                }
                Err(_) => {
                    debug!("Shutdown channel closed.");
                }
            }
        })
        .await
        .map_err(|err| format!("Server error: {err}"))?;

    Ok(())
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let urls = state.registry.urls().await;
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            entries: urls.len(),
            urls,
        }),
    )
}

async fn stop(State(state): State<AppState>) -> StatusCode {
    debug!("Received mock server stop request.");
    let _ = state.shutdown_tx.send(Shutdown::Stop);
    StatusCode::OK
}
