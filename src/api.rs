//! Local read-only HTTP API: live UPS status and stored history.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::storage::TelemetryStore;
use crate::ups::UpsSource;

pub mod routes;

/// Handles shared by every request. The store is a dedicated reader, not the monitor's writer.
#[derive(Clone)]
pub struct ApiState {
    pub source: Arc<dyn UpsSource>,
    pub store: Arc<dyn TelemetryStore>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/status", get(routes::get_status))
        .route("/api/history", get(routes::get_history))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Bind `listen` and serve the API on its own task.
pub async fn spawn(listen: SocketAddr, state: ApiState) -> Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("Failed to bind API listener on {}", listen))?;
    let local_addr = listener.local_addr()?;
    info!("🌐 Read API listening on http://{}", local_addr);

    let app = router(state);
    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Read API server exited: {}", e);
        }
    });

    Ok((local_addr, task))
}
