//! HTTP Server
//!
//! One axum server for the session API, health probes, and Prometheus
//! metrics.
//!
//! # Endpoints
//!
//! - `/api/session/*` - session operations, see [`api`]
//! - `GET /health`, `/healthz`, `/readyz`, `/metrics` - see [`health`]

pub mod api;
pub mod health;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::StreamGateway;

// =============================================================================
// Server State
// =============================================================================

/// Shared state for every handler.
pub struct AppState {
    gateway: StreamGateway,
    version: String,
    started_at: Instant,
    shutdown: CancellationToken,
}

impl AppState {
    /// Create handler state.
    #[must_use]
    pub fn new(gateway: StreamGateway, version: String, shutdown: CancellationToken) -> Self {
        Self {
            gateway,
            version,
            started_at: Instant::now(),
            shutdown,
        }
    }

    /// Session operations.
    #[must_use]
    pub const fn gateway(&self) -> &StreamGateway {
        &self.gateway
    }
}

/// Build the full router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(api::routes())
        .merge(health::routes())
        .with_state(state)
}

// =============================================================================
// HTTP Server
// =============================================================================

/// HTTP server for the API and health routes.
pub struct HttpServer {
    port: u16,
    state: Arc<AppState>,
    cancel: CancellationToken,
}

impl HttpServer {
    /// Create a new server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<AppState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HttpServerError` if binding fails or the server fails while
    /// running.
    pub async fn run(self) -> Result<(), HttpServerError> {
        let app = router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HttpServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "HTTP server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HttpServerError::ServerFailed(e.to_string()))?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// HTTP server errors.
#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    /// Failed to bind to port.
    #[error("failed to bind HTTP server to port {0}: {1}")]
    BindFailed(u16, String),
    /// Server failed while running.
    #[error("HTTP server failed: {0}")]
    ServerFailed(String),
}
