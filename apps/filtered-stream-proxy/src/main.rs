//! Filtered Stream Proxy Binary
//!
//! Starts the per-user filtered stream service.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin filtered-stream-proxy
//! ```
//!
//! # Environment Variables
//!
//! All optional.
//!
//! - `STREAM_PROXY_HTTP_PORT`: API, health, and metrics port (default: 8080)
//! - `STREAM_PROXY_RULES_URL`: Upstream rules endpoint
//! - `STREAM_PROXY_STREAM_URL`: Upstream stream endpoint
//! - `STREAM_PROXY_REQUEST_TIMEOUT_SECS`: Upstream request timeout (default: 10)
//! - `STREAM_PROXY_USER_AGENT`: User agent for upstream requests
//! - `STREAM_PROXY_BUFFER_CAPACITY`: Items kept per session (default: 15)
//! - `STREAM_PROXY_SWEEP_INTERVAL_SECS`: Idle sweep interval (default: 600)
//! - `STREAM_PROXY_RECONNECT_DELAY_INITIAL_MS`: First backoff delay (default: 1000)
//! - `STREAM_PROXY_RECONNECT_DELAY_MAX_SECS`: Backoff cap (default: 64)
//! - `STREAM_PROXY_RECONNECT_DELAY_MULTIPLIER`: Backoff multiplier (default: 2.0)
//! - `STREAM_PROXY_RECONNECT_JITTER`: Backoff jitter fraction (default: 0.1)
//! - `STREAM_PROXY_MAX_RECONNECT_ATTEMPTS`: 0 = unlimited (default: 0)
//! - `STREAM_PROXY_STALL_TIMEOUT_SECS`: 0 disables (default: 30)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: filtered-stream-proxy)
//! - `RUST_LOG`: Log level (default: info)

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use filtered_stream_proxy::infrastructure::telemetry;
use filtered_stream_proxy::{
    AppState, BufferError, HttpServer, HttpStreamConnector, ProxyConfig, RegistryConfig,
    RuleSyncClient, SessionConfig, SessionRegistry, StreamClientConfig, StreamGateway,
    init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    // Initialize telemetry (tracing + optional OTLP)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Filtered Stream Proxy");

    let _metrics_handle = init_metrics();

    let config = ProxyConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Upstream adapters
    let rule_sync =
        Arc::new(RuleSyncClient::new(&config.upstream).context("building rules client")?);
    let connector =
        Arc::new(HttpStreamConnector::new(&config.upstream).context("building stream connector")?);

    // Session registry
    let registry_config = RegistryConfig {
        session: SessionConfig {
            buffer_capacity: NonZeroUsize::new(config.sessions.buffer_capacity)
                .ok_or(BufferError::ZeroCapacity)?,
            stream: StreamClientConfig::from_stream_settings(&config.stream),
        },
        sweep_interval: config.sessions.sweep_interval,
    };
    let registry = Arc::new(SessionRegistry::new(rule_sync, connector, registry_config));

    // Spawn sweep + reaper
    let maintenance = {
        let registry = Arc::clone(&registry);
        let cancel = shutdown_token.clone();
        tokio::spawn(async move {
            registry.run_maintenance(cancel).await;
        })
    };

    // Spawn HTTP server
    let state = Arc::new(AppState::new(
        StreamGateway::new(Arc::clone(&registry)),
        env!("CARGO_PKG_VERSION").to_string(),
        shutdown_token.clone(),
    ));
    let http_server = HttpServer::new(config.server.http_port, state, shutdown_token.clone());
    let server = {
        let cancel = shutdown_token.clone();
        tokio::spawn(async move {
            if let Err(e) = http_server.run().await {
                tracing::error!(error = %e, "HTTP server error");
                cancel.cancel();
            }
        })
    };

    tracing::info!("Stream proxy ready");

    await_shutdown(shutdown_token).await;

    let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        let _ = server.await;
        let _ = maintenance.await;
    })
    .await;
    if drained.is_err() {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Shutdown timed out with sessions still open"
        );
    }

    tracing::info!("Stream proxy stopped");
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &ProxyConfig) {
    tracing::info!(
        http_port = config.server.http_port,
        buffer_capacity = config.sessions.buffer_capacity,
        sweep_interval_secs = config.sessions.sweep_interval.as_secs(),
        max_reconnect_attempts = config.stream.max_reconnect_attempts,
        "Configuration loaded"
    );
    tracing::debug!(
        rules_url = %config.upstream.rules_url,
        stream_url = %config.upstream.stream_url,
        "Upstream endpoints"
    );
}

/// Wait for a shutdown signal (SIGTERM or SIGINT) or an internal failure.
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
        () = shutdown_token.cancelled() => {
            tracing::warn!("Internal failure, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
