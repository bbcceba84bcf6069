//! Prometheus Metrics Module
//!
//! Exposes application metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Items**: stream items received and dropped by buffer overflow
//! - **Connections**: keep-alive frames, reconnects, backoff delays, terminations
//! - **Sessions**: active sessions and removals by cause
//! - **Rules**: rule sync failures by step
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the HTTP server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if another global recorder is already installed.
#[allow(clippy::expect_used)]
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Item counters
    describe_counter!(
        "stream_proxy_items_received_total",
        "Total stream items parsed and buffered"
    );
    describe_counter!(
        "stream_proxy_items_dropped_total",
        "Total buffered items evicted before being replaced by newer ones"
    );

    // Connection counters
    describe_counter!(
        "stream_proxy_keep_alive_frames_total",
        "Total keep-alive frames received from upstream"
    );
    describe_counter!(
        "stream_proxy_reconnects_total",
        "Total stream reconnection attempts"
    );
    describe_histogram!(
        "stream_proxy_backoff_delay_seconds",
        "Delay waited before each reconnection attempt"
    );
    describe_counter!(
        "stream_proxy_stream_terminations_total",
        "Total stream clients that stopped, by reason"
    );

    // Session gauges
    describe_gauge!(
        "stream_proxy_active_sessions",
        "Number of sessions in the registry"
    );
    describe_counter!(
        "stream_proxy_session_removals_total",
        "Total sessions removed, by cause"
    );

    // Rule sync
    describe_counter!(
        "stream_proxy_rule_sync_failures_total",
        "Total rule sync failures, by step"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Metric labels for session removal causes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalCause {
    /// Explicit logout.
    Logout,
    /// Idle sweep eviction.
    Idle,
    /// Stream client hit a fatal condition.
    Fatal,
    /// Process shutdown.
    Shutdown,
}

impl RemovalCause {
    /// Label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Logout => "logout",
            Self::Idle => "idle",
            Self::Fatal => "fatal",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Record a stream item appended to a session buffer.
pub fn record_item_received() {
    counter!("stream_proxy_items_received_total").increment(1);
}

/// Record an item evicted from a full buffer.
pub fn record_item_dropped() {
    counter!("stream_proxy_items_dropped_total").increment(1);
}

/// Record an upstream keep-alive frame.
pub fn record_keep_alive() {
    counter!("stream_proxy_keep_alive_frames_total").increment(1);
}

/// Record a reconnection attempt and the delay waited before it.
pub fn record_reconnect(delay: Duration) {
    counter!("stream_proxy_reconnects_total").increment(1);
    histogram!("stream_proxy_backoff_delay_seconds").record(delay.as_secs_f64());
}

/// Record a stream client leaving its read loop.
pub fn record_stream_terminated(reason: &'static str) {
    counter!(
        "stream_proxy_stream_terminations_total",
        "reason" => reason
    )
    .increment(1);
}

/// Update the active session count.
#[allow(clippy::cast_precision_loss)]
pub fn set_active_sessions(count: usize) {
    gauge!("stream_proxy_active_sessions").set(count as f64);
}

/// Record a session leaving the registry.
pub fn record_session_removed(cause: RemovalCause) {
    counter!(
        "stream_proxy_session_removals_total",
        "cause" => cause.as_str()
    )
    .increment(1);
}

/// Record a failed rule sync step (`fetch`, `delete`, `add`).
pub fn record_rule_sync_failure(step: &'static str) {
    counter!(
        "stream_proxy_rule_sync_failures_total",
        "step" => step
    )
    .increment(1);
}

// =============================================================================
// Tests
// =============================================================================
