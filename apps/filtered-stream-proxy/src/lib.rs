#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Filtered Stream Proxy - Per-User Streaming Sessions
//!
//! An HTTP service that holds one long-lived filtered-stream connection per
//! authenticated user, keeps the most recent items of each stream in a
//! bounded buffer, and evicts users that stop sending keep-alives.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure types
//!   - `buffer`: Bounded ring buffer
//!   - `rules`: Filter rules and rule sets
//!   - `session`: Tokens and session ids
//!   - `streaming`: Stream items and connection states
//!
//! - **Application**: Services and port definitions
//!   - `ports`: Rule sync and stream connector interfaces
//!   - `services`: Session, registry, gateway
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `upstream`: Rules client, stream connector, stream client
//!   - `http`: Session API and health endpoints
//!   - `config`, `telemetry`, `metrics`
//!
//! # Data Flow
//!
//! ```text
//!                    ┌──────────────┐  frames  ┌────────────┐
//! upstream stream ──►│ StreamClient │─────────►│ RingBuffer │◄── GET /api/session/items
//!                    └──────────────┘          └────────────┘
//!                          ▲ one per session
//!                    ┌─────┴──────────┐
//! POST /api/session ►│ SessionRegistry│◄── sweep (idle) / reap (fatal)
//!                    └────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core types with no I/O.
pub mod domain;

/// Application layer - Session services and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::buffer::{BufferError, RingBuffer};
pub use domain::rules::{Rule, RuleEntry, RuleId, RuleSet};
pub use domain::session::{SessionId, Token, TokenError};
pub use domain::streaming::{ConnectionState, MatchingRule, StreamItem};

// Ports
pub use application::ports::{
    FrameStream, RuleSyncPort, StreamConnector, StreamError, UpstreamError,
};

// Services
pub use application::services::{
    AuthError, GatewayError, RegistryConfig, RuleSyncError, Session, SessionConfig,
    SessionRegistry, SessionStatus, StreamGateway,
};

// Infrastructure config
pub use infrastructure::config::{
    ConfigError, ProxyConfig, ServerSettings, SessionSettings, StreamSettings, UpstreamSettings,
};

// Upstream adapters
pub use infrastructure::upstream::{
    HttpStreamConnector, ReconnectConfig, RuleSyncClient, StreamClient, StreamClientConfig,
    StreamExit,
};

// HTTP server
pub use infrastructure::http::{AppState, HttpServer, HttpServerError, router};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
