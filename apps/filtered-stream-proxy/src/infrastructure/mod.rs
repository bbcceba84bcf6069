//! Infrastructure Layer
//!
//! Adapters and external integrations.
//!
//! - `upstream`: HTTP clients for the rules and stream endpoints
//! - `http`: session API, health checks, metrics endpoint
//! - `config`: environment-driven configuration
//! - `telemetry`: tracing subscriber and OTLP export
//! - `metrics`: Prometheus recorder and metric helpers

pub mod config;
pub mod http;
pub mod metrics;
pub mod telemetry;
pub mod upstream;
