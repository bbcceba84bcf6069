//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the session services and the port interfaces that
//! define how they talk to the upstream rule and stream endpoints.

/// Port interfaces for the upstream (rule management, streaming).
pub mod ports;

/// Session lifecycle, registry, and the inbound gateway.
pub mod services;
