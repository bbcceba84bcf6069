//! Application Services
//!
//! Services that own session state and coordinate between ports.
//!
//! - `Session`: one user's token, rules, buffer, and stream task
//! - `SessionRegistry`: token → session map with idle eviction
//! - `StreamGateway`: caller-facing operations

pub mod gateway;
pub mod registry;
pub mod session;

pub use gateway::{GatewayError, StreamGateway};
pub use registry::{RegistryConfig, RegistryStats, SessionRegistry};
pub use session::{
    AuthError, RuleSyncError, Session, SessionConfig, SessionDeps, SessionStatus, Termination,
};
