//! Upstream Filtered-Stream Adapters
//!
//! - **Rules**: request/response client for rule management (JSON)
//! - **Stream**: chunked newline-delimited JSON stream, one per session
//! - **Client**: per-session read loop with reconnect/backoff

pub mod client;
pub mod codec;
pub mod connector;
pub mod messages;
pub mod reconnect;
pub mod rules;

pub use client::{StreamClient, StreamClientConfig, StreamExit};
pub use codec::{Frame, FrameCodec, LineSplitter};
pub use connector::HttpStreamConnector;
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use rules::RuleSyncClient;
