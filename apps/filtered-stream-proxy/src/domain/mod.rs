//! Domain Layer - Core session and streaming types.
//!
//! This layer contains the core types for per-user filtered streams with
//! no I/O. All types here are pure Rust with serialization support.

/// Bounded FIFO storage for received items.
pub mod buffer;

/// Filter rules and rule sets.
pub mod rules;

/// Session identity: tokens and session ids.
pub mod session;

/// Stream items and connection state.
pub mod streaming;
