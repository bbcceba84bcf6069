//! Stream Frame Codec
//!
//! Splits the chunked stream body into newline-delimited frames and
//! classifies each frame as data, keep-alive, or the fatal connection-limit
//! signal.
//!
//! Classification order:
//! 1. parses as a data payload → `Frame::Data`
//! 2. is the connection-limit signal → `Frame::ConnectionLimit`
//! 3. anything else (blank line, other JSON, noise) → `Frame::KeepAlive`

use super::messages::{CONNECTION_LIMIT_DETAIL, ProblemMessage, StreamPayload};
use crate::domain::streaming::StreamItem;

/// Default upper bound on a single frame.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Classification of one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A parsed item.
    Data(StreamItem),
    /// Heartbeat or unparsable noise. Ignored.
    KeepAlive,
    /// The account is at its connection cap. Fatal.
    ConnectionLimit,
}

/// Classifier for stream frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec;

impl FrameCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Classify a single frame.
    #[must_use]
    pub fn classify(&self, frame: &str) -> Frame {
        let trimmed = frame.trim();
        if trimmed.is_empty() {
            return Frame::KeepAlive;
        }

        if let Ok(payload) = serde_json::from_str::<StreamPayload>(trimmed) {
            return Frame::Data(payload.into());
        }

        if Self::is_connection_limit(trimmed) {
            return Frame::ConnectionLimit;
        }

        Frame::KeepAlive
    }

    /// Whether `text` is the connection-limit signal, either as plain text
    /// or as a problem object.
    #[must_use]
    pub fn is_connection_limit(text: &str) -> bool {
        let trimmed = text.trim();
        if trimmed == CONNECTION_LIMIT_DETAIL {
            return true;
        }

        serde_json::from_str::<ProblemMessage>(trimmed)
            .is_ok_and(|problem| problem.is_connection_limit())
    }
}

/// Reassembles newline-delimited frames from arbitrary byte chunks.
#[derive(Debug)]
pub struct LineSplitter {
    pending: Vec<u8>,
    max_frame_bytes: usize,
    discarding: bool,
}

impl Default for LineSplitter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl LineSplitter {
    /// Create a splitter that discards frames longer than `max_frame_bytes`.
    #[must_use]
    pub const fn new(max_frame_bytes: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_frame_bytes,
            discarding: false,
        }
    }

    /// Feed a chunk; returns every frame completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut frames = Vec::new();

        for &byte in chunk {
            if byte == b'\n' {
                if std::mem::take(&mut self.discarding) {
                    continue;
                }
                let mut line = std::mem::take(&mut self.pending);
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                frames.push(String::from_utf8_lossy(&line).into_owned());
                continue;
            }

            if self.discarding {
                continue;
            }

            if self.pending.len() >= self.max_frame_bytes {
                tracing::warn!(
                    limit = self.max_frame_bytes,
                    "Discarding oversized stream frame"
                );
                self.pending.clear();
                self.discarding = true;
                continue;
            }
            self.pending.push(byte);
        }

        frames
    }

    /// Flush the final frame when the body ends without a trailing newline.
    ///
    /// Returns `None` if nothing is pending or the tail was oversized.
    pub fn finish(&mut self) -> Option<String> {
        let mut line = std::mem::take(&mut self.pending);
        if std::mem::take(&mut self.discarding) {
            return None;
        }
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        if line.is_empty() {
            return None;
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Bytes buffered for the next, incomplete frame.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
