//! HTTP Stream Connector
//!
//! Opens the long-lived chunked `GET stream` request and turns its body
//! into a stream of newline-delimited frames.
//!
//! Connection outcomes:
//!
//! | Outcome | Result |
//! |---------|--------|
//! | connect / timeout / body / other transport error | `StreamError::Reset` |
//! | malformed request or redirect failure | `StreamError::Rejected` |
//! | 2xx | frame stream |
//! | error body carrying the connection-limit signal | `StreamError::ConnectionLimit` |
//! | 429, 5xx | `StreamError::Reset` |
//! | any other status | `StreamError::Rejected` |

use async_trait::async_trait;
use futures_util::{StreamExt, future, stream};
use reqwest::{Client, StatusCode};

use super::codec::{FrameCodec, LineSplitter};
use crate::application::ports::{FrameStream, StreamConnector, StreamError};
use crate::domain::session::Token;
use crate::infrastructure::config::UpstreamSettings;

/// `StreamConnector` over HTTP chunked transfer.
#[derive(Debug, Clone)]
pub struct HttpStreamConnector {
    client: Client,
    stream_url: String,
    max_frame_bytes: usize,
}

impl HttpStreamConnector {
    /// Create a connector from upstream settings.
    ///
    /// The client has a connect timeout only; the stream itself is
    /// long-lived and idle detection is the stream client's job.
    ///
    /// # Errors
    ///
    /// Returns `StreamError::Rejected` if the HTTP client cannot be built.
    pub fn new(settings: &UpstreamSettings) -> Result<Self, StreamError> {
        let client = Client::builder()
            .connect_timeout(settings.request_timeout)
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| StreamError::Rejected(e.to_string()))?;

        Ok(Self {
            client,
            stream_url: settings.stream_url.clone(),
            max_frame_bytes: settings.max_frame_bytes,
        })
    }

    fn classify_send_error(error: &reqwest::Error) -> StreamError {
        if error.is_builder() || error.is_redirect() {
            return StreamError::Rejected(error.to_string());
        }

        StreamError::Reset(error.to_string())
    }

    fn classify_status(status: StatusCode, body: &str) -> StreamError {
        if FrameCodec::is_connection_limit(body) {
            return StreamError::ConnectionLimit;
        }

        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return StreamError::Reset(format!("upstream returned {status}"));
        }

        StreamError::Rejected(format!("upstream returned {status}: {body}"))
    }
}

#[async_trait]
impl StreamConnector for HttpStreamConnector {
    async fn connect(&self, token: &Token) -> Result<FrameStream, StreamError> {
        let response = self
            .client
            .get(&self.stream_url)
            .bearer_auth(token.expose())
            .send()
            .await
            .map_err(|e| Self::classify_send_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, &body));
        }

        tracing::debug!(status = status.as_u16(), "Stream connection opened");

        let splitter = LineSplitter::new(self.max_frame_bytes);
        // `None` marks the end of the body so an unterminated last frame is flushed.
        let frames = response
            .bytes_stream()
            .map(Some)
            .chain(stream::once(future::ready(None)))
            .scan(splitter, |splitter, chunk| {
                let batch: Vec<Result<String, StreamError>> = match chunk {
                    Some(Ok(bytes)) => splitter.push(&bytes).into_iter().map(Ok).collect(),
                    Some(Err(e)) => vec![Err(StreamError::Reset(e.to_string()))],
                    None => splitter.finish().into_iter().map(Ok).collect(),
                };
                future::ready(Some(stream::iter(batch)))
            })
            .flatten()
            .boxed();

        Ok(frames)
    }
}
