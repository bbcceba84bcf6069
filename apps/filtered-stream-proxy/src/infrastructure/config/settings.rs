//! Proxy Configuration Settings
//!
//! Configuration types for the stream proxy, loaded from environment variables.
//! Every value is optional; unset or unparsable values fall back to defaults.

use std::time::Duration;

use crate::infrastructure::upstream::codec::DEFAULT_MAX_FRAME_BYTES;

/// Default upstream rule-management endpoint.
pub const DEFAULT_RULES_URL: &str = "https://api.twitter.com/2/tweets/search/stream/rules";

/// Default upstream filtered-stream endpoint.
pub const DEFAULT_STREAM_URL: &str = "https://api.twitter.com/2/tweets/search/stream";

/// Upstream endpoint settings.
#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    /// Rule-management endpoint.
    pub rules_url: String,
    /// Streaming endpoint.
    pub stream_url: String,
    /// Timeout for rule requests and for opening the stream.
    pub request_timeout: Duration,
    /// User agent sent with every request.
    pub user_agent: String,
    /// Longest accepted stream frame.
    pub max_frame_bytes: usize,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            rules_url: DEFAULT_RULES_URL.to_string(),
            stream_url: DEFAULT_STREAM_URL.to_string(),
            request_timeout: Duration::from_secs(10),
            user_agent: concat!("filtered-stream-proxy/", env!("CARGO_PKG_VERSION")).to_string(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

/// Stream connection settings.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Jitter applied to each delay, as a fraction.
    pub reconnect_jitter: f64,
    /// Maximum consecutive reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
    /// Reset a connection that delivers no frame for this long (`None` = never).
    pub stall_timeout: Option<Duration>,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            reconnect_delay_initial: Duration::from_secs(1),
            reconnect_delay_max: Duration::from_secs(64),
            reconnect_delay_multiplier: 2.0,
            reconnect_jitter: 0.1,
            max_reconnect_attempts: 0, // Unlimited
            stall_timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// Session lifecycle settings.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Items retained per session.
    pub buffer_capacity: usize,
    /// Idle sweep interval; a session is evicted after two silent intervals.
    pub sweep_interval: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            buffer_capacity: 15,
            sweep_interval: Duration::from_secs(600),
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// HTTP port for the API, health, and metrics routes.
    pub http_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { http_port: 8080 }
    }
}

/// Complete proxy configuration.
#[derive(Debug, Clone, Default)]
pub struct ProxyConfig {
    /// Server port settings.
    pub server: ServerSettings,
    /// Upstream endpoint settings.
    pub upstream: UpstreamSettings,
    /// Stream connection settings.
    pub stream: StreamSettings,
    /// Session lifecycle settings.
    pub sessions: SessionSettings,
}

impl ProxyConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a value that must be positive is zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        let server = ServerSettings {
            http_port: parse_env_u16("STREAM_PROXY_HTTP_PORT", ServerSettings::default().http_port),
        };

        let upstream_defaults = UpstreamSettings::default();
        let upstream = UpstreamSettings {
            rules_url: parse_env_string("STREAM_PROXY_RULES_URL", upstream_defaults.rules_url),
            stream_url: parse_env_string("STREAM_PROXY_STREAM_URL", upstream_defaults.stream_url),
            request_timeout: parse_env_duration_secs(
                "STREAM_PROXY_REQUEST_TIMEOUT_SECS",
                upstream_defaults.request_timeout,
            ),
            user_agent: parse_env_string("STREAM_PROXY_USER_AGENT", upstream_defaults.user_agent),
            max_frame_bytes: parse_env_usize(
                "STREAM_PROXY_MAX_FRAME_BYTES",
                upstream_defaults.max_frame_bytes,
            ),
        };

        let stream_defaults = StreamSettings::default();
        let stall_timeout = parse_env_duration_secs(
            "STREAM_PROXY_STALL_TIMEOUT_SECS",
            stream_defaults.stall_timeout.unwrap_or_default(),
        );
        let stream = StreamSettings {
            reconnect_delay_initial: parse_env_duration_millis(
                "STREAM_PROXY_RECONNECT_DELAY_INITIAL_MS",
                stream_defaults.reconnect_delay_initial,
            ),
            reconnect_delay_max: parse_env_duration_secs(
                "STREAM_PROXY_RECONNECT_DELAY_MAX_SECS",
                stream_defaults.reconnect_delay_max,
            ),
            reconnect_delay_multiplier: parse_env_f64(
                "STREAM_PROXY_RECONNECT_DELAY_MULTIPLIER",
                stream_defaults.reconnect_delay_multiplier,
            ),
            reconnect_jitter: parse_env_f64(
                "STREAM_PROXY_RECONNECT_JITTER",
                stream_defaults.reconnect_jitter,
            ),
            max_reconnect_attempts: parse_env_u32(
                "STREAM_PROXY_MAX_RECONNECT_ATTEMPTS",
                stream_defaults.max_reconnect_attempts,
            ),
            stall_timeout: (!stall_timeout.is_zero()).then_some(stall_timeout),
        };

        let sessions = SessionSettings {
            buffer_capacity: parse_env_usize(
                "STREAM_PROXY_BUFFER_CAPACITY",
                SessionSettings::default().buffer_capacity,
            ),
            sweep_interval: parse_env_duration_secs(
                "STREAM_PROXY_SWEEP_INTERVAL_SECS",
                SessionSettings::default().sweep_interval,
            ),
        };

        let config = Self {
            server,
            upstream,
            stream,
            sessions,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check values that have no meaningful zero.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the offending variable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, url) in [
            ("STREAM_PROXY_RULES_URL", &self.upstream.rules_url),
            ("STREAM_PROXY_STREAM_URL", &self.upstream.stream_url),
        ] {
            validate_http_url(key, url)?;
        }

        if self.sessions.buffer_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "STREAM_PROXY_BUFFER_CAPACITY".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        if self.sessions.sweep_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "STREAM_PROXY_SWEEP_INTERVAL_SECS".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        if self.stream.reconnect_delay_initial.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "STREAM_PROXY_RECONNECT_DELAY_INITIAL_MS".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        if self.stream.reconnect_delay_multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                key: "STREAM_PROXY_RECONNECT_DELAY_MULTIPLIER".to_string(),
                reason: "must be at least 1.0".to_string(),
            });
        }

        if !(0.0..1.0).contains(&self.stream.reconnect_jitter) {
            return Err(ConfigError::InvalidValue {
                key: "STREAM_PROXY_RECONNECT_JITTER".to_string(),
                reason: "must be in [0.0, 1.0)".to_string(),
            });
        }

        Ok(())
    }
}

/// Require an absolute `http` or `https` URL.
fn validate_http_url(key: &str, url: &str) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidValue {
        key: key.to_string(),
        reason,
    };

    let parsed = reqwest::Url::parse(url).map_err(|e| invalid(format!("not a URL: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(invalid(format!("unsupported scheme {other:?}"))),
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable holds a value outside its valid range.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Environment variable name.
        key: String,
        /// What is wrong with it.
        reason: String,
    },
}

fn parse_env_string(key: &str, default: String) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(default)
}

fn parse_env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
