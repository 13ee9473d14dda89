//! Log viewer configuration.

use std::time::Duration;

use crate::error::{LogViewError, Result};
use crate::taxonomy::Taxonomy;

/// Default chrono format for the display timestamp.
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Default period between incremental fetches while following.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Longest accepted period between incremental fetches.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(3600);

/// Configuration for the log viewer.
#[derive(Debug, Clone)]
pub struct LogViewConfig {
    /// Base URL of the log-retrieval endpoint.
    pub endpoint: String,
    /// Bearer token sent with every request.
    pub auth_token: Option<String>,
    /// Period between incremental fetches while following.
    pub poll_interval: Duration,
    /// Timeout for a single fetch.
    pub request_timeout: Duration,
    /// Chrono format used to render timestamps for display and matching.
    pub timestamp_format: String,
    /// Category schema the taxonomy starts from.
    pub static_schema: Taxonomy,
}

impl Default for LogViewConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080/api/admin".to_string(),
            auth_token: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: Duration::from_secs(10),
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
            static_schema: Taxonomy::builtin(),
        }
    }
}

impl LogViewConfig {
    /// Create a new configuration for the given endpoint.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Set the bearer token.
    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Set the poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the request timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the timestamp display format.
    #[must_use]
    pub fn with_timestamp_format(mut self, format: impl Into<String>) -> Self {
        self.timestamp_format = format.into();
        self
    }

    /// Set the static category schema.
    #[must_use]
    pub fn with_static_schema(mut self, schema: Taxonomy) -> Self {
        self.static_schema = schema;
        self
    }

    /// Checks the configuration for values the viewer cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`LogViewError::InvalidConfig`] on a zero request timeout, a
    /// poll interval that is zero or above [`MAX_POLL_INTERVAL`], an empty
    /// timestamp format, or a non-HTTP endpoint.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(LogViewError::InvalidConfig(
                "poll interval must be non-zero".to_string(),
            ));
        }
        if self.poll_interval > MAX_POLL_INTERVAL {
            return Err(LogViewError::InvalidConfig(format!(
                "poll interval must be at most {}s",
                MAX_POLL_INTERVAL.as_secs()
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(LogViewError::InvalidConfig(
                "request timeout must be non-zero".to_string(),
            ));
        }
        if self.timestamp_format.trim().is_empty() {
            return Err(LogViewError::InvalidConfig(
                "timestamp format must not be empty".to_string(),
            ));
        }
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(LogViewError::InvalidConfig(format!(
                "invalid endpoint: {}, must start with http:// or https://",
                self.endpoint
            )));
        }
        Ok(())
    }
}
