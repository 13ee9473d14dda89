//! Error types for the log viewer.

use thiserror::Error;

/// Errors that can occur while fetching or configuring the log viewer.
///
/// Query parsing and record decoding never produce errors: a malformed query
/// degrades to tokens that match nothing, and a malformed record is kept and
/// shown.
#[derive(Debug, Error)]
pub enum LogViewError {
    /// The HTTP request could not be completed.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The log endpoint answered with a non-success status.
    #[error("log endpoint returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The response payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// A level or severity filter value was not recognised.
    #[error("invalid filter value: {0}")]
    InvalidFilterValue(String),

    /// The driver task has stopped and no longer accepts commands.
    #[error("log view driver closed")]
    ChannelClosed,
}

/// Result type alias for log viewer operations.
pub type Result<T> = std::result::Result<T, LogViewError>;
