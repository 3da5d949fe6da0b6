//! Streaming error types.

use std::time::Duration;

use crate::framing::FramingError;

/// Which reconnect schedule a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// DNS/TCP/TLS failures, mid-stream read errors, remote close, stalls.
    Network,
    /// The server answered with a non-success HTTP status.
    Http,
}

/// Streaming errors.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Connection could not be established.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// HTTP error status on connect.
    #[error("HTTP error: {status} - {message}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Response body or reason phrase.
        message: String,
        /// Server supplied `Retry-After` hint.
        retry_after: Option<Duration>,
    },

    /// Socket error while reading the response body.
    #[error("Stream read failed: {0}")]
    Read(String),

    /// Remote side ended the response body.
    #[error("Connection closed by remote")]
    Closed,

    /// No bytes arrived within the stall timeout.
    #[error("Stalled: no data for {0:?}")]
    Stall(Duration),

    /// A single frame could not be demarcated.
    #[error("Framing error: {0}")]
    Framing(#[from] FramingError),
}

impl StreamError {
    /// Build an HTTP status error without a retry hint.
    #[must_use]
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Whether the server asked us to slow down (420 Enhance Your Calm, 429).
    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::HttpStatus { status: 420 | 429, .. })
    }

    /// Reconnect schedule for this failure.
    #[must_use]
    pub const fn failure_class(&self) -> FailureClass {
        match self {
            Self::HttpStatus { .. } => FailureClass::Http,
            Self::Connect(_) | Self::Read(_) | Self::Closed | Self::Stall(_) | Self::Framing(_) => {
                FailureClass::Network
            }
        }
    }

    /// Get the suggested retry delay.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::HttpStatus { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Result type for streaming operations.
pub type StreamResult<T> = Result<T, StreamError>;
