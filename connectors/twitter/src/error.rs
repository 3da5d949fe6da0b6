//! Errors for REST calls, configuration and signing.
//!
//! Streaming failures never surface here while a connection runs; the
//! connection core retries them. They only appear wrapped in
//! [`TwitterError::Stream`] when building a transport fails.

use std::time::Duration;

use chirp_streaming::StreamError;
use thiserror::Error;

/// Errors returned by the REST client, configuration and signers.
#[derive(Error, Debug)]
pub enum TwitterError {
    /// Transport-level failure talking to the API
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response or config JSON did not match the expected shape
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Request could not be signed
    #[error("OAuth error: {0}")]
    OAuth(String),

    /// Non-success response from a REST endpoint
    #[error("Twitter API error {status}: {message}")]
    Api {
        status: u16,
        message: String,
        /// First code of the v1.1 `errors` array, e.g. 32 for bad credentials
        error_code: Option<i32>,
        /// Seconds until the rate-limit window resets, when reported
        retry_after: Option<u64>,
    },

    /// 429 from a REST endpoint
    #[error("Rate limited, retry after {retry_after} seconds")]
    RateLimited { retry_after: u64 },

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    /// Invalid or incomplete configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A local file (config, media) could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TwitterError {
    /// Whether repeating the same call later may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::RateLimited { .. } | Self::Stream(_) => true,
            Self::Api { status, .. } => *status >= 500 || *status == 420 || *status == 429,
            Self::Json(_) | Self::OAuth(_) | Self::Config(_) | Self::Io(_) => false,
        }
    }

    /// Server-suggested wait before retrying, if any.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => Some(Duration::from_secs(*retry_after)),
            Self::Api { retry_after, .. } => retry_after.map(Duration::from_secs),
            Self::Stream(e) => e.retry_after(),
            _ => None,
        }
    }

    /// Twitter's numeric error code, for API errors that carried one.
    #[must_use]
    pub const fn error_code(&self) -> Option<i32> {
        match self {
            Self::Api { error_code, .. } => *error_code,
            _ => None,
        }
    }
}

/// Result alias used across the crate.
pub type TwitterResult<T> = Result<T, TwitterError>;
