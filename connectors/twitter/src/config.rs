//! Twitter client configuration.

use std::path::Path;
use std::time::Duration;

use chirp_streaming::{
    DEFAULT_HTTP_BACKOFF_INITIAL, DEFAULT_HTTP_BACKOFF_MAX, DEFAULT_MAX_FRAME_SIZE,
    DEFAULT_NETWORK_BACKOFF_INITIAL, DEFAULT_NETWORK_BACKOFF_MAX, DEFAULT_NETWORK_BACKOFF_STEP,
    DEFAULT_STALL_TIMEOUT, ExponentialBackoff, LinearBackoff, ReconnectBackoff,
};
use serde::{Deserialize, Serialize};

use crate::error::{TwitterError, TwitterResult};

/// Configuration for the Twitter client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwitterConfig {
    /// OAuth 1.0a Consumer Key (API Key)
    #[serde(default)]
    pub consumer_key: String,

    /// OAuth 1.0a Consumer Secret (API Secret)
    #[serde(default)]
    pub consumer_secret: String,

    /// OAuth 1.0a Access Token
    #[serde(default)]
    pub access_token: String,

    /// OAuth 1.0a Access Token Secret
    #[serde(default)]
    pub access_token_secret: String,

    /// Base URL for the REST API (default: https://api.twitter.com)
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Upload URL for media (default: https://upload.twitter.com)
    #[serde(default = "default_upload_url")]
    pub upload_url: String,

    /// Public stream URL (default: https://stream.twitter.com)
    #[serde(default = "default_stream_url")]
    pub stream_url: String,

    /// User stream URL (default: https://userstream.twitter.com)
    #[serde(default = "default_user_stream_url")]
    pub user_stream_url: String,

    /// REST request timeout, and connect timeout for streams
    #[serde(default = "default_timeout", with = "duration_secs")]
    pub timeout: Duration,

    /// Streaming connection tuning
    #[serde(default)]
    pub stream: StreamConfig,
}

fn default_api_url() -> String {
    "https://api.twitter.com".into()
}

fn default_upload_url() -> String {
    "https://upload.twitter.com".into()
}

fn default_stream_url() -> String {
    "https://stream.twitter.com".into()
}

fn default_user_stream_url() -> String {
    "https://userstream.twitter.com".into()
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

impl Default for TwitterConfig {
    fn default() -> Self {
        Self {
            consumer_key: String::new(),
            consumer_secret: String::new(),
            access_token: String::new(),
            access_token_secret: String::new(),
            api_url: default_api_url(),
            upload_url: default_upload_url(),
            stream_url: default_stream_url(),
            user_stream_url: default_user_stream_url(),
            timeout: default_timeout(),
            stream: StreamConfig::default(),
        }
    }
}

impl TwitterConfig {
    /// Environment variables consulted by [`TwitterConfig::apply_env`].
    pub const ENV_CONSUMER_KEY: &'static str = "TWITTER_CONSUMER_KEY";
    pub const ENV_CONSUMER_SECRET: &'static str = "TWITTER_CONSUMER_SECRET";
    pub const ENV_ACCESS_TOKEN: &'static str = "TWITTER_ACCESS_TOKEN";
    pub const ENV_ACCESS_TOKEN_SECRET: &'static str = "TWITTER_ACCESS_TOKEN_SECRET";

    /// Load configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> TwitterResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read(path)?;
        serde_json::from_slice(&raw).map_err(|e| {
            TwitterError::Config(format!("invalid config file {}: {e}", path.display()))
        })
    }

    /// Build a default configuration with credentials taken from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Overwrite credentials with any that are set in the environment.
    pub fn apply_env(&mut self) {
        let overrides = [
            (Self::ENV_CONSUMER_KEY, &mut self.consumer_key),
            (Self::ENV_CONSUMER_SECRET, &mut self.consumer_secret),
            (Self::ENV_ACCESS_TOKEN, &mut self.access_token),
            (Self::ENV_ACCESS_TOKEN_SECRET, &mut self.access_token_secret),
        ];

        for (var, field) in overrides {
            if let Ok(value) = std::env::var(var) {
                if !value.is_empty() {
                    *field = value;
                }
            }
        }
    }

    /// Whether all four OAuth credentials are present.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        [
            &self.consumer_key,
            &self.consumer_secret,
            &self.access_token,
            &self.access_token_secret,
        ]
        .iter()
        .all(|value| !value.is_empty())
    }

    /// Check URLs and stream tuning for obvious mistakes.
    pub fn validate(&self) -> TwitterResult<()> {
        for (name, value) in [
            ("api_url", &self.api_url),
            ("upload_url", &self.upload_url),
            ("stream_url", &self.stream_url),
            ("user_stream_url", &self.user_stream_url),
        ] {
            url::Url::parse(value)
                .map_err(|e| TwitterError::Config(format!("{name} is not a valid URL: {e}")))?;
        }

        self.stream.validate()
    }
}

/// Tuning for streaming connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Seconds without any bytes before a connection counts as stalled
    #[serde(default = "default_stall_timeout_secs")]
    pub stall_timeout_secs: u64,

    /// First delay after a network failure
    #[serde(default = "default_network_backoff_initial_ms")]
    pub network_backoff_initial_ms: u64,

    /// Added per consecutive network failure
    #[serde(default = "default_network_backoff_step_ms")]
    pub network_backoff_step_ms: u64,

    /// Network failure delay ceiling
    #[serde(default = "default_network_backoff_max_ms")]
    pub network_backoff_max_ms: u64,

    /// First delay after an HTTP error status
    #[serde(default = "default_http_backoff_initial_ms")]
    pub http_backoff_initial_ms: u64,

    /// HTTP error delay ceiling
    #[serde(default = "default_http_backoff_max_ms")]
    pub http_backoff_max_ms: u64,

    /// Largest message accepted before the framer resynchronizes
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
}

fn default_stall_timeout_secs() -> u64 {
    DEFAULT_STALL_TIMEOUT.as_secs()
}

fn default_network_backoff_initial_ms() -> u64 {
    millis(DEFAULT_NETWORK_BACKOFF_INITIAL)
}

fn default_network_backoff_step_ms() -> u64 {
    millis(DEFAULT_NETWORK_BACKOFF_STEP)
}

fn default_network_backoff_max_ms() -> u64 {
    millis(DEFAULT_NETWORK_BACKOFF_MAX)
}

fn default_http_backoff_initial_ms() -> u64 {
    millis(DEFAULT_HTTP_BACKOFF_INITIAL)
}

fn default_http_backoff_max_ms() -> u64 {
    millis(DEFAULT_HTTP_BACKOFF_MAX)
}

const fn default_max_message_bytes() -> usize {
    DEFAULT_MAX_FRAME_SIZE
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            stall_timeout_secs: default_stall_timeout_secs(),
            network_backoff_initial_ms: default_network_backoff_initial_ms(),
            network_backoff_step_ms: default_network_backoff_step_ms(),
            network_backoff_max_ms: default_network_backoff_max_ms(),
            http_backoff_initial_ms: default_http_backoff_initial_ms(),
            http_backoff_max_ms: default_http_backoff_max_ms(),
            max_message_bytes: default_max_message_bytes(),
        }
    }
}

impl StreamConfig {
    /// Stall timeout as a duration.
    #[must_use]
    pub const fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.stall_timeout_secs)
    }

    /// Reconnect backoff built from these settings.
    #[must_use]
    pub fn backoff(&self) -> ReconnectBackoff {
        ReconnectBackoff::new(
            LinearBackoff::new(
                Duration::from_millis(self.network_backoff_initial_ms),
                Duration::from_millis(self.network_backoff_step_ms),
                Duration::from_millis(self.network_backoff_max_ms),
            ),
            ExponentialBackoff::new(
                Duration::from_millis(self.http_backoff_initial_ms),
                Duration::from_millis(self.http_backoff_max_ms),
            ),
        )
    }

    fn validate(&self) -> TwitterResult<()> {
        if self.stall_timeout_secs == 0 {
            return Err(TwitterError::Config(
                "stream.stall_timeout_secs must be positive".into(),
            ));
        }
        if self.max_message_bytes == 0 {
            return Err(TwitterError::Config(
                "stream.max_message_bytes must be positive".into(),
            ));
        }
        if self.network_backoff_initial_ms > self.network_backoff_max_ms
            || self.http_backoff_initial_ms > self.http_backoff_max_ms
        {
            return Err(TwitterError::Config(
                "stream backoff initial delay exceeds its maximum".into(),
            ));
        }
        Ok(())
    }
}

/// Rate limit information from Twitter API headers.
#[derive(Debug, Clone, Default)]
pub struct RateLimitInfo {
    /// Maximum number of requests allowed in the window
    pub limit: Option<u32>,

    /// Remaining requests in the current window
    pub remaining: Option<u32>,

    /// Unix timestamp when the rate limit resets
    pub reset: Option<u64>,
}

impl RateLimitInfo {
    /// Parse rate limit info from response headers.
    #[must_use]
    pub fn from_headers(headers: &reqwest::header::HeaderMap) -> Self {
        let parse = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim);

        Self {
            limit: parse("x-rate-limit-limit").and_then(|v| v.parse().ok()),
            remaining: parse("x-rate-limit-remaining").and_then(|v| v.parse().ok()),
            reset: parse("x-rate-limit-reset").and_then(|v| v.parse().ok()),
        }
    }

    /// Check if we're rate limited (remaining == 0).
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(0)
    }

    /// Get the duration until rate limit resets.
    #[must_use]
    pub fn time_until_reset(&self) -> Option<Duration> {
        let reset = self.reset?;
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .ok()?
            .as_secs();

        (reset > now).then(|| Duration::from_secs(reset - now))
    }
}
