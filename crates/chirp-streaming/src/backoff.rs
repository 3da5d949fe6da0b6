//! Reconnect backoff strategies.
//!
//! Network-level failures back off linearly and recover quickly. HTTP-level
//! failures (rate limits, 5xx, auth rejections) back off exponentially so a
//! misbehaving client does not hammer the endpoint.

use std::fmt;
use std::time::Duration;

use tracing::debug;

use crate::{
    DEFAULT_HTTP_BACKOFF_INITIAL, DEFAULT_HTTP_BACKOFF_MAX, DEFAULT_NETWORK_BACKOFF_INITIAL,
    DEFAULT_NETWORK_BACKOFF_MAX, DEFAULT_NETWORK_BACKOFF_STEP, FailureClass, StreamError,
};

/// Trait for backoff strategies.
pub trait BackoffStrategy: Send + Sync + fmt::Debug {
    /// Delay before reconnect attempt `attempt` (zero based).
    fn delay_for_attempt(&self, attempt: u32) -> Duration;

    /// Upper bound of any delay this strategy produces.
    fn max_delay(&self) -> Duration;
}

/// Linear backoff: `initial + step * attempt`, capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearBackoff {
    /// Delay for the first attempt.
    pub initial: Duration,
    /// Added per attempt.
    pub step: Duration,
    /// Maximum delay.
    pub max: Duration,
}

impl LinearBackoff {
    /// Create a new linear backoff.
    #[must_use]
    pub const fn new(initial: Duration, step: Duration, max: Duration) -> Self {
        Self { initial, step, max }
    }
}

impl Default for LinearBackoff {
    fn default() -> Self {
        Self::new(
            DEFAULT_NETWORK_BACKOFF_INITIAL,
            DEFAULT_NETWORK_BACKOFF_STEP,
            DEFAULT_NETWORK_BACKOFF_MAX,
        )
    }
}

impl BackoffStrategy for LinearBackoff {
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.initial
            .saturating_add(self.step.saturating_mul(attempt))
            .min(self.max)
    }

    fn max_delay(&self) -> Duration {
        self.max
    }
}

/// Exponential backoff without jitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialBackoff {
    /// Delay for the first attempt.
    pub initial: Duration,
    /// Maximum delay.
    pub max: Duration,
    /// Multiplier for each attempt.
    pub multiplier: f64,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff that doubles each attempt.
    #[must_use]
    pub const fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            multiplier: 2.0,
        }
    }

    /// Set the multiplier.
    #[must_use]
    pub const fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_HTTP_BACKOFF_INITIAL, DEFAULT_HTTP_BACKOFF_MAX)
    }
}

impl BackoffStrategy for ExponentialBackoff {
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self.initial.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = base.min(self.max.as_secs_f64());

        if capped.is_finite() && capped >= 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            self.max
        }
    }

    fn max_delay(&self) -> Duration {
        self.max
    }
}

/// Tracks consecutive failures per class and hands out reconnect delays.
#[derive(Debug)]
pub struct ReconnectBackoff {
    network: Box<dyn BackoffStrategy>,
    http: Box<dyn BackoffStrategy>,
    network_attempts: u32,
    http_attempts: u32,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(LinearBackoff::default(), ExponentialBackoff::default())
    }
}

impl ReconnectBackoff {
    /// Create a handler from a network and an HTTP strategy.
    #[must_use]
    pub fn new(
        network: impl BackoffStrategy + 'static,
        http: impl BackoffStrategy + 'static,
    ) -> Self {
        Self {
            network: Box::new(network),
            http: Box::new(http),
            network_attempts: 0,
            http_attempts: 0,
        }
    }

    /// Delay to wait before reconnecting after `error`.
    pub fn next_delay(&mut self, error: &StreamError) -> Duration {
        let class = error.failure_class();
        let delay = match class {
            FailureClass::Network => {
                let delay = self.network.delay_for_attempt(self.network_attempts);
                self.network_attempts = self.network_attempts.saturating_add(1);
                delay
            }
            FailureClass::Http => {
                let mut delay = self.http.delay_for_attempt(self.http_attempts);
                self.http_attempts = self.http_attempts.saturating_add(1);
                if let Some(hint) = error.retry_after() {
                    delay = delay.max(hint).min(self.http.max_delay());
                }
                delay
            }
        };

        debug!(
            ?class,
            attempt = self.attempts(class),
            delay_ms = delay.as_millis(),
            "Scheduled reconnect backoff"
        );
        delay
    }

    /// Reset both schedules to their minimum.
    pub fn reset(&mut self) {
        self.network_attempts = 0;
        self.http_attempts = 0;
    }

    /// Consecutive failures recorded for a class.
    #[must_use]
    pub const fn attempts(&self, class: FailureClass) -> u32 {
        match class {
            FailureClass::Network => self.network_attempts,
            FailureClass::Http => self.http_attempts,
        }
    }
}
