//! Process-wide token pacer shared by every provider.

use rand::Rng;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::SourceError;

/// Pacing and backoff configuration.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Target request rate; `0` disables pacing.
    pub requests_per_second: f64,
    /// Lower bound of the per-acquisition jitter, in seconds.
    pub jitter_min: f64,
    /// Upper bound of the per-acquisition jitter, in seconds.
    pub jitter_max: f64,
    /// Base of the exponential backoff.
    pub backoff_base: f64,
    /// Backoff ceiling, in seconds.
    pub backoff_max: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 2.0,
            jitter_min: 0.2,
            jitter_max: 0.6,
            backoff_base: 1.5,
            backoff_max: 30.0,
        }
    }
}

impl RateLimitConfig {
    fn validate(&self) -> Result<(), SourceError> {
        if self.requests_per_second < 0.0
            || self.jitter_min < 0.0
            || self.jitter_max < 0.0
            || self.backoff_base < 0.0
            || self.backoff_max < 0.0
        {
            return Err(SourceError::InvalidRateLimit(
                "negative values are not allowed".to_string(),
            ));
        }
        if self.jitter_min > self.jitter_max {
            return Err(SourceError::InvalidRateLimit(format!(
                "jitter_min {} > jitter_max {}",
                self.jitter_min, self.jitter_max
            )));
        }
        Ok(())
    }
}

/// Global pacer: one issue slot at a time, uniform jitter on top of the
/// theoretical minimum interval.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    last_issue: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter, rejecting invalid configuration.
    ///
    /// # Errors
    ///
    /// Returns an error for negative values or `jitter_min > jitter_max`.
    pub fn new(config: RateLimitConfig) -> Result<Self, SourceError> {
        config.validate()?;
        Ok(Self {
            config,
            last_issue: Mutex::new(None),
        })
    }

    /// Blocks until the next request slot. The slot is reserved while the
    /// internal lock is held, so concurrent callers serialize correctly.
    pub async fn acquire(&self) {
        let min_interval = if self.config.requests_per_second > 0.0 {
            1.0 / self.config.requests_per_second
        } else {
            0.0
        };
        let sleep_for = {
            let mut last = self.last_issue.lock().await;
            let now = Instant::now();
            let mut wait = match *last {
                Some(prev) => {
                    let next_allowed = prev + Duration::from_secs_f64(min_interval);
                    next_allowed.saturating_duration_since(now).as_secs_f64()
                }
                None => 0.0,
            };
            if self.config.jitter_max > 0.0 {
                wait += rand::thread_rng()
                    .gen_range(self.config.jitter_min..=self.config.jitter_max);
            }
            *last = Some(now + Duration::from_secs_f64(wait));
            wait
        };
        if sleep_for > 0.0 {
            tokio::time::sleep(Duration::from_secs_f64(sleep_for)).await;
        }
    }

    /// Returns the backoff delay for a retry attempt:
    /// `min(base^max(1, attempt), backoff_max)` seconds.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.max(1);
        let delay = self.config.backoff_base.powi(exponent as i32);
        Duration::from_secs_f64(delay.min(self.config.backoff_max))
    }
}
