//! Retry with exponential backoff and jitter
//!
//! Terminal errors stop retrying immediately; transient errors are retried
//! until the attempt budget runs out.

use crate::config::CrawlerConfig;
use crate::transport::TransportError;
use rand::{thread_rng, Rng};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Why a request was given up on
#[derive(Debug, Error)]
pub enum RetryError {
    #[error("gave up after {attempts} attempt(s): {error}")]
    GaveUp { attempts: u32, error: TransportError },

    #[error("exhausted {attempts} attempts: {error}")]
    Exhausted { attempts: u32, error: TransportError },
}

impl RetryError {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::GaveUp { attempts, .. } | Self::Exhausted { attempts, .. } => *attempts,
        }
    }
}

/// A successful result and the number of attempts it took
#[derive(Debug)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
}

/// Backoff schedule and attempt budget
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base: Duration,
    max: Duration,
    jitter: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base: Duration, max: Duration, jitter: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base,
            max,
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.backoff_base_ms),
            Duration::from_millis(config.backoff_max_ms),
            config.jitter,
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after failed attempt number `attempt` (1-based)
    ///
    /// `base * 2^(attempt - 1)` capped at the maximum, then stretched by up to
    /// `jitter` of itself. Each delay is at least twice the previous
    /// un-jittered one, so delays strictly increase until the cap.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let sample = if self.jitter > 0.0 {
            thread_rng().gen_range(0.0..1.0)
        } else {
            0.0
        };
        self.backoff(attempt, sample)
    }

    fn backoff(&self, attempt: u32, sample: f64) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self
            .base
            .checked_mul(1u32 << exponent)
            .map_or(self.max, |delay| delay.min(self.max));
        delay.mul_f64(1.0 + self.jitter * sample)
    }

    /// Runs `op` until it succeeds, fails terminally, or the budget runs out
    ///
    /// # Arguments
    ///
    /// * `log_id` - Correlation id for log lines
    /// * `op` - Produces one attempt per call
    ///
    /// # Returns
    ///
    /// * `Ok(Attempted)` - The first successful value
    /// * `Err(RetryError::GaveUp)` - A terminal error, after one attempt
    /// * `Err(RetryError::Exhausted)` - `max_attempts` transient errors
    pub async fn run<T, F, Fut>(&self, log_id: &str, mut op: F) -> Result<Attempted<T>, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => {
                    return Ok(Attempted {
                        value,
                        attempts: attempt,
                    })
                }
                Err(error) if error.is_terminal() => {
                    return Err(RetryError::GaveUp {
                        attempts: attempt,
                        error,
                    })
                }
                Err(error) if attempt >= self.max_attempts => {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        error,
                    })
                }
                Err(error) => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        request = %log_id,
                        "Attempt {}/{} failed: {}; retrying in {:?}",
                        attempt,
                        self.max_attempts,
                        error,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
