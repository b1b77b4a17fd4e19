//! Bounded retry with exponential backoff.
//!
//! Used to wait for an external collaborator (the ledger provider) to
//! become ready instead of polling in ad-hoc loops.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// How many times to try, and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    multiplier: u32,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(10, Duration::from_millis(500))
    }
}

impl RetryPolicy {
    /// Create a policy with `max_attempts` tries (at least one) and doubling delays.
    #[must_use]
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            multiplier: 2,
            max_delay: Duration::from_secs(30),
        }
    }

    /// A policy that tries exactly once.
    #[must_use]
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Set the backoff multiplier (1 = constant delay).
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: u32) -> Self {
        self.multiplier = multiplier.max(1);
        self
    }

    /// Cap every individual delay.
    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Total attempts allowed.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = self.multiplier.checked_pow(exponent).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Run `operation` until it returns `Ok`, sleeping between attempts.
    ///
    /// # Errors
    ///
    /// Returns the last error once all attempts are exhausted.
    pub async fn retry<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= self.max_attempts => {
                    warn!("Giving up after {attempt} attempts: {e}");
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.delay_for(attempt);
                    debug!(
                        "Attempt {attempt}/{} failed ({e}), retrying in {}ms",
                        self.max_attempts,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
