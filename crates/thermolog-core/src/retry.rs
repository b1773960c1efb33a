//! Backoff policies for reopening streams and retrying sink writes.
//!
//! Both policies share one shape: an exponential delay starting at
//! `initial_delay`, growing by `backoff_multiplier`, capped at `max_delay`,
//! with up to 25% random jitter on top. The listener uses
//! [`RetryConfig::for_reconnect`] between stream failures and
//! [`RetryConfig::for_storage`] through [`with_retry`] for each reading.
//!
//! # Example
//!
//! ```
//! use thermolog_core::{Error, RetryConfig, with_retry};
//!
//! # async fn example() -> Result<(), Error> {
//! let policy = RetryConfig::for_storage();
//!
//! let row_id = with_retry(&policy, "append", || async {
//!     Ok::<_, Error>(7)
//! }).await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Upper bound on the random extra delay, as a fraction of the base delay.
const MAX_JITTER: f64 = 0.25;

/// Exponential backoff policy.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt. Only [`with_retry`] reads this; the
    /// listener's reconnect cap is `max_consecutive_failures`.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Ceiling for the un-jittered delay.
    pub max_delay: Duration,
    /// Growth factor per attempt; 1.0 keeps the delay constant.
    pub backoff_multiplier: f64,
    /// Add up to 25% random delay so restarts do not synchronize.
    pub jitter: bool,
}

impl RetryConfig {
    /// Policy for writes to the reading store.
    ///
    /// SQLite reports `SQLITE_BUSY` while a checkpoint or another process
    /// holds the lock; these clear within milliseconds to seconds.
    pub fn for_storage() -> Self {
        Self {
            max_retries: 4,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }

    /// Policy between attempts to reopen a failed stream.
    ///
    /// USB serial adapters take a second or two to re-enumerate after a
    /// glitch, so the first delay is generous.
    pub fn for_reconnect() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }

    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    #[must_use]
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    #[must_use]
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    #[must_use]
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Reject a multiplier below 1.0 (or NaN) and a ceiling below the
    /// initial delay.
    pub fn validate(&self) -> Result<()> {
        if self.backoff_multiplier.is_nan() || self.backoff_multiplier < 1.0 {
            return Err(Error::InvalidConfig(format!(
                "backoff multiplier {} must be at least 1.0",
                self.backoff_multiplier
            )));
        }
        if self.max_delay < self.initial_delay {
            return Err(Error::InvalidConfig(format!(
                "max delay {:?} is below initial delay {:?}",
                self.max_delay, self.initial_delay
            )));
        }
        Ok(())
    }

    /// Delay before retry number `attempt + 1` (so `attempt` is 0-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let growth = self
            .backoff_multiplier
            .powi(attempt.min(i32::MAX as u32) as i32);
        let base = (self.initial_delay.as_secs_f64() * growth).min(self.max_delay.as_secs_f64());

        let extra = if self.jitter {
            base * rand::rng().random_range(0.0..=MAX_JITTER)
        } else {
            0.0
        };

        Duration::from_secs_f64(base + extra)
    }
}

/// Whether another attempt could succeed.
fn is_transient(error: &Error) -> bool {
    matches!(error, Error::Io(_) | Error::StorageUnavailable(_))
}

/// Run `operation` until it succeeds, fails permanently, or the policy's
/// retries are used up.
///
/// Only I/O and storage errors are retried. The last error is returned when
/// every attempt fails.
pub async fn with_retry<F, Fut, T>(
    policy: &RetryConfig,
    what: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        let error = match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!("{} succeeded on retry {}", what, attempt);
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if !is_transient(&error) || attempt >= policy.max_retries {
            return Err(error);
        }

        let delay = policy.delay_for_attempt(attempt);
        attempt += 1;
        warn!(
            "{} failed ({}/{}): {}, retrying in {:?}",
            what,
            attempt,
            policy.max_retries + 1,
            error,
            delay
        );
        sleep(delay).await;
    }
}
