//! Fixed-delay retry policy for remote requests.
//!
//! Every remote call in a sync run (catalog page, manifest, checksum, stream
//! open) is issued through [`RetryPolicy::attempt`]. The delay between
//! attempts is constant; there is no backoff and no jitter.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use sentinel_mirror::retry::{RetryPolicy, ThreadSleeper};
//!
//! let policy = RetryPolicy::fixed(3, Duration::from_secs(10));
//! let body = policy.attempt(&ThreadSleeper, "catalog page", || client.fetch_text(&url))?;
//! ```

use std::fmt;
use std::thread;
use std::time::Duration;

use tracing::{debug, info};

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay between attempts (10 seconds).
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 10;

/// Blocking wait between attempts.
///
/// Injected so tests can run retry loops without real delays.
pub trait Sleeper {
    /// Block for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Sleeper backed by [`std::thread::sleep`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Sleeper that returns immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSleeper;

impl Sleeper for NoopSleeper {
    fn sleep(&self, _duration: Duration) {}
}

/// How a remote request handles transient failures.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts is `max_retries + 1`.
    max_retries: u32,
    /// Constant delay between attempts.
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(
            DEFAULT_MAX_RETRIES,
            Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
        )
    }
}

/// All attempts of a request failed.
#[derive(Debug)]
pub struct Exhausted<E> {
    /// Number of attempts made.
    pub attempts: u32,
    /// Error returned by the last attempt.
    pub last_error: E,
}

impl<E: fmt::Display> fmt::Display for Exhausted<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "gave up after {} attempt(s): {}",
            self.attempts, self.last_error
        )
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for Exhausted<E> {}

impl RetryPolicy {
    /// Creates a fixed-delay policy.
    ///
    /// # Arguments
    ///
    /// * `max_retries` - Retries after the first attempt
    /// * `delay` - Fixed delay between attempts
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Policy that tries exactly once.
    pub fn none() -> Self {
        Self::fixed(0, Duration::ZERO)
    }

    /// Returns the total number of attempts this policy allows.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Returns the delay between attempts.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `operation` until it succeeds or the attempts are used up.
    ///
    /// `what` names the request in log output.
    pub fn attempt<T, E, S, F>(&self, sleeper: &S, what: &str, mut operation: F) -> Result<T, Exhausted<E>>
    where
        E: fmt::Display,
        S: Sleeper + ?Sized,
        F: FnMut() -> Result<T, E>,
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 1;

        loop {
            match operation() {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= max_attempts => {
                    debug!(what, attempt, error = %e, "Request failed, no attempts left");
                    return Err(Exhausted {
                        attempts: attempt,
                        last_error: e,
                    });
                }
                Err(e) => {
                    info!(
                        what,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Request failed, waiting {}s before retrying",
                        self.delay.as_secs()
                    );
                    sleeper.sleep(self.delay);
                    attempt += 1;
                }
            }
        }
    }
}
