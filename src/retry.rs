//! Bounded retry and bounded polling.
//!
//! Two policies, one executor each:
//!
//! - [`RetryPolicy::run`] repeats a host call while it fails with a
//!   retryable error, doubling the pause up to a cap.
//! - [`PollPolicy::poll`] repeats a check at a fixed interval until its
//!   result satisfies a predicate or the attempts run out. Running out is a
//!   definite answer (`Ok(None)`), never a hang.
//!
//! All waiting goes through a [`Sleeper`], so tests can observe the total
//! wait without spending it.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tracing::debug;
use wsup_vcs::VcsError;

// ---------------------------------------------------------------------------
// Sleeper
// ---------------------------------------------------------------------------

/// Something that can wait.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Blocks the current thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Returns immediately and remembers every requested pause.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    pauses: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every pause requested so far, in order.
    #[must_use]
    pub fn pauses(&self) -> Vec<Duration> {
        self.pauses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Sum of all requested pauses.
    #[must_use]
    pub fn total(&self) -> Duration {
        self.pauses().iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.pauses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration);
    }
}

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Retry transient host failures with capped exponential backoff.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total calls, including the first. Zero is treated as one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub const fn once() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Call `f` until it succeeds, fails with a non-retryable error, or the
    /// attempts are used up. Returns the last error in the latter cases.
    pub fn run<T>(
        &self,
        sleeper: &dyn Sleeper,
        label: &str,
        mut f: impl FnMut() -> Result<T, VcsError>,
    ) -> Result<T, VcsError> {
        let attempts = self.max_attempts.max(1);
        let mut backoff = self.initial_backoff;
        let mut attempt = 1;
        loop {
            match f() {
                Err(e) if e.is_retryable() && attempt < attempts => {
                    debug!(label, attempt, error = %e, ?backoff, "retrying host call");
                    sleeper.sleep(backoff);
                    backoff = backoff.checked_mul(2).unwrap_or(self.max_backoff).min(self.max_backoff);
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// PollPolicy
// ---------------------------------------------------------------------------

/// Fixed-interval polling with a hard attempt ceiling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    /// Checks to make before giving up. Zero is treated as one.
    pub attempts: u32,
    pub interval: Duration,
}

impl PollPolicy {
    #[must_use]
    pub const fn new(attempts: u32, interval: Duration) -> Self {
        Self { attempts, interval }
    }

    /// Upper bound on the time [`poll`](Self::poll) spends waiting.
    #[must_use]
    pub fn max_wait(&self) -> Duration {
        self.interval.saturating_mul(self.attempts)
    }

    /// Check until `done` accepts a result.
    ///
    /// Returns `Ok(Some(value))` with the accepted value, `Ok(None)` when the
    /// attempts are exhausted, or the first check error.
    pub fn poll<T, E>(
        &self,
        sleeper: &dyn Sleeper,
        mut check: impl FnMut() -> Result<T, E>,
        done: impl Fn(&T) -> bool,
    ) -> Result<Option<T>, E> {
        let attempts = self.attempts.max(1);
        for attempt in 1..=attempts {
            let value = check()?;
            if done(&value) {
                return Ok(Some(value));
            }
            if attempt < attempts {
                sleeper.sleep(self.interval);
            }
        }
        Ok(None)
    }
}
