//! # Exponential Backoff
//!
//! Retry policy and the step-by-step backoff state used by the
//! transform-and-update loop.
//!
//! The loop drives [`Backoff`] by hand: it asks for permission before every
//! attempt and for a delay after every failed one. Sleeping is left to the
//! caller so tests can run the schedule without real time passing.
//!
//! ## Usage
//!
//! ```rust
//! use managed_resource_controller::controller::backoff::{Backoff, RetryPolicy};
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new(Duration::from_millis(100), 2.0, 0.0, 3);
//! let mut backoff = Backoff::new(&policy);
//!
//! assert!(backoff.start_attempt());
//! assert_eq!(backoff.next_delay(), Some(Duration::from_millis(100)));
//! assert!(backoff.start_attempt());
//! assert_eq!(backoff.next_delay(), Some(Duration::from_millis(200)));
//! assert!(backoff.start_attempt());
//! assert_eq!(backoff.next_delay(), None);
//! assert!(!backoff.start_attempt());
//! ```

use std::time::Duration;

/// Retry policy for optimistic updates
///
/// Pure configuration: every retry loop builds its own [`Backoff`] from it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the second attempt
    pub duration: Duration,
    /// Multiplier applied to the delay after each sleep
    pub factor: f64,
    /// Maximum extra fraction added to a delay (0 disables jitter)
    pub jitter: f64,
    /// Maximum number of attempts
    pub steps: u32,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(duration: Duration, factor: f64, jitter: f64, steps: u32) -> Self {
        Self {
            duration,
            factor,
            jitter,
            steps,
        }
    }

    /// Policy for operations that are expected to conflict only briefly
    ///
    /// 5 attempts, 10ms apart, with 10% jitter.
    #[must_use]
    pub const fn default_retry() -> Self {
        Self::new(Duration::from_millis(10), 1.0, 0.1, 5)
    }

    /// Policy for operations that may need more time between attempts
    ///
    /// 4 attempts starting at 10ms and growing fivefold, with 10% jitter.
    #[must_use]
    pub const fn default_backoff() -> Self {
        Self::new(Duration::from_millis(10), 5.0, 0.1, 4)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::default_retry()
    }
}

/// Backoff state for a single retry loop
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    factor: f64,
    jitter: f64,
    remaining: u32,
}

impl Backoff {
    #[must_use]
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            current: policy.duration,
            factor: policy.factor,
            jitter: policy.jitter,
            remaining: policy.steps,
        }
    }

    /// Consume one attempt from the budget
    ///
    /// Returns `false` once all attempts have been used.
    pub fn start_attempt(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }

    /// Delay to wait before the next attempt, advancing the schedule
    ///
    /// Returns `None` when no attempts remain, so the loop never sleeps
    /// before giving up.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        let delay = jitter(self.current, self.jitter);
        self.current = scale(self.current, self.factor);
        Some(delay)
    }

    /// Attempts left in the budget
    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.remaining
    }
}

/// Returns a duration uniformly distributed in `[duration, duration * (1 + max_factor))`
///
/// A non-positive factor returns the duration unchanged.
#[must_use]
pub fn jitter(duration: Duration, max_factor: f64) -> Duration {
    if max_factor <= 0.0 {
        return duration;
    }
    let extra = duration.as_secs_f64() * max_factor * rand::random::<f64>();
    duration.saturating_add(Duration::try_from_secs_f64(extra).unwrap_or(Duration::ZERO))
}

fn scale(duration: Duration, factor: f64) -> Duration {
    if factor <= 0.0 {
        return duration;
    }
    Duration::try_from_secs_f64(duration.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}
