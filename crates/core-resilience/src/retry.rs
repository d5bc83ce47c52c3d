//! Retry policy: pure decisions about whether and when to try again
//!
//! A [`RetryPolicy`] never sleeps and never performs I/O. It answers two
//! questions for a caller that has just seen an attempt fail:
//!
//! - **Should I retry?** `should_retry(attempt, error)` is true while the
//!   number of attempts made so far is within `max_retries` and the error
//!   classifies itself as retryable.
//! - **How long do I wait first?** `delay_for(attempt)` returns the pause
//!   before the next attempt. Delays never decrease as `attempt` grows.
//!
//! Applying the delay is the caller's job, which keeps the same policy usable
//! from a blocking loop, an async worker, or a test that only inspects the
//! numbers.
//!
//! # Example
//!
//! ```
//! use relay_core_resilience::retry::{Backoff, RetryPolicy, Retryable};
//! use std::time::Duration;
//!
//! struct Flaky;
//! impl Retryable for Flaky {
//!     fn is_retryable(&self) -> bool { true }
//! }
//!
//! let policy = RetryPolicy::new(
//!     2,
//!     Backoff::Exponential {
//!         initial: Duration::from_millis(100),
//!         factor: 2.0,
//!         max: Duration::from_secs(1),
//!     },
//! ).unwrap();
//!
//! assert!(policy.should_retry(1, &Flaky));
//! assert!(policy.should_retry(2, &Flaky));
//! assert!(!policy.should_retry(3, &Flaky)); // initial try + 2 retries used up
//! assert_eq!(policy.delay_for(2), Duration::from_millis(200));
//! ```

use std::time::Duration;

use crate::error::ResilienceError;

/// Classification hook for errors seen by a retry loop
pub trait Retryable {
    /// True if another attempt could plausibly succeed (timeouts, lost connections)
    fn is_retryable(&self) -> bool;
}

/// Delay schedule between attempts
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// Retry immediately
    None,

    /// Same delay before every retry
    Fixed(Duration),

    /// `initial * factor^(attempt - 1)`, capped at `max`
    Exponential {
        initial: Duration,
        factor: f64,
        max: Duration,
    },
}

impl Backoff {
    /// Check that the schedule is non-decreasing and finite
    pub fn validate(&self) -> Result<(), ResilienceError> {
        match self {
            Backoff::None | Backoff::Fixed(_) => Ok(()),
            Backoff::Exponential {
                initial,
                factor,
                max,
            } => {
                if !factor.is_finite() || *factor < 1.0 {
                    return Err(ResilienceError::InvalidPolicy(format!(
                        "backoff factor must be a finite value >= 1.0, got {}",
                        factor
                    )));
                }
                if initial > max {
                    return Err(ResilienceError::InvalidPolicy(format!(
                        "initial delay {:?} exceeds max delay {:?}",
                        initial, max
                    )));
                }
                Ok(())
            }
        }
    }

    fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        match self {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed(delay) => *delay,
            Backoff::Exponential {
                initial,
                factor,
                max,
            } => {
                let exponent = (attempt - 1).min(i32::MAX as u32) as i32;
                let delay_ns = (initial.as_nanos() as f64 * factor.powi(exponent)).round();
                if !delay_ns.is_finite() || delay_ns >= max.as_nanos() as f64 {
                    *max
                } else {
                    Duration::from_nanos(delay_ns as u64).min(*max)
                }
            }
        }
    }
}

/// Immutable retry configuration shared by every attempt of one command
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Backoff::Exponential {
                initial: Duration::from_millis(100),
                factor: 2.0,
                max: Duration::from_secs(30),
            },
        }
    }
}

impl RetryPolicy {
    /// Create a policy, rejecting backoff schedules that could shrink or overflow
    pub fn new(max_retries: u32, backoff: Backoff) -> Result<Self, ResilienceError> {
        backoff.validate()?;
        Ok(Self {
            max_retries,
            backoff,
        })
    }

    /// Single attempt, never retry
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff: Backoff::None,
        }
    }

    /// Retry up to `max_retries` times with no delay
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Backoff::None,
        }
    }

    /// Retry up to `max_retries` times, waiting `delay` before each retry
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Fixed(delay),
        }
    }

    /// Doubling backoff starting at `initial`. A `max` below `initial` is raised to `initial`.
    pub fn exponential(max_retries: u32, initial: Duration, max: Duration) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Exponential {
                initial,
                factor: 2.0,
                max: max.max(initial),
            },
        }
    }

    /// Maximum additional attempts after the first one
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Initial attempt plus retries
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay schedule
    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Decide whether to try again.
    ///
    /// `attempt` is the number of attempts already made, so the first failure
    /// is checked with `attempt == 1`.
    pub fn should_retry<E: Retryable + ?Sized>(&self, attempt: u32, error: &E) -> bool {
        attempt <= self.max_retries && error.is_retryable()
    }

    /// Delay to apply before the attempt that follows attempt number `attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Transient;
    struct Permanent;

    impl Retryable for Transient {
        fn is_retryable(&self) -> bool {
            true
        }
    }

    impl Retryable for Permanent {
        fn is_retryable(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries(), 3);
        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
    }

    #[test]
    fn test_should_retry_bounds() {
        let policy = RetryPolicy::immediate(3);

        assert!(policy.should_retry(1, &Transient));
        assert!(policy.should_retry(3, &Transient));
        assert!(!policy.should_retry(4, &Transient));
    }

    #[test]
    fn test_permanent_error_never_retries() {
        let policy = RetryPolicy::immediate(10);
        assert!(!policy.should_retry(1, &Permanent));
    }

    #[test]
    fn test_zero_retries() {
        let policy = RetryPolicy::none();
        assert_eq!(policy.max_attempts(), 1);
        assert!(!policy.should_retry(1, &Transient));
    }

    #[test]
    fn test_fixed_delay() {
        let policy = RetryPolicy::fixed(5, Duration::from_millis(250));
        assert_eq!(policy.delay_for(0), Duration::ZERO);
        assert_eq!(policy.delay_for(1), Duration::from_millis(250));
        assert_eq!(policy.delay_for(5), Duration::from_millis(250));
    }

    #[test]
    fn test_exponential_delay_caps_at_max() {
        let policy = RetryPolicy::exponential(
            10,
            Duration::from_millis(100),
            Duration::from_millis(1000),
        );

        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(4), Duration::from_millis(800));
        assert_eq!(policy.delay_for(5), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_millis(1000));
    }

    #[test]
    fn test_exponential_keeps_sub_millisecond_precision() {
        let policy =
            RetryPolicy::exponential(4, Duration::from_micros(250), Duration::from_millis(1));

        assert_eq!(policy.delay_for(1), Duration::from_micros(250));
        assert_eq!(policy.delay_for(2), Duration::from_micros(500));
        assert_eq!(policy.delay_for(3), Duration::from_millis(1));
        assert_eq!(policy.delay_for(4), Duration::from_millis(1));
    }

    #[test]
    fn test_delays_are_non_decreasing() {
        let policy = RetryPolicy::new(
            20,
            Backoff::Exponential {
                initial: Duration::from_millis(7),
                factor: 1.5,
                max: Duration::from_secs(5),
            },
        )
        .unwrap();

        let mut previous = Duration::ZERO;
        for attempt in 0..64 {
            let delay = policy.delay_for(attempt);
            assert!(delay >= previous, "delay shrank at attempt {}", attempt);
            previous = delay;
        }
    }

    #[test]
    fn test_exponential_max_below_initial_is_raised() {
        let policy =
            RetryPolicy::exponential(2, Duration::from_millis(500), Duration::from_millis(10));
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(500));
    }

    #[test]
    fn test_invalid_factor_rejected() {
        let result = RetryPolicy::new(
            3,
            Backoff::Exponential {
                initial: Duration::from_millis(100),
                factor: 0.5,
                max: Duration::from_secs(1),
            },
        );
        assert!(matches!(result, Err(ResilienceError::InvalidPolicy(_))));

        let result = RetryPolicy::new(
            3,
            Backoff::Exponential {
                initial: Duration::from_millis(100),
                factor: f64::NAN,
                max: Duration::from_secs(1),
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_initial_above_max_rejected() {
        let result = RetryPolicy::new(
            3,
            Backoff::Exponential {
                initial: Duration::from_secs(10),
                factor: 2.0,
                max: Duration::from_secs(1),
            },
        );
        assert!(result.is_err());
    }
}
