//! # Backoff policy for retried store and transport calls.
//!
//! [`BackoffPolicy`] computes the pause before retry attempt `n` (0-indexed):
//!
//! | growth                      | base delay              |
//! |-----------------------------|-------------------------|
//! | [`Growth::Constant`]        | `first`                 |
//! | [`Growth::Linear`]          | `first × (n + 1)`       |
//! | [`Growth::Exponential`]     | `first × factor^n`      |
//!
//! The base is clamped to `max`, then jitter is applied. The base is derived from
//! the attempt number alone, so jitter never feeds back into later delays.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use faultvisor::{BackoffPolicy, Growth, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_secs(1),
//!     max: Duration::from_secs(5),
//!     growth: Growth::Linear,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.next(0), Duration::from_secs(1));
//! assert_eq!(backoff.next(2), Duration::from_secs(3));
//! assert_eq!(backoff.next(9), Duration::from_secs(5));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// How the base delay grows with the attempt number.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Growth {
    /// Same delay for every attempt.
    Constant,
    /// Delay grows by `first` per attempt.
    Linear,
    /// Delay multiplies by `factor` per attempt.
    Exponential {
        /// Multiplicative growth factor (`>= 1.0` recommended).
        factor: f64,
    },
}

/// Retry backoff policy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub first: Duration,
    /// Upper bound for any single delay.
    pub max: Duration,
    /// Growth curve.
    pub growth: Growth,
    /// Randomization applied on top of the clamped base.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Linear growth from 1s, capped at 10s, no jitter.
    fn default() -> Self {
        Self {
            first: Duration::from_secs(1),
            max: Duration::from_secs(10),
            growth: Growth::Linear,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// Zero delay between attempts.
    pub fn immediate() -> Self {
        Self {
            first: Duration::ZERO,
            max: Duration::ZERO,
            growth: Growth::Constant,
            jitter: JitterPolicy::None,
        }
    }

    /// Computes the delay for the given attempt number (0-indexed).
    pub fn next(&self, attempt: u32) -> Duration {
        let first = self.first.as_secs_f64();
        let unclamped = match self.growth {
            Growth::Constant => first,
            Growth::Linear => first * (f64::from(attempt) + 1.0),
            Growth::Exponential { factor } => {
                let exp = attempt.min(i32::MAX as u32) as i32;
                first * factor.powi(exp)
            }
        };

        let base = if !unclamped.is_finite()
            || unclamped < 0.0
            || unclamped > self.max.as_secs_f64()
        {
            self.max
        } else {
            Duration::from_secs_f64(unclamped)
        };
        self.jitter.apply(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(growth: Growth) -> BackoffPolicy {
        BackoffPolicy {
            first: Duration::from_millis(100),
            max: Duration::from_secs(30),
            growth,
            jitter: JitterPolicy::None,
        }
    }

    #[test]
    fn test_attempt_zero_returns_first() {
        for growth in [
            Growth::Constant,
            Growth::Linear,
            Growth::Exponential { factor: 2.0 },
        ] {
            assert_eq!(policy(growth).next(0), Duration::from_millis(100));
        }
    }

    #[test]
    fn test_linear_growth() {
        let p = policy(Growth::Linear);
        assert_eq!(p.next(1), Duration::from_millis(200));
        assert_eq!(p.next(4), Duration::from_millis(500));
    }

    #[test]
    fn test_exponential_growth() {
        let p = policy(Growth::Exponential { factor: 2.0 });
        assert_eq!(p.next(1), Duration::from_millis(200));
        assert_eq!(p.next(3), Duration::from_millis(800));
    }

    #[test]
    fn test_constant_growth() {
        let p = policy(Growth::Constant);
        for attempt in 0..10 {
            assert_eq!(p.next(attempt), Duration::from_millis(100));
        }
    }

    #[test]
    fn test_overflow_clamps_to_max() {
        let p = BackoffPolicy {
            max: Duration::from_secs(10),
            ..policy(Growth::Exponential { factor: 2.0 })
        };
        assert_eq!(p.next(u32::MAX), Duration::from_secs(10));
        assert_eq!(policy(Growth::Linear).next(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_immediate_is_zero() {
        let p = BackoffPolicy::immediate();
        assert_eq!(p.next(0), Duration::ZERO);
        assert_eq!(p.next(7), Duration::ZERO);
    }

    #[test]
    fn test_equal_jitter_stays_within_half_and_base() {
        let p = BackoffPolicy {
            jitter: JitterPolicy::Equal,
            ..policy(Growth::Linear)
        };
        for attempt in 0..20 {
            let base = p.first * (attempt + 1);
            let delay = p.next(attempt);
            assert!(delay >= base / 2, "attempt {attempt}: {delay:?}");
            assert!(delay <= base, "attempt {attempt}: {delay:?}");
        }
    }
}
