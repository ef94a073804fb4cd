//! Delay computation between attempts.
//!
//! `attempt` is the number of attempts executed so far, so the delay after the first failure is
//! `delay(1)`. `delay(0)` is always zero. Computations that would overflow saturate at
//! [`MAX_BACKOFF`].
//!
//! ```rust
//! use std::time::Duration;
//! use persevere::Backoff;
//!
//! let backoff = Backoff::exponential(Duration::from_millis(100))
//!     .with_max(Duration::from_secs(1))
//!     .unwrap();
//! assert_eq!(backoff.delay(1), Duration::from_millis(100));
//! assert_eq!(backoff.delay(3), Duration::from_millis(400));
//! assert_eq!(backoff.delay(8), Duration::from_secs(1));
//! ```

use std::time::Duration;

/// Saturation point for computed delays (1 day).
pub const MAX_BACKOFF: Duration = Duration::from_secs(24 * 60 * 60);

/// Delay used by [`Backoff::default`].
pub const DEFAULT_BACKOFF_DELAY: Duration = Duration::from_millis(200);

/// Errors returned by backoff configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackoffError {
    #[error("with_max is only valid for linear or exponential backoff")]
    ConstantDoesNotSupportMax,
    #[error("max must be greater than zero")]
    MaxMustBePositive,
    #[error("max ({max:?}) must be >= base ({base:?})")]
    MaxLessThanBase { base: Duration, max: Duration },
}

/// Backoff strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every retry.
    Constant(Duration),
    /// `base * attempt`, optionally capped.
    Linear { base: Duration, max: Option<Duration> },
    /// `base * 2^(attempt - 1)`, optionally capped.
    Exponential { base: Duration, max: Option<Duration> },
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Constant(DEFAULT_BACKOFF_DELAY)
    }
}

impl Backoff {
    pub fn constant(delay: Duration) -> Self {
        Backoff::Constant(delay)
    }

    pub fn linear(base: Duration) -> Self {
        Backoff::Linear { base, max: None }
    }

    pub fn exponential(base: Duration) -> Self {
        Backoff::Exponential { base, max: None }
    }

    /// Cap a linear or exponential backoff.
    pub fn with_max(self, max: Duration) -> Result<Self, BackoffError> {
        if max.is_zero() {
            return Err(BackoffError::MaxMustBePositive);
        }
        match self {
            Backoff::Constant(_) => Err(BackoffError::ConstantDoesNotSupportMax),
            Backoff::Linear { base, .. } | Backoff::Exponential { base, .. } if max < base => {
                Err(BackoffError::MaxLessThanBase { base, max })
            }
            Backoff::Linear { base, .. } => Ok(Backoff::Linear { base, max: Some(max) }),
            Backoff::Exponential { base, .. } => Ok(Backoff::Exponential { base, max: Some(max) }),
        }
    }

    /// Delay before the next attempt, given how many attempts already ran.
    pub fn delay(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let (raw, max) = match *self {
            Backoff::Constant(delay) => (delay, None),
            Backoff::Linear { base, max } => {
                let factor = attempt.min(u32::MAX as usize) as u32;
                (base.checked_mul(factor).unwrap_or(MAX_BACKOFF), max)
            }
            Backoff::Exponential { base, max } => {
                let exponent = (attempt - 1).min(u32::MAX as usize) as u32;
                let nanos = base.as_nanos().saturating_mul(2u128.saturating_pow(exponent));
                (Duration::from_nanos(nanos.min(MAX_BACKOFF.as_nanos()) as u64), max)
            }
        };
        max.map_or(raw, |m| raw.min(m)).min(MAX_BACKOFF)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_constant_200ms() {
        let backoff = Backoff::default();
        assert_eq!(backoff.delay(1), Duration::from_millis(200));
        assert_eq!(backoff.delay(7), Duration::from_millis(200));
    }

    #[test]
    fn zero_attempt_has_no_delay() {
        assert_eq!(Backoff::constant(Duration::from_secs(1)).delay(0), Duration::ZERO);
        assert_eq!(Backoff::linear(Duration::from_secs(1)).delay(0), Duration::ZERO);
        assert_eq!(Backoff::exponential(Duration::from_secs(1)).delay(0), Duration::ZERO);
    }

    #[test]
    fn linear_grows_and_caps() {
        let backoff =
            Backoff::linear(Duration::from_secs(10)).with_max(Duration::from_secs(25)).unwrap();
        assert_eq!(backoff.delay(1), Duration::from_secs(10));
        assert_eq!(backoff.delay(2), Duration::from_secs(20));
        assert_eq!(backoff.delay(3), Duration::from_secs(25));
    }

    #[test]
    fn exponential_doubles() {
        let backoff = Backoff::exponential(Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(200));
        assert_eq!(backoff.delay(5), Duration::from_millis(1600));
    }

    #[test]
    fn overflow_saturates() {
        assert_eq!(Backoff::exponential(Duration::from_secs(1)).delay(1_000_000_000), MAX_BACKOFF);
        assert_eq!(Backoff::linear(Duration::from_secs(u64::MAX / 2)).delay(1_000), MAX_BACKOFF);
    }

    #[test]
    fn invalid_caps_rejected() {
        assert_eq!(
            Backoff::constant(Duration::from_secs(1)).with_max(Duration::from_secs(2)),
            Err(BackoffError::ConstantDoesNotSupportMax)
        );
        assert_eq!(
            Backoff::linear(Duration::from_secs(1)).with_max(Duration::ZERO),
            Err(BackoffError::MaxMustBePositive)
        );
        assert!(matches!(
            Backoff::exponential(Duration::from_secs(5)).with_max(Duration::from_secs(1)),
            Err(BackoffError::MaxLessThanBase { .. })
        ));
    }
}
