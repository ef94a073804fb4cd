//! Jitter applied on top of a computed backoff delay.
//!
//! - `None`: exact delay, the default.
//! - `Full`: uniform in `[0, delay]`.
//! - `Equal`: uniform in `[delay/2, delay]`.

use rand::{rng, Rng};
use std::time::Duration;

/// Jitter strategy for randomizing retry delays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Jitter {
    #[default]
    None,
    Full,
    Equal,
}

impl Jitter {
    pub fn full() -> Self {
        Jitter::Full
    }

    pub fn equal() -> Self {
        Jitter::Equal
    }

    /// Randomize `delay` with the thread-local RNG.
    pub fn apply(&self, delay: Duration) -> Duration {
        self.apply_with_rng(delay, &mut rng())
    }

    /// Randomize `delay` with a caller-supplied RNG.
    pub fn apply_with_rng<R: Rng>(&self, delay: Duration, rng: &mut R) -> Duration {
        let millis: u64 = delay.as_millis().try_into().unwrap_or(u64::MAX);
        match self {
            Jitter::None => delay,
            _ if millis == 0 => Duration::ZERO,
            Jitter::Full => Duration::from_millis(rng.random_range(0..=millis)),
            Jitter::Equal => Duration::from_millis(rng.random_range(millis / 2..=millis)),
        }
    }
}
