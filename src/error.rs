//! Error types shared by the retry engine and its builders.
use std::time::Duration;

use crate::classify::RetryCapabilities;

/// Upper bound accepted for a per-attempt timeout (1 day).
pub const MAX_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Why a [`Context`](crate::Context) stopped.
///
/// Engine error types implement `From<ContextError>` so cancellation surfaces as the caller's own
/// error without an extra wrapper layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum ContextError {
    /// The context, or one of its ancestors, was cancelled explicitly.
    #[error("context cancelled")]
    Cancelled,
    /// The context deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

impl ContextError {
    /// Check if this is an explicit cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Check if this is a deadline expiry.
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, Self::DeadlineExceeded)
    }
}

impl RetryCapabilities for ContextError {
    fn is_retryable(&self) -> Option<bool> {
        match self {
            Self::Cancelled => Some(false),
            Self::DeadlineExceeded => None,
        }
    }

    fn is_timeout(&self) -> Option<bool> {
        Some(self.is_deadline_exceeded())
    }
}

/// Errors produced while building a retry policy or HTTP retrier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    /// The per-attempt timeout is larger than [`MAX_ATTEMPT_TIMEOUT`].
    #[error("per-attempt timeout must be <= {max:?} (got {got:?})")]
    AttemptTimeoutTooLarge { got: Duration, max: Duration },
    /// The HTTP body byte ceiling must be > 0.
    #[error("max_bytes must be > 0")]
    ZeroMaxBytes,
}
