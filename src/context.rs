//! Cancellation and deadline propagation.
//!
//! A [`Context`] carries a cancellation token and an optional deadline. Children derived with
//! [`Context::child`] or [`Context::with_timeout`] are cancelled when their parent is, never the
//! other way round, and inherit the earlier of the two deadlines.
//!
//! ```rust
//! use std::time::Duration;
//! use persevere::{Context, ContextError};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let parent = Context::background();
//! let attempt = parent.with_timeout(Duration::from_secs(5));
//! parent.cancel();
//! assert_eq!(attempt.err(), Some(ContextError::Cancelled));
//! # });
//! ```

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::ContextError;

/// Cancellation signal plus optional deadline, passed to every attempt.
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A root context that is never cancelled unless [`cancel`](Self::cancel) is called.
    pub fn background() -> Self {
        Self::default()
    }

    /// Child context sharing this context's deadline and cancelled along with it.
    pub fn child(&self) -> Self {
        Self { token: self.token.child_token(), deadline: self.deadline }
    }

    /// Child context whose deadline is `timeout` from now, or the parent's if that is sooner.
    ///
    /// A timeout too large to represent as an instant adds no deadline of its own.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self.child(),
        }
    }

    /// Child context with an absolute deadline, clamped to the parent's deadline.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(parent) => parent.min(deadline),
            None => deadline,
        };
        Self { token: self.token.child_token(), deadline: Some(deadline) }
    }

    /// Cancel this context and every context derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Underlying token, for integration with code that already speaks `tokio_util`.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Why the context is done, or `None` while it is still live.
    ///
    /// Explicit cancellation takes precedence over an expired deadline.
    pub fn err(&self) -> Option<ContextError> {
        if self.token.is_cancelled() {
            return Some(ContextError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Check if the context is already done.
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Resolve once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> ContextError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                _ = self.token.cancelled() => ContextError::Cancelled,
                _ = tokio::time::sleep_until(deadline) => ContextError::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                ContextError::Cancelled
            }
        }
    }
}

impl From<CancellationToken> for Context {
    fn from(token: CancellationToken) -> Self {
        Self { token, deadline: None }
    }
}
