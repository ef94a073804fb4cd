#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # Persevere
//!
//! Policy-driven retries for async Rust: attempt budgets with configurable counting modes,
//! per-attempt deadlines, cooperative cancellation, pluggable classification and backoff, and an
//! HTTP adapter that drains bodies for connection reuse.
//!
//! ## Features
//!
//! - **Attempt budgets** counting all failures, only non-retryable failures, or streaks of
//!   consecutive non-retryable failures
//! - **Early return** for errors that will never succeed on retry
//! - **Backoff strategies** (constant, linear, exponential) with optional jitter and error-derived
//!   delay hints
//! - **Cancellation** via [`Context`]: deadlines and explicit cancel, honoured mid-attempt and
//!   mid-backoff
//! - **HTTP** retries with status-code classification, `Retry-After`, and typed decoding
//! - **Tower** layer for any service with cloneable requests
//!
//! ## Quick Start
//!
//! ```rust
//! use persevere::{Context, ContextError, MaxAttemptsMode, RetryPolicy};
//!
//! #[derive(Debug)]
//! enum FetchError { Busy, Ctx(ContextError) }
//! impl From<ContextError> for FetchError { fn from(e: ContextError) -> Self { FetchError::Ctx(e) } }
//!
//! #[tokio::main]
//! async fn main() {
//!     let policy = RetryPolicy::<FetchError>::builder()
//!         .max_attempts(3)
//!         .mode(MaxAttemptsMode::AllErrors)
//!         .should_retry(|e| matches!(e, FetchError::Busy))
//!         .build()
//!         .unwrap();
//!
//!     let value = policy
//!         .execute(&Context::background(), |_ctx| async { Ok::<_, FetchError>(42) })
//!         .await;
//!     assert_eq!(value.unwrap(), 42);
//! }
//! ```

pub mod backoff;
pub mod budget;
pub mod classify;
pub mod context;
pub mod error;
pub mod http;
pub mod jitter;
pub mod layer;
pub mod prelude;
pub mod retry;
pub mod sleeper;

// Re-exports
pub use backoff::{Backoff, BackoffError};
pub use budget::{AttemptBudget, BudgetState, MaxAttemptsMode};
pub use classify::{Classification, RetryCapabilities};
pub use context::Context;
pub use error::{BuildError, ContextError};
pub use jitter::Jitter;
pub use layer::{RetryLayer, RetryService};
pub use retry::{RetryOutcome, RetryPolicy, RetryPolicyBuilder, Termination};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
