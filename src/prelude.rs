//! Convenient re-exports for common types.
pub use crate::{
    backoff::{Backoff, BackoffError, DEFAULT_BACKOFF_DELAY, MAX_BACKOFF},
    budget::{AttemptBudget, BudgetState, MaxAttemptsMode},
    classify::{classify_capabilities, Classification, RetryCapabilities},
    context::Context,
    error::{BuildError, ContextError, MAX_ATTEMPT_TIMEOUT},
    http::{HttpError, HttpRetrier, HttpRetrierBuilder, StatusCodeError},
    jitter::Jitter,
    layer::RetryLayer,
    retry::{RetryOutcome, RetryPolicy, RetryPolicyBuilder, Termination, DEFAULT_MAX_ATTEMPTS},
};
