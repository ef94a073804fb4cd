//! Retry engine.
//!
//! [`RetryPolicy::execute`] repeatedly invokes a fallible async operation until it succeeds, the
//! attempt budget is exhausted, an early-return predicate fires, or the [`Context`] is done.
//!
//! Per attempt:
//! 1. A context that is already done ends the loop with its [`ContextError`]; the operation is
//!    not called.
//! 2. With a per-attempt timeout the operation receives a child context carrying that deadline,
//!    otherwise the caller's context.
//! 3. Success is returned as is.
//! 4. On failure, a done parent context ends the loop with its `ContextError`.
//! 5. The early-return predicate, if configured, can stop the loop with the error.
//! 6. The classifier verdict is recorded in the [`AttemptBudget`]; exhaustion returns the error.
//! 7. Otherwise the engine waits out the backoff delay, racing it against the context, and loops.
//!
//! Attempts run strictly one after another. Errors are returned exactly as the operation produced
//! them; cancellation becomes `E::from(ContextError)`.
//!
//! ```rust
//! use std::time::Duration;
//! use persevere::{Backoff, Context, ContextError, MaxAttemptsMode, RetryPolicy};
//!
//! #[derive(Debug)]
//! enum MyErr { Flaky, Ctx(ContextError) }
//! impl From<ContextError> for MyErr { fn from(e: ContextError) -> Self { MyErr::Ctx(e) } }
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let policy = RetryPolicy::<MyErr>::builder()
//!     .max_attempts(3)
//!     .mode(MaxAttemptsMode::AllErrors)
//!     .backoff(Backoff::constant(Duration::from_millis(1)))
//!     .should_retry(|e| matches!(e, MyErr::Flaky))
//!     .build()
//!     .unwrap();
//! let result: Result<(), MyErr> =
//!     policy.execute(&Context::background(), |_ctx| async { Err(MyErr::Flaky) }).await;
//! assert!(matches!(result, Err(MyErr::Flaky)));
//! # });
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::backoff::MAX_BACKOFF;
use crate::budget::{AttemptBudget, BudgetState, MaxAttemptsMode};
use crate::classify::{classify_capabilities, Classification, RetryCapabilities};
use crate::error::{BuildError, MAX_ATTEMPT_TIMEOUT};
use crate::{Backoff, Context, ContextError, Jitter, Sleeper, TokioSleeper};

/// Attempts allowed by a default-built policy.
pub const DEFAULT_MAX_ATTEMPTS: usize = 5;

type ClassifyFn<E> = Arc<dyn Fn(&Context, &E) -> Classification + Send + Sync>;
type EarlyReturnFn<E> = Arc<dyn Fn(&Context, &E) -> bool + Send + Sync>;
type DelayHintFn<E> = Arc<dyn Fn(usize, &E) -> Option<Duration> + Send + Sync>;

/// Why a retry loop ended without success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The budget ran out on a retryable failure.
    Exhausted,
    /// The budget ran out on a non-retryable failure.
    NonRetryable,
    /// The early-return predicate stopped the loop.
    EarlyReturn,
    /// The caller's context was cancelled or hit its deadline.
    Cancelled,
}

/// Result of a retry loop, with bookkeeping.
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    Success { value: T, attempts: usize },
    Failure { error: E, attempts: usize, termination: Termination },
}

impl<T, E> RetryOutcome<T, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Number of times the operation was invoked.
    pub fn attempts(&self) -> usize {
        match self {
            Self::Success { attempts, .. } | Self::Failure { attempts, .. } => *attempts,
        }
    }

    pub fn termination(&self) -> Option<Termination> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { termination, .. } => Some(*termination),
        }
    }

    pub fn into_result(self) -> Result<T, E> {
        match self {
            Self::Success { value, .. } => Ok(value),
            Self::Failure { error, .. } => Err(error),
        }
    }
}

/// Immutable retry configuration. Cheap to clone and safe to share between concurrent calls.
pub struct RetryPolicy<E> {
    max_attempts: usize,
    mode: MaxAttemptsMode,
    attempt_timeout: Option<Duration>,
    backoff: Backoff,
    jitter: Jitter,
    classifier: ClassifyFn<E>,
    early_return: Option<EarlyReturnFn<E>>,
    delay_hint: Option<DelayHintFn<E>>,
    sleeper: Arc<dyn Sleeper>,
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            max_attempts: self.max_attempts,
            mode: self.mode,
            attempt_timeout: self.attempt_timeout,
            backoff: self.backoff,
            jitter: self.jitter,
            classifier: self.classifier.clone(),
            early_return: self.early_return.clone(),
            delay_hint: self.delay_hint.clone(),
            sleeper: self.sleeper.clone(),
        }
    }
}

impl<E> std::fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("mode", &self.mode)
            .field("attempt_timeout", &self.attempt_timeout)
            .field("backoff", &self.backoff)
            .field("jitter", &self.jitter)
            .field("early_return", &self.early_return.is_some())
            .field("delay_hint", &self.delay_hint.is_some())
            .field("sleeper", &self.sleeper)
            .finish()
    }
}

impl<E: 'static> RetryPolicy<E> {
    pub fn builder() -> RetryPolicyBuilder<E> {
        RetryPolicyBuilder::new()
    }

    /// Builder seeded with this policy's settings, for per-call-site overrides.
    pub fn to_builder(&self) -> RetryPolicyBuilder<E> {
        RetryPolicyBuilder {
            max_attempts: self.max_attempts,
            mode: self.mode,
            attempt_timeout: self.attempt_timeout.unwrap_or(Duration::ZERO),
            backoff: self.backoff,
            jitter: self.jitter,
            classifier: self.classifier.clone(),
            early_return: self.early_return.clone(),
            delay_hint: self.delay_hint.clone(),
            sleeper: self.sleeper.clone(),
        }
    }
}

impl<E> RetryPolicy<E> {
    /// `0` means unlimited.
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn mode(&self) -> MaxAttemptsMode {
        self.mode
    }

    pub fn per_attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout
    }

    /// Run the configured classifier.
    pub fn classify(&self, ctx: &Context, err: &E) -> Classification {
        (self.classifier)(ctx, err)
    }

    /// Delay to wait after `attempts` attempts ended with `err`.
    pub fn delay_for(&self, attempts: usize, err: &E) -> Duration {
        if let Some(hint) = self.delay_hint.as_ref().and_then(|hint| hint(attempts, err)) {
            if !hint.is_zero() {
                return hint.min(MAX_BACKOFF);
            }
        }
        self.jitter.apply(self.backoff.delay(attempts))
    }
}

impl<E> RetryPolicy<E>
where
    E: From<ContextError>,
{
    /// Run `operation` under this policy and return its value or the terminal error.
    pub async fn execute<T, Fut, Op>(&self, ctx: &Context, operation: Op) -> Result<T, E>
    where
        Op: FnMut(Context) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_outcome(ctx, operation).await.into_result()
    }

    /// Like [`execute`](Self::execute), reporting attempt count and why the loop stopped.
    pub async fn execute_outcome<T, Fut, Op>(
        &self,
        ctx: &Context,
        mut operation: Op,
    ) -> RetryOutcome<T, E>
    where
        Op: FnMut(Context) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut budget = AttemptBudget::new();
        let mut attempts = 0usize;

        loop {
            if let Some(reason) = ctx.err() {
                tracing::debug!(attempts, %reason, "context done before attempt");
                return cancelled(reason, attempts);
            }

            let result = self.attempt(ctx, &mut operation).await;
            attempts += 1;

            let error = match result {
                Ok(value) => return RetryOutcome::Success { value, attempts },
                Err(error) => error,
            };

            if let Some(reason) = ctx.err() {
                tracing::debug!(attempts, %reason, "context done during attempt");
                return cancelled(reason, attempts);
            }

            if let Some(early_return) = &self.early_return {
                if early_return(ctx, &error) {
                    tracing::debug!(attempts, "early return");
                    return RetryOutcome::Failure {
                        error,
                        attempts,
                        termination: Termination::EarlyReturn,
                    };
                }
            }

            let classification = (self.classifier)(ctx, &error);
            let (next, state) =
                budget.record(self.mode, self.max_attempts, classification.is_retryable());
            budget = next;

            if state == BudgetState::Exhausted {
                tracing::warn!(
                    attempts,
                    max_attempts = self.max_attempts,
                    reason = %classification,
                    "retry budget exhausted"
                );
                let termination = if classification.is_retryable() {
                    Termination::Exhausted
                } else {
                    Termination::NonRetryable
                };
                return RetryOutcome::Failure { error, attempts, termination };
            }

            let delay = self.delay_for(attempts, &error);
            tracing::debug!(attempt = attempts, reason = %classification, ?delay, "retrying");

            tokio::select! {
                biased;
                reason = ctx.done() => {
                    tracing::debug!(attempts, %reason, "context done during backoff");
                    return cancelled(reason, attempts);
                }
                _ = self.sleeper.sleep(delay) => {}
            }
        }
    }

    async fn attempt<T, Fut, Op>(&self, ctx: &Context, operation: &mut Op) -> Result<T, E>
    where
        Op: FnMut(Context) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let attempt_ctx = match self.attempt_timeout {
            Some(timeout) => ctx.with_timeout(timeout),
            None => ctx.clone(),
        };
        let result = tokio::select! {
            biased;
            result = operation(attempt_ctx.clone()) => result,
            reason = attempt_ctx.done() => Err(E::from(reason)),
        };
        if self.attempt_timeout.is_some() {
            // release the child token
            attempt_ctx.cancel();
        }
        result
    }
}

fn cancelled<T, E>(reason: ContextError, attempts: usize) -> RetryOutcome<T, E>
where
    E: From<ContextError>,
{
    RetryOutcome::Failure { error: E::from(reason), attempts, termination: Termination::Cancelled }
}

/// Builder for [`RetryPolicy`].
pub struct RetryPolicyBuilder<E> {
    max_attempts: usize,
    mode: MaxAttemptsMode,
    attempt_timeout: Duration,
    backoff: Backoff,
    jitter: Jitter,
    classifier: ClassifyFn<E>,
    early_return: Option<EarlyReturnFn<E>>,
    delay_hint: Option<DelayHintFn<E>>,
    sleeper: Arc<dyn Sleeper>,
}

impl<E: 'static> RetryPolicyBuilder<E> {
    /// Five attempts, reset mode, constant 200ms backoff, no jitter, no per-attempt timeout, and
    /// a classifier that calls every error non-retryable.
    pub fn new() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            mode: MaxAttemptsMode::default(),
            attempt_timeout: Duration::ZERO,
            backoff: Backoff::default(),
            jitter: Jitter::None,
            classifier: Arc::new(|_: &Context, _: &E| {
                Classification::permanent("unclassified")
            }),
            early_return: None,
            delay_hint: None,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Attempt limit interpreted according to the mode. `0` means unlimited.
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn mode(mut self, mode: MaxAttemptsMode) -> Self {
        self.mode = mode;
        self
    }

    /// Deadline applied to each attempt individually. `Duration::ZERO` disables it.
    pub fn per_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// Full classifier with access to the context and a reason string.
    pub fn classify<F>(mut self, classifier: F) -> Self
    where
        F: Fn(&Context, &E) -> Classification + Send + Sync + 'static,
    {
        self.classifier = Arc::new(classifier);
        self
    }

    /// Boolean shorthand for [`classify`](Self::classify).
    pub fn should_retry<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.classifier =
            Arc::new(move |_: &Context, err: &E| Classification::from(predicate(err)));
        self
    }

    /// Stop immediately, regardless of remaining budget, when `predicate` returns true.
    pub fn early_return<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Context, &E) -> bool + Send + Sync + 'static,
    {
        self.early_return = Some(Arc::new(predicate));
        self
    }

    /// Error-derived delay. A positive hint replaces the backoff delay for that retry; `None` or
    /// zero falls back to the backoff strategy.
    pub fn delay_hint<F>(mut self, hint: F) -> Self
    where
        F: Fn(usize, &E) -> Option<Duration> + Send + Sync + 'static,
    {
        self.delay_hint = Some(Arc::new(hint));
        self
    }

    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn build(self) -> Result<RetryPolicy<E>, BuildError> {
        if self.attempt_timeout > MAX_ATTEMPT_TIMEOUT {
            return Err(BuildError::AttemptTimeoutTooLarge {
                got: self.attempt_timeout,
                max: MAX_ATTEMPT_TIMEOUT,
            });
        }
        Ok(RetryPolicy {
            max_attempts: self.max_attempts,
            mode: self.mode,
            attempt_timeout: (!self.attempt_timeout.is_zero()).then_some(self.attempt_timeout),
            backoff: self.backoff,
            jitter: self.jitter,
            classifier: self.classifier,
            early_return: self.early_return,
            delay_hint: self.delay_hint,
            sleeper: self.sleeper,
        })
    }
}

impl<E> RetryPolicyBuilder<E>
where
    E: RetryCapabilities + 'static,
{
    /// Classify through the error's [`RetryCapabilities`]; errors with no opinion are permanent.
    pub fn classify_by_capabilities(self) -> Self {
        self.classify(|_, err: &E| {
            classify_capabilities(err)
                .unwrap_or_else(|| Classification::permanent("no retry capability"))
        })
    }
}

impl<E: 'static> Default for RetryPolicyBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}
