//! Attempt budget tracking.
//!
//! The budget is a counter plus a [`MaxAttemptsMode`] deciding which attempts count against it.
//! [`AttemptBudget::record`] is a pure transition: it takes the current state and the
//! classification of the attempt that just failed, and returns the next state together with a
//! [`BudgetState`] verdict.
//!
//! | mode | retryable failure | non-retryable failure |
//! |---|---|---|
//! | `AllErrors` | +1 | +1 |
//! | `NonRetryableOnly` | unchanged | +1 |
//! | `NonRetryableWithReset` | reset to 0 | +1 |
//!
//! The budget is exhausted once the counter reaches `max_attempts`. A limit of `0` never
//! exhausts.

/// Which failed attempts count against `max_attempts`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum MaxAttemptsMode {
    /// Every failed attempt counts.
    AllErrors,
    /// Only non-retryable failures count; retryable ones are free.
    NonRetryableOnly,
    /// Only a streak of consecutive non-retryable failures counts; a retryable failure resets it.
    #[default]
    NonRetryableWithReset,
}

/// Verdict after recording an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetState {
    Continue,
    Exhausted,
}

/// Counter state for one `execute` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttemptBudget {
    counted: usize,
}

impl AttemptBudget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts currently counted against the limit.
    pub fn counted(&self) -> usize {
        self.counted
    }

    /// Record a failed attempt and decide whether another one is allowed.
    pub fn record(
        self,
        mode: MaxAttemptsMode,
        max_attempts: usize,
        retryable: bool,
    ) -> (Self, BudgetState) {
        let counted = match (mode, retryable) {
            (MaxAttemptsMode::AllErrors, _) | (_, false) => self.counted.saturating_add(1),
            (MaxAttemptsMode::NonRetryableOnly, true) => self.counted,
            (MaxAttemptsMode::NonRetryableWithReset, true) => 0,
        };
        let state = if max_attempts != 0 && counted >= max_attempts {
            BudgetState::Exhausted
        } else {
            BudgetState::Continue
        };
        (Self { counted }, state)
    }
}
