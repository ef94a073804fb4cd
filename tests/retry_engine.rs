//! End-to-end behavior of the retry engine through the public API.
use persevere::prelude::*;
use persevere::{InstantSleeper, TrackingSleeper};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
enum JobError {
    #[error("busy")]
    Busy,
    #[error("rejected")]
    Rejected,
    #[error(transparent)]
    Context(#[from] ContextError),
}

fn retry_busy(err: &JobError) -> bool {
    matches!(err, JobError::Busy)
}

#[tokio::test(start_paused = true)]
async fn default_backoff_waits_between_attempts() {
    let policy = RetryPolicy::<JobError>::builder()
        .max_attempts(3)
        .mode(MaxAttemptsMode::AllErrors)
        .should_retry(retry_busy)
        .build()
        .unwrap();
    let calls = AtomicUsize::new(0);
    let start = Instant::now();

    let result: Result<(), _> = policy
        .execute(&Context::background(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(JobError::Busy) }
        })
        .await;

    assert_eq!(result, Err(JobError::Busy));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(400), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(600), "elapsed {elapsed:?}");
}

#[tokio::test]
async fn reset_mode_only_exhausts_on_consecutive_permanent_failures() {
    // The streak [rejected, rejected] exhausts a budget of two.
    let policy = RetryPolicy::<JobError>::builder()
        .max_attempts(2)
        .should_retry(retry_busy)
        .with_sleeper(InstantSleeper)
        .build()
        .unwrap();

    let outcome = policy
        .execute_outcome(&Context::background(), |_| async { Err::<(), _>(JobError::Rejected) })
        .await;
    assert_eq!(outcome.attempts(), 2);
    assert_eq!(outcome.termination(), Some(Termination::NonRetryable));

    // Interleaved busy failures keep resetting the streak.
    let script = Mutex::new(
        vec![
            JobError::Rejected,
            JobError::Busy,
            JobError::Rejected,
            JobError::Busy,
            JobError::Rejected,
            JobError::Rejected,
        ]
        .into_iter(),
    );
    let outcome = policy
        .execute_outcome(&Context::background(), |_| {
            let err = script.lock().unwrap().next().unwrap();
            async move { Err::<(), _>(err) }
        })
        .await;
    assert_eq!(outcome.attempts(), 6);
    assert_eq!(outcome.into_result().unwrap_err(), JobError::Rejected);
}

#[tokio::test]
async fn non_retryable_only_ignores_retryable_failures() {
    let script = Mutex::new(
        vec![JobError::Busy, JobError::Rejected, JobError::Busy, JobError::Busy, JobError::Rejected]
            .into_iter(),
    );
    let policy = RetryPolicy::<JobError>::builder()
        .max_attempts(2)
        .mode(MaxAttemptsMode::NonRetryableOnly)
        .should_retry(retry_busy)
        .with_sleeper(InstantSleeper)
        .build()
        .unwrap();

    let outcome = policy
        .execute_outcome(&Context::background(), |_| {
            let err = script.lock().unwrap().next().unwrap();
            async move { Err::<(), _>(err) }
        })
        .await;
    assert_eq!(outcome.attempts(), 5);
    assert_eq!(outcome.termination(), Some(Termination::NonRetryable));
}

#[tokio::test]
async fn early_return_wins_over_remaining_budget() {
    let policy = RetryPolicy::<JobError>::builder()
        .max_attempts(10)
        .mode(MaxAttemptsMode::AllErrors)
        .should_retry(|_| true)
        .early_return(|_, err| matches!(err, JobError::Rejected))
        .with_sleeper(InstantSleeper)
        .build()
        .unwrap();
    let calls = AtomicUsize::new(0);

    let outcome = policy
        .execute_outcome(&Context::background(), |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err::<(), _>(JobError::Busy)
                } else {
                    Err(JobError::Rejected)
                }
            }
        })
        .await;

    assert_eq!(outcome.attempts(), 2);
    assert_eq!(outcome.termination(), Some(Termination::EarlyReturn));
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_backoff() {
    let policy = RetryPolicy::<JobError>::builder()
        .max_attempts(0)
        .backoff(Backoff::constant(Duration::from_secs(3600)))
        .should_retry(retry_busy)
        .build()
        .unwrap();
    let ctx = Context::background();
    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });
    let start = Instant::now();

    let outcome = policy
        .execute_outcome(&ctx, |_| async { Err::<(), _>(JobError::Busy) })
        .await;

    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(outcome.attempts(), 1);
    assert_eq!(outcome.termination(), Some(Termination::Cancelled));
    assert_eq!(outcome.into_result().unwrap_err(), JobError::Context(ContextError::Cancelled));
}

#[tokio::test(start_paused = true)]
async fn cancellation_aborts_hung_attempt() {
    let policy = RetryPolicy::<JobError>::builder()
        .max_attempts(0)
        .should_retry(|_| true)
        .build()
        .unwrap();
    let ctx = Context::background();
    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });
    let start = Instant::now();

    let outcome = policy
        .execute_outcome(&ctx, |_| futures::future::pending::<Result<(), JobError>>())
        .await;

    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(outcome.attempts(), 1);
    assert_eq!(outcome.termination(), Some(Termination::Cancelled));
    assert_eq!(outcome.into_result().unwrap_err(), JobError::Context(ContextError::Cancelled));
}

#[tokio::test(start_paused = true)]
async fn per_attempt_timeout_cuts_off_hung_attempt() {
    let policy = RetryPolicy::<JobError>::builder()
        .max_attempts(3)
        .mode(MaxAttemptsMode::AllErrors)
        .per_attempt_timeout(Duration::from_millis(10))
        .should_retry(|err| matches!(err, JobError::Context(ContextError::DeadlineExceeded)))
        .build()
        .unwrap();
    let calls = AtomicUsize::new(0);
    let start = Instant::now();

    let outcome = policy
        .execute_outcome(&Context::background(), |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    futures::future::pending::<()>().await;
                }
                Ok::<_, JobError>(n)
            }
        })
        .await;

    assert_eq!(outcome.attempts(), 2);
    assert_eq!(outcome.into_result().unwrap(), 1);
    // 10ms attempt deadline plus the 200ms default backoff.
    assert!(start.elapsed() >= Duration::from_millis(210));
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn parent_deadline_is_terminal() {
    let policy = RetryPolicy::<JobError>::builder()
        .max_attempts(0)
        .should_retry(|_| true)
        .build()
        .unwrap();
    let ctx = Context::background().with_timeout(Duration::from_millis(500));

    let outcome = policy
        .execute_outcome(&ctx, |_| async { Err::<(), _>(JobError::Busy) })
        .await;

    // 200ms between attempts: attempts at 0, 200, 400, then the deadline fires mid-backoff.
    assert_eq!(outcome.attempts(), 3);
    assert_eq!(
        outcome.into_result().unwrap_err(),
        JobError::Context(ContextError::DeadlineExceeded)
    );
}

#[tokio::test]
async fn backoff_strategy_and_hint_drive_sleeps() {
    let sleeper = TrackingSleeper::new();
    let policy = RetryPolicy::<JobError>::builder()
        .max_attempts(4)
        .mode(MaxAttemptsMode::AllErrors)
        .backoff(Backoff::exponential(Duration::from_millis(100)))
        .delay_hint(|attempt, _| (attempt == 2).then(|| Duration::from_secs(2)))
        .should_retry(retry_busy)
        .with_sleeper(sleeper.clone())
        .build()
        .unwrap();

    let _ = policy
        .execute(&Context::background(), |_| async { Err::<(), _>(JobError::Busy) })
        .await;

    assert_eq!(
        sleeper.calls(),
        vec![Duration::from_millis(100), Duration::from_secs(2), Duration::from_millis(400)]
    );
}

#[tokio::test]
async fn shared_policy_serves_concurrent_calls() {
    let policy = RetryPolicy::<JobError>::builder()
        .max_attempts(3)
        .mode(MaxAttemptsMode::AllErrors)
        .should_retry(retry_busy)
        .with_sleeper(InstantSleeper)
        .build()
        .unwrap();
    let total = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for id in 0..8usize {
        let policy = policy.clone();
        let total = total.clone();
        handles.push(tokio::spawn(async move {
            let local = AtomicUsize::new(0);
            policy
                .execute(&Context::background(), |_| {
                    total.fetch_add(1, Ordering::SeqCst);
                    let n = local.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n < 2 {
                            Err(JobError::Busy)
                        } else {
                            Ok(id)
                        }
                    }
                })
                .await
        }));
    }

    for (id, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.await.unwrap(), Ok(id));
    }
    assert_eq!(total.load(Ordering::SeqCst), 24);
}
