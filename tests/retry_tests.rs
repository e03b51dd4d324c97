//! Resilient query executor tests
//!
//! Uses a paused tokio clock so the backoff sleeps are asserted without
//! real delays.

use classpix::db::{backoff_delay, execute_with_retries, TransientError};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
struct FakeError {
    transient: bool,
}

impl fmt::Display for FakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", if self.transient { "connection reset" } else { "syntax error" })
    }
}

impl TransientError for FakeError {
    fn is_transient(&self) -> bool {
        self.transient
    }
}

#[test]
fn test_backoff_schedule() {
    assert_eq!(backoff_delay(1), Duration::from_secs(2));
    assert_eq!(backoff_delay(2), Duration::from_secs(4));
    assert_eq!(backoff_delay(3), Duration::from_secs(8));
}

#[tokio::test(start_paused = true)]
async fn test_succeeds_after_two_transient_failures() {
    let calls = Arc::new(AtomicU32::new(0));
    let start = tokio::time::Instant::now();

    let calls_in = calls.clone();
    let result = execute_with_retries("test query", 3, move || {
        let calls = calls_in.clone();
        async move {
            let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= 2 {
                Err(FakeError { transient: true })
            } else {
                Ok(42u32)
            }
        }
    })
    .await;

    assert_eq!(result.unwrap(), 42);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    // 2s after the first failure, 4s after the second
    assert_eq!(start.elapsed(), Duration::from_secs(6));
}

#[tokio::test(start_paused = true)]
async fn test_non_transient_error_propagates_immediately() {
    let calls = Arc::new(AtomicU32::new(0));
    let start = tokio::time::Instant::now();

    let calls_in = calls.clone();
    let result: Result<u32, _> = execute_with_retries("test query", 3, move || {
        let calls = calls_in.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(FakeError { transient: false })
        }
    })
    .await;

    let failure = result.unwrap_err();
    assert_eq!(failure.attempts, 1);
    assert!(!failure.error.is_transient());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    // No backoff delay for a fatal error
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_transient_errors_exhaust_attempts() {
    let calls = Arc::new(AtomicU32::new(0));
    let start = tokio::time::Instant::now();

    let calls_in = calls.clone();
    let result: Result<u32, _> = execute_with_retries("test query", 3, move || {
        let calls = calls_in.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(FakeError { transient: true })
        }
    })
    .await;

    let failure = result.unwrap_err();
    assert_eq!(failure.attempts, 3);
    assert!(failure.error.is_transient());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    // Slept between attempts but not after the last one
    assert_eq!(start.elapsed(), Duration::from_secs(6));
}

#[tokio::test(start_paused = true)]
async fn test_single_attempt_never_sleeps() {
    // How writes are submitted: max_attempts of one, no replay
    let calls = Arc::new(AtomicU32::new(0));
    let start = tokio::time::Instant::now();

    let calls_in = calls.clone();
    let result: Result<u32, _> = execute_with_retries("write query", 1, move || {
        let calls = calls_in.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(FakeError { transient: true })
        }
    })
    .await;

    assert_eq!(result.unwrap_err().attempts, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_success_on_first_attempt() {
    let result = execute_with_retries("test query", 3, || async { Ok::<_, FakeError>("ok") }).await;
    assert_eq!(result.unwrap(), "ok");
}
