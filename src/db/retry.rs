//! Resilient query execution with bounded retry

use crate::db::Pool;
use crate::error::{Error, Result};
use std::error::Error as StdError;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Errors that are expected to clear on a retry
pub trait TransientError {
    fn is_transient(&self) -> bool;
}

impl TransientError for tokio_postgres::Error {
    fn is_transient(&self) -> bool {
        if self.is_closed() {
            return true;
        }

        if let Some(db) = self.as_db_error() {
            let code = db.code().code();
            // class 08: connection exceptions; 57P0x: server shutdown /
            // cannot-connect; 53300: too many connections
            return code.starts_with("08")
                || matches!(code, "57P01" | "57P02" | "57P03" | "53300");
        }

        // Socket-level failures surface as wrapped io errors
        let mut source = self.source();
        while let Some(err) = source {
            if let Some(io) = err.downcast_ref::<std::io::Error>() {
                use std::io::ErrorKind;
                return matches!(
                    io.kind(),
                    ErrorKind::ConnectionReset
                        | ErrorKind::ConnectionAborted
                        | ErrorKind::ConnectionRefused
                        | ErrorKind::BrokenPipe
                        | ErrorKind::TimedOut
                        | ErrorKind::UnexpectedEof
                );
            }
            source = err.source();
        }

        false
    }
}

/// Backoff before retry number `attempt` (1-based): 2^attempt seconds
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(2u64.saturating_pow(attempt) * 1000)
}

/// Final error of an exhausted or aborted retry loop
#[derive(Debug)]
pub struct RetryFailure<E> {
    /// Physical attempts made, including the failing one
    pub attempts: u32,
    pub error: E,
}

/// Run `op` up to `max_attempts` times, sleeping `backoff_delay` between
/// transient failures. Non-transient errors abort immediately.
pub async fn execute_with_retries<T, E, F, Fut>(
    name: &str,
    max_attempts: u32,
    mut op: F,
) -> std::result::Result<T, RetryFailure<E>>
where
    E: TransientError + Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!("query '{}' succeeded on attempt {}", name, attempt);
                }
                return Ok(value);
            }
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = backoff_delay(attempt);
                tracing::warn!(
                    "query '{}' attempt {}/{} failed ({}), retrying in {:?}",
                    name,
                    attempt,
                    max_attempts,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_transient() {
                    tracing::error!(
                        "query '{}' failed on final attempt {}/{}: {}",
                        name,
                        attempt,
                        max_attempts,
                        e
                    );
                }
                return Err(RetryFailure { attempts: attempt, error: e });
            }
        }
    }
}

/// Query executor over the pool.
///
/// Reads go through the retry loop; writes run a single attempt, because a
/// dropped connection does not prove the server never applied the
/// statement. Multi-statement writes needing atomicity use a pool checkout
/// and an explicit transaction instead.
pub struct Queries {
    pool: Pool,
    max_attempts: u32,
}

impl Queries {
    pub fn new(pool: Pool, max_attempts: u32) -> Self {
        Self { pool, max_attempts }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Execute an idempotent operation with retry on transient failure
    pub async fn read<T, F, Fut>(&self, name: &str, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, tokio_postgres::Error>>,
    {
        execute_with_retries(name, self.max_attempts, op)
            .await
            .map_err(|f| {
                if f.error.is_transient() {
                    Error::TransientStore { attempts: f.attempts, source: f.error }
                } else {
                    Error::Database(f.error)
                }
            })
    }

    /// Execute a non-idempotent operation exactly once
    pub async fn write<T, F, Fut>(&self, name: &str, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, tokio_postgres::Error>>,
    {
        execute_with_retries(name, 1, op).await.map_err(|f| {
            if f.error.is_transient() {
                Error::TransientStore { attempts: f.attempts, source: f.error }
            } else {
                Error::Database(f.error)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_schedule() {
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(2), Duration::from_secs(4));
        assert_eq!(backoff_delay(3), Duration::from_secs(8));
    }
}
