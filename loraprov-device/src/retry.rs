use std::fmt::Display;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Span, field, warn};

#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("gave up after {attempts} attempts in {elapsed:?}: {last}")]
    Exhausted {
        attempts: u32,
        /// Wall time spent, attempts included
        elapsed: Duration,
        last: E,
    },

    #[error("interrupted")]
    Cancelled,
}

/// Retry with a fixed interval and an attempt cap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Time to wait between two attempts
    pub interval: Duration,
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        // a freshly flashed unit gets about a minute to come up
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 12,
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it returns `Ok`, at most `max_attempts` times.
    ///
    /// The closure receives the 1-based attempt number. Cancelling the token
    /// stops the loop immediately, even in the middle of an attempt or while
    /// waiting for the next one.
    pub async fn retry<T, E, F>(
        &self,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        F: AsyncFnMut(u32) -> Result<T, E>,
        E: Display,
    {
        let start = Instant::now();
        let mut attempt = 1;
        loop {
            let result = tokio::select! {
                res = op(attempt) => res,
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            };

            let err = match result {
                Ok(value) => {
                    Span::current().record("attempts", attempt);
                    return Ok(value);
                }
                Err(err) => err,
            };

            if attempt >= self.max_attempts {
                Span::current().record("attempts", attempt);
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    elapsed: start.elapsed(),
                    last: err,
                });
            }

            warn!(
                attempt,
                elapsed = field::debug(start.elapsed()),
                "{err} ... will retry in {:#?}",
                self.interval
            );

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            }
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_after_failures() {
        let policy = RetryPolicy::default();
        let cancel = CancellationToken::new();
        let start = Instant::now();
        let mut calls = 0;

        let res: Result<u32, RetryError<String>> = policy
            .retry(&cancel, async |attempt| {
                calls += 1;
                if attempt < 4 {
                    Err(format!("attempt {attempt} failed"))
                } else {
                    Ok(attempt)
                }
            })
            .await;

        assert_eq!(res.unwrap(), 4);
        assert_eq!(calls, 4);
        assert_eq!(start.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_at_cap() {
        let policy = RetryPolicy {
            interval: Duration::from_secs(1),
            max_attempts: 3,
        };
        let cancel = CancellationToken::new();
        let mut calls = 0;

        let res: Result<(), RetryError<&str>> = policy
            .retry(&cancel, async |_| {
                calls += 1;
                Err("nope")
            })
            .await;

        assert!(matches!(
            res,
            Err(RetryError::Exhausted {
                attempts: 3,
                last: "nope",
                ..
            })
        ));
        assert_eq!(calls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_elapsed_includes_attempt_time() {
        let policy = RetryPolicy {
            interval: Duration::from_secs(1),
            max_attempts: 3,
        };
        let cancel = CancellationToken::new();

        // every attempt waits out a 2s read timeout
        let res: Result<(), RetryError<&str>> = policy
            .retry(&cancel, async |_| {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Err("timed out")
            })
            .await;

        match res {
            Err(RetryError::Exhausted { attempts, elapsed, .. }) => {
                assert_eq!(attempts, 3);
                assert_eq!(elapsed, Duration::from_secs(8));
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_stops_when_cancelled() {
        let policy = RetryPolicy::default();
        let cancel = CancellationToken::new();
        let start = Instant::now();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(7)).await;
            canceller.cancel();
        });

        let mut calls = 0;
        let res: Result<(), RetryError<&str>> = policy
            .retry(&cancel, async |_| {
                calls += 1;
                Err("booting")
            })
            .await;

        assert!(matches!(res, Err(RetryError::Cancelled)));
        assert_eq!(calls, 2);
        assert_eq!(start.elapsed(), Duration::from_secs(7));
    }
}
