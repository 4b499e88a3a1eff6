//! Bounded retries with exponential backoff.
//!
//! Backoff sleeps are cancellable: a cancelled run never waits out a delay.

use sentient_config::AgentConfig;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How a retried operation finally gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The error was not worth retrying.
    Permanent(E),
    /// Every attempt failed transiently.
    Exhausted { attempts: u32, last: E },
    /// Cancellation arrived before the operation succeeded.
    Cancelled,
}

/// `initial * 2^(n-1)` before retry `n`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial: Duration,
    pub max: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial: Duration, max: Duration) -> Self {
        Self {
            max_retries,
            initial,
            max,
        }
    }

    /// Policy for model calls.
    pub fn for_model(config: &AgentConfig) -> Self {
        Self::new(
            config.model_retries,
            Duration::from_millis(config.backoff_initial_ms),
            Duration::from_millis(config.backoff_max_ms),
        )
    }

    /// Policy for store writes.
    pub fn for_store(config: &AgentConfig) -> Self {
        Self::new(
            config.store_retries,
            Duration::from_millis(config.backoff_initial_ms),
            Duration::from_millis(config.backoff_max_ms),
        )
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial.saturating_mul(factor).min(self.max)
    }

    /// Run `op` until it succeeds, fails permanently or the budget is spent.
    /// Each attempt is abandoned as soon as `cancel` fires.
    pub async fn run<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        op: F,
        is_transient: impl Fn(&E) -> bool,
        on_retry: impl FnMut(u32, Duration, &E),
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.drive(cancel, true, op, is_transient, on_retry).await
    }

    /// Like [`RetryPolicy::run`], but an attempt in flight always completes;
    /// cancellation only cuts backoff sleeps short.
    pub async fn run_to_completion<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        op: F,
        is_transient: impl Fn(&E) -> bool,
        on_retry: impl FnMut(u32, Duration, &E),
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.drive(cancel, false, op, is_transient, on_retry).await
    }

    async fn drive<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        interruptible: bool,
        mut op: F,
        is_transient: impl Fn(&E) -> bool,
        mut on_retry: impl FnMut(u32, Duration, &E),
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut retries = 0;
        loop {
            let outcome = if interruptible {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                    outcome = op() => outcome,
                }
            } else {
                op().await
            };

            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if !is_transient(&err) {
                return Err(RetryError::Permanent(err));
            }
            if retries >= self.max_retries {
                return Err(RetryError::Exhausted {
                    attempts: retries + 1,
                    last: err,
                });
            }

            retries += 1;
            let delay = self.delay_for(retries);
            on_retry(retries, delay, &err);
            if !sleep_or_cancel(cancel, delay).await {
                return Err(RetryError::Cancelled);
            }
        }
    }
}

/// Sleep for `delay`. Returns false if `cancel` fired first.
pub async fn sleep_or_cancel(cancel: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
