//! Bounded retries with capped exponential backoff and jitter.
//!
//! Every wait between attempts is a plain `tokio::time::sleep`, and the
//! per-attempt timeout is a `tokio::time::timeout` race, so dropping the
//! future returned by [`RetryEngine::with_retry`] abandons the in-flight
//! attempt and schedules nothing further. Cancellation is not a failure and
//! is never retried.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use bon::Builder;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, timeout};

use crate::orchestrator::error::OrchestratorError;
use crate::orchestrator::internal_event::{InternalEvent, RetryExhausted, RetryScheduled};

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);
const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(10_000);
const DEFAULT_BACKOFF_MULTIPLIER: u32 = 2;

/// Random extra delay in `[0, 1000)` ms added to every backoff wait, so
/// concurrent callers recovering from the same failure don't retry in
/// lockstep against a shared rate-limited service.
const JITTER_CEILING_MS: u64 = 1000;

/// A retry strategy driven by capped exponential back-off.
///
/// Yields `min(base · multiplier^n, max_delay)` where `n` counts past
/// attempts, without jitter; the engine adds jitter per wait.
#[derive(Debug, Clone)]
pub struct BackoffSchedule {
    current_ms: u64,
    multiplier: u64,
    max_delay: Duration,
}

impl BackoffSchedule {
    pub const fn new(base: Duration, multiplier: u32, max_delay: Duration) -> Self {
        Self {
            current_ms: base.as_millis() as u64,
            multiplier: multiplier as u64,
            max_delay,
        }
    }
}

impl Iterator for BackoffSchedule {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let delay = Duration::from_millis(self.current_ms).min(self.max_delay);

        self.current_ms = self.current_ms.saturating_mul(self.multiplier);

        Some(delay)
    }
}

/// Backoff parameters for one operation kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Builder, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt; `0` means fail on the first error.
    #[builder(default = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,
    #[builder(default = DEFAULT_BASE_DELAY)]
    pub base_delay: Duration,
    /// Upper bound on any single backoff wait, before jitter.
    #[builder(default = DEFAULT_MAX_DELAY)]
    pub max_delay: Duration,
    #[builder(default = DEFAULT_BACKOFF_MULTIPLIER)]
    pub backoff_multiplier: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

/// Per-invocation options for [`RetryEngine::with_retry`].
#[derive(Clone, Debug, Builder)]
pub struct RetryOptions {
    /// Key under which attempts are tracked; also appears in errors and logs.
    #[builder(into)]
    pub operation: String,
    #[builder(default)]
    pub retry: RetryConfig,
    /// Per-attempt deadline. Unset means an attempt may run indefinitely.
    pub timeout: Option<Duration>,
}

enum AttemptFailure {
    TimedOut,
    Failed(crate::Error),
}

/// Wraps arbitrary remote operations with bounded, jittered retries.
///
/// The engine keeps an advisory map from operation key to the attempt number
/// currently in flight, observable via [`attempts_for`](Self::attempts_for)
/// for progress reporting. The map never influences correctness.
#[derive(Debug, Default)]
pub struct RetryEngine {
    attempts: Mutex<HashMap<String, u32>>,
}

impl RetryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt number currently tracked for `operation`, zero when idle.
    pub fn attempts_for(&self, operation: &str) -> u32 {
        let attempts = self.attempts.lock().expect("attempt map lock poisoned");
        attempts.get(operation).copied().unwrap_or(0)
    }

    /// Run `operation_fn` until it succeeds or the retry budget is spent.
    ///
    /// The first attempt runs immediately; each failure before exhaustion
    /// waits `min(base · multiplier^(attempt−1), max_delay)` plus jitter and
    /// tries again. Exhaustion fails with
    /// [`OrchestratorError::RetriesExhausted`] carrying the last error, or
    /// [`OrchestratorError::OperationTimeout`] when the last attempt lost its
    /// race against the per-attempt timer.
    pub async fn with_retry<T, F, Fut>(
        &self,
        options: &RetryOptions,
        mut operation_fn: F,
    ) -> Result<T, OrchestratorError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, crate::Error>>,
    {
        let config = options.retry;
        let mut schedule = BackoffSchedule::new(
            config.base_delay,
            config.backoff_multiplier,
            config.max_delay,
        );
        let mut attempt: u32 = 1;

        loop {
            self.note_attempt(&options.operation, attempt);

            let outcome = match options.timeout {
                Some(limit) => match timeout(limit, operation_fn()).await {
                    Ok(result) => result.map_err(AttemptFailure::Failed),
                    Err(_elapsed) => Err(AttemptFailure::TimedOut),
                },
                None => operation_fn().await.map_err(AttemptFailure::Failed),
            };

            let failure = match outcome {
                Ok(value) => {
                    self.clear_attempts(&options.operation);
                    if attempt > 1 {
                        debug!(
                            message = "Operation recovered after retries.",
                            operation = %options.operation,
                            attempt,
                        );
                    }
                    return Ok(value);
                }
                Err(failure) => failure,
            };

            if attempt > config.max_retries {
                error!(
                    message = "Retries exhausted; giving up on the operation.",
                    operation = %options.operation,
                    attempts = attempt,
                );
                RetryExhausted {
                    operation: &options.operation,
                    attempts: attempt,
                }
                .emit();
                return Err(match failure {
                    AttemptFailure::TimedOut => OrchestratorError::OperationTimeout {
                        operation: options.operation.clone(),
                        timeout_ms: options
                            .timeout
                            .map(|limit| limit.as_millis() as u64)
                            .unwrap_or(0),
                    },
                    AttemptFailure::Failed(source) => OrchestratorError::RetriesExhausted {
                        operation: options.operation.clone(),
                        attempts: attempt,
                        source,
                    },
                });
            }

            let base = schedule.next().unwrap_or(config.max_delay);
            let delay = base + jitter();
            match &failure {
                AttemptFailure::TimedOut => warn!(
                    message = "Attempt timed out; retrying.",
                    operation = %options.operation,
                    attempt,
                    delay_ms = %delay.as_millis(),
                ),
                AttemptFailure::Failed(error) => warn!(
                    message = "Retrying after error.",
                    operation = %options.operation,
                    attempt,
                    delay_ms = %delay.as_millis(),
                    error = %error,
                ),
            }
            RetryScheduled {
                operation: &options.operation,
                attempt,
                delay,
            }
            .emit();

            sleep(delay).await;
            attempt += 1;
        }
    }

    fn note_attempt(&self, operation: &str, attempt: u32) {
        let mut attempts = self.attempts.lock().expect("attempt map lock poisoned");
        attempts.insert(operation.to_string(), attempt);
    }

    fn clear_attempts(&self, operation: &str) {
        let mut attempts = self.attempts.lock().expect("attempt map lock poisoned");
        attempts.remove(operation);
    }
}

fn jitter() -> Duration {
    Duration::from_millis(rand::random::<u64>() % JITTER_CEILING_MS)
}
