//! Backoff policy shared by every external call.
//!
//! `RetryPolicy::classify` is pure apart from the injected jitter source;
//! `run_with_retry` is the loop that sleeps between attempts.

use std::thread;
use std::time::Duration;

use rand::Rng;

use crate::error::{GenerationError, UpstreamError};

pub const DEFAULT_BASE_WAIT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Upper bound on any single backoff, whatever the server asks for.
pub const MAX_WAIT: Duration = Duration::from_secs(3600);

pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

pub trait Jitter: Send + Sync {
    /// Uniform sample in `[low, high)`.
    fn uniform(&self, low: f64, high: f64) -> f64;
}

pub struct ThreadRngJitter;

impl Jitter for ThreadRngJitter {
    fn uniform(&self, low: f64, high: f64) -> f64 {
        if high <= low {
            return low;
        }
        rand::thread_rng().gen_range(low..high)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FatalReason {
    Exhausted,
    ClientError(u16),
    NotRetryable,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    Retry(Duration),
    Fatal(FatalReason),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub base_wait: Duration,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_wait: DEFAULT_BASE_WAIT,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl RetryPolicy {
    pub fn new(base_wait: Duration, max_retries: u32) -> Self {
        Self {
            base_wait,
            max_retries,
        }
    }

    pub fn classify(&self, error: &UpstreamError, attempt: u32, jitter: &dyn Jitter) -> RetryDecision {
        match error {
            UpstreamError::RateLimited { retry_after, .. } => {
                if attempt >= self.max_retries {
                    return RetryDecision::Fatal(FatalReason::Exhausted);
                }
                let wait = match retry_after {
                    Some(server_wait) => {
                        let backoff = self.backoff_secs(attempt) + jitter.uniform(0.0, 1.0);
                        backoff.max(server_wait + 1.0)
                    }
                    None => self.backoff_secs(attempt) + jitter.uniform(1.0, 5.0),
                };
                RetryDecision::Retry(secs(wait))
            }
            UpstreamError::Connection(_) => self.transient(attempt, jitter),
            UpstreamError::Status { code, .. } if *code >= 500 => self.transient(attempt, jitter),
            UpstreamError::Status { code, .. } if *code >= 400 => {
                RetryDecision::Fatal(FatalReason::ClientError(*code))
            }
            _ => RetryDecision::Fatal(FatalReason::NotRetryable),
        }
    }

    fn transient(&self, attempt: u32, jitter: &dyn Jitter) -> RetryDecision {
        if attempt >= self.max_retries {
            return RetryDecision::Fatal(FatalReason::Exhausted);
        }
        RetryDecision::Retry(secs(
            self.backoff_secs(attempt) + jitter.uniform(0.0, 1.0),
        ))
    }

    fn backoff_secs(&self, attempt: u32) -> f64 {
        self.base_wait.as_secs_f64() * 2f64.powi(attempt.min(30) as i32)
    }
}

/// NaN and negative waits become zero; anything past [`MAX_WAIT`] is capped.
fn secs(value: f64) -> Duration {
    if value.is_nan() {
        return Duration::ZERO;
    }
    let bounded = value.clamp(0.0, MAX_WAIT.as_secs_f64());
    Duration::try_from_secs_f64(bounded).unwrap_or(MAX_WAIT)
}

/// Per-call bookkeeping for the retry loop.
#[derive(Debug, Default)]
pub struct RetryState {
    pub attempt: u32,
    pub last_error: Option<String>,
}

/// Runs `call` until it succeeds or the policy gives up. `call` receives
/// the zero-based attempt number.
pub fn run_with_retry<T, F>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    jitter: &dyn Jitter,
    operation: &'static str,
    mut call: F,
) -> Result<T, GenerationError>
where
    F: FnMut(u32) -> Result<T, UpstreamError>,
{
    let mut state = RetryState::default();
    loop {
        let error = match call(state.attempt) {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };
        state.last_error = Some(error.to_string());

        match policy.classify(&error, state.attempt, jitter) {
            RetryDecision::Retry(wait) => {
                tracing::warn!(
                    operation,
                    attempt = state.attempt + 1,
                    max_retries = policy.max_retries,
                    wait_secs = wait.as_secs_f64(),
                    error = %error,
                    "upstream call failed, backing off"
                );
                sleeper.sleep(wait);
                state.attempt += 1;
            }
            RetryDecision::Fatal(FatalReason::Exhausted) => {
                tracing::error!(
                    operation,
                    max_retries = policy.max_retries,
                    error = state.last_error.as_deref().unwrap_or_default(),
                    "maximum retries reached, giving up"
                );
                return Err(GenerationError::RetriesExhausted {
                    operation,
                    retries: state.attempt,
                    source: error,
                });
            }
            RetryDecision::Fatal(reason) => {
                tracing::error!(operation, ?reason, error = %error, "upstream call failed");
                return Err(GenerationError::Fatal {
                    operation,
                    source: error,
                });
            }
        }
    }
}
