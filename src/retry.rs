// ABOUTME: Bounded exponential-backoff executor for fallible platform calls.
// ABOUTME: Callers decide which errors are retryable; the executor only schedules attempts.

use serde::Deserialize;
use std::future::Future;
use std::time::Duration;

/// How many times to try a call and how long to wait between tries.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay", with = "humantime_serde")]
    pub base_delay: Duration,

    #[serde(default = "default_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
            multiplier: default_multiplier(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            multiplier,
        }
    }

    /// A policy that tries exactly once.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Attempts actually made; zero is treated as one.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// The delays slept between attempts, in order.
    ///
    /// There is one fewer delay than attempts: nothing before the first try
    /// and nothing after the last.
    pub fn delays(&self) -> Delays {
        Delays {
            next: self.base_delay.min(self.max_delay),
            max: self.max_delay,
            multiplier: if self.multiplier.is_finite() {
                self.multiplier.max(1.0)
            } else {
                1.0
            },
            remaining: self.attempts() - 1,
        }
    }
}

/// Iterator over the backoff sequence of a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct Delays {
    next: Duration,
    max: Duration,
    multiplier: f64,
    remaining: u32,
}

impl Iterator for Delays {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let current = self.next;
        // Growth past what a Duration can hold saturates at the cap.
        self.next = Duration::try_from_secs_f64(current.as_secs_f64() * self.multiplier)
            .map_or(self.max, |d| d.min(self.max));
        Some(current)
    }
}

/// Failure of a retried call.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E: std::error::Error + 'static> {
    /// Every attempt failed; carries the error from the final attempt.
    #[error("gave up after {attempts} attempt(s): {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: E,
    },

    /// The caller classified the error as not worth retrying.
    #[error(transparent)]
    Fatal(E),
}

impl<E: std::error::Error + 'static> RetryError<E> {
    /// The underlying error, whichever way the call failed.
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Fatal(e) => e,
        }
    }

    pub fn inner(&self) -> &E {
        match self {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Fatal(e) => e,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }
}

/// Run `op` until it succeeds or the policy runs out of attempts.
///
/// `op` receives the 1-based attempt number. Every error is retried.
pub async fn execute<T, E, F, Fut>(policy: &RetryPolicy, op: F) -> Result<T, RetryError<E>>
where
    E: std::error::Error + 'static,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    execute_if(policy, op, |_| true).await
}

/// Like [`execute`], but errors for which `retryable` returns false end the
/// call immediately with [`RetryError::Fatal`].
pub async fn execute_if<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    mut op: F,
    retryable: P,
) -> Result<T, RetryError<E>>
where
    E: std::error::Error + 'static,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut delays = policy.delays();
    let mut attempt = 1;

    loop {
        let err = match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !retryable(&err) {
            return Err(RetryError::Fatal(err));
        }

        match delays.next() {
            Some(delay) => {
                tracing::debug!(
                    attempt,
                    max_attempts = policy.attempts(),
                    delay_ms = delay.as_millis() as u64,
                    "attempt failed, retrying: {}",
                    err
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            None => {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: err,
                });
            }
        }
    }
}
