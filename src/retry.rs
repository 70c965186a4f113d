//! Bounded retry with exponential backoff for remote calls.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use log::{debug, warn};
use rand::Rng;

use crate::error::RemoteError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    ListLabels,
    CreateLabel,
    ImportMessage,
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallKind::ListLabels => "label listing",
            CallKind::CreateLabel => "label creation",
            CallKind::ImportMessage => "message import",
        };
        f.write_str(name)
    }
}

/// One remote operation being driven by [`RetryPolicy::execute`].
#[derive(Debug, Clone)]
pub struct RetryableCall<'a> {
    pub kind: CallKind,
    /// What the call acts on, for log lines (label name, message description)
    pub target: &'a str,
    /// Attempts made so far
    pub attempt: u32,
}

/// Exponential backoff state.
#[derive(Debug, Clone)]
struct Backoff {
    factor: u32,
    max: Duration,
    value: Duration,
}

impl Backoff {
    /// Obtain the stored delay value and precompute the next one.
    fn advance(&mut self) -> Duration {
        let current = self.value;
        self.value = current.saturating_mul(self.factor).min(self.max);
        current
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    jitter: bool,
}

impl RetryPolicy {
    /// `max_attempts` of 0 or 1 means a single attempt.
    pub fn new(max_attempts: u32) -> Self {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(3600),
            jitter: true,
        }
    }

    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Run `op` until it succeeds or the attempt budget is spent.
    ///
    /// Attempt `n` (0-based) that fails and is not the last is followed by a
    /// sleep of `2^n * initial_delay` plus up to one second of jitter. Every
    /// error is retried the same way; the last one is returned.
    pub async fn execute<T, F, Fut>(
        &self,
        kind: CallKind,
        target: &str,
        mut op: F,
    ) -> Result<T, RemoteError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let attempts = self.attempts();
        let mut call = RetryableCall {
            kind,
            target,
            attempt: 0,
        };
        let mut backoff = Backoff {
            factor: 2,
            max: self.max_delay,
            value: self.initial_delay,
        };

        loop {
            match op().await {
                Ok(value) => {
                    if call.attempt > 0 {
                        debug!(
                            "{} of '{}' succeeded after {} retry(ies)",
                            call.kind, call.target, call.attempt
                        );
                    }
                    return Ok(value);
                }
                Err(err) => {
                    call.attempt += 1;
                    if call.attempt >= attempts {
                        return Err(err);
                    }

                    let delay = backoff.advance() + self.jitter();
                    warn!(
                        "⚠️  {} of '{}' failed with {}, retrying in {:.2} seconds (attempt {}/{})",
                        call.kind,
                        call.target,
                        err,
                        delay.as_secs_f64(),
                        call.attempt,
                        attempts
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn jitter(&self) -> Duration {
        if self.jitter {
            Duration::from_secs_f64(rand::thread_rng().gen::<f64>())
        } else {
            Duration::ZERO
        }
    }
}
