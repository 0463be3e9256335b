//! Retry-with-feedback: each attempt's input carries the previous attempt's
//! failure diagnostic so the model has concrete corrective signal.

use crate::error::{BricksmithError, Result};
use std::future::Future;
use std::time::Duration;

// ---------------------------------------------------------------------------
// BackoffPolicy
// ---------------------------------------------------------------------------

/// Multiplicative backoff with a cap.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub multiplier: f64,
    pub cap: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            multiplier: 2.0,
            cap: Duration::from_secs(30),
        }
    }
}

impl BackoffPolicy {
    /// Zero-delay policy for tests and dry runs.
    pub fn none() -> Self {
        Self {
            initial: Duration::ZERO,
            multiplier: 1.0,
            cap: Duration::ZERO,
        }
    }

    /// Delay after the `attempt`-th failure (1-indexed).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let millis = (self.initial.as_millis() as f64 * factor).round();
        let delay = Duration::from_millis(millis.min(u64::MAX as f64) as u64);
        delay.min(self.cap)
    }
}

// ---------------------------------------------------------------------------
// RetryContext
// ---------------------------------------------------------------------------

/// The corrective context threaded into each attempt.
///
/// An explicit value, rebuilt per attempt — never mutable outer-scope state.
/// Destroyed when the operation succeeds, is abandoned, or retries exhaust.
#[derive(Debug, Clone, Default)]
pub struct RetryContext {
    /// 1-indexed. The first attempt is `1`.
    pub attempt_number: u32,
    /// The diagnostic from the immediately preceding attempt, if any.
    pub previous_error: Option<String>,
    /// Corrective text from every failed attempt so far, oldest first.
    pub accumulated_instructions: Vec<String>,
}

impl RetryContext {
    fn first() -> Self {
        Self {
            attempt_number: 1,
            previous_error: None,
            accumulated_instructions: Vec::new(),
        }
    }

    fn next(&self, error: String) -> Self {
        let mut instructions = self.accumulated_instructions.clone();
        instructions.push(error.clone());
        Self {
            attempt_number: self.attempt_number + 1,
            previous_error: Some(error),
            accumulated_instructions: instructions,
        }
    }

    /// Render the accumulated corrective feedback as a prompt fragment.
    /// Empty on the first attempt.
    pub fn feedback_block(&self) -> String {
        if self.accumulated_instructions.is_empty() {
            return String::new();
        }
        let mut out = String::from(
            "\n\nPrevious attempts failed. Fix the problems below and respond again:\n",
        );
        for (i, err) in self.accumulated_instructions.iter().enumerate() {
            out.push_str(&format!("- attempt {}: {}\n", i + 1, err));
        }
        out
    }
}

// ---------------------------------------------------------------------------
// AttemptError
// ---------------------------------------------------------------------------

/// How one attempt failed.
#[derive(Debug)]
pub enum AttemptError {
    /// Transient: the diagnostic becomes the next attempt's corrective
    /// context (malformed payload, schema violation, failed smoke run).
    Retryable(String),
    /// Environment failure (capability unavailable, filesystem unwritable):
    /// propagate immediately, no retry.
    Fatal(BricksmithError),
}

impl AttemptError {
    pub fn retryable(msg: impl Into<String>) -> Self {
        AttemptError::Retryable(msg.into())
    }
}

// ---------------------------------------------------------------------------
// retry_with_feedback
// ---------------------------------------------------------------------------

/// Run `op` up to `max_attempts` times, threading a [`RetryContext`] into
/// each attempt. Returns the first success. Fails with
/// [`BricksmithError::RetryExhausted`] carrying the full attempt history, or
/// immediately with any [`AttemptError::Fatal`].
///
/// With an op that always fails retryably, `op` is called exactly
/// `max_attempts` times; with one that succeeds on the nth call, exactly
/// `n` times.
pub async fn retry_with_feedback<T, F, Fut>(
    mut op: F,
    max_attempts: u32,
    backoff: &BackoffPolicy,
) -> Result<T>
where
    F: FnMut(RetryContext) -> Fut,
    Fut: Future<Output = std::result::Result<T, AttemptError>>,
{
    let mut ctx = RetryContext::first();
    let mut history = Vec::new();

    loop {
        match op(ctx.clone()).await {
            Ok(value) => return Ok(value),
            Err(AttemptError::Fatal(e)) => return Err(e),
            Err(AttemptError::Retryable(diag)) => {
                tracing::warn!(
                    attempt = ctx.attempt_number,
                    max_attempts,
                    error = %diag,
                    "attempt failed"
                );
                history.push(diag.clone());

                if ctx.attempt_number >= max_attempts {
                    return Err(BricksmithError::RetryExhausted {
                        attempts: ctx.attempt_number,
                        history,
                    });
                }

                let delay = backoff.delay_after(ctx.attempt_number);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                ctx = ctx.next(diag);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
