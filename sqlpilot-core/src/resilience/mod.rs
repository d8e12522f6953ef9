//! Retry, backoff and circuit-breaker policies around external calls.
//!
//! Every handler is driven by a classified [`SqlError`]: its
//! `recommended_strategy` picks the pacing and `max_retry_attempts` bounds
//! the number of re-runs. Outcomes are tagged results; a handler that gives
//! up returns a [`HandlerError`] carrying the last classification instead of
//! raising.
//!
//! | Strategy | Pacing before retry `k` |
//! |---|---|
//! | `NoRetry` | operation is never re-run |
//! | `ImmediateRetry` | none |
//! | `ExponentialBackoff`, `CircuitBreaker`, `Fallback` | `2^(k-1)` seconds for `k >= 2` |
//! | `WaitAndRetry` | fixed 5s, or the shared LLM cooldown |
//!
//! A failure that re-classifies as non-recoverable stops the loop at once.

mod circuit;
mod connection;
mod llm;
mod sql;
mod vector_store;

use crate::diagnostics::{RetryStrategy, SqlError};
use crate::error::SqlPilotError;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

pub use circuit::{CircuitBreaker, CircuitState};
pub use connection::ConnectionHandler;
pub use llm::LlmHandler;
pub use sql::SqlHandler;
pub use vector_store::VectorStoreHandler;

/// Fixed pause between `WaitAndRetry` attempts outside the LLM path.
pub const DEFAULT_WAIT_INTERVAL: Duration = Duration::from_secs(5);

/// Terminal outcome of a resilience handler.
#[derive(Debug, Clone, Error)]
pub enum HandlerError {
    /// The failure is not worth retrying; the operation was not re-run
    #[error("non-retryable failure: {0}")]
    Terminal(SqlError),

    /// Every allowed retry failed
    #[error("gave up after {attempts} retries: {error}")]
    Exhausted { attempts: u32, error: SqlError },

    /// The circuit is open; the operation was not attempted
    #[error("circuit open, retry in {}s: {error}", .retry_in.as_secs())]
    CircuitOpen { retry_in: Duration, error: SqlError },
}

impl HandlerError {
    /// The classification that ended the handler.
    pub fn classified(&self) -> &SqlError {
        match self {
            Self::Terminal(error)
            | Self::Exhausted { error, .. }
            | Self::CircuitOpen { error, .. } => error,
        }
    }

    /// Consumes the outcome, returning its classification.
    pub fn into_classified(self) -> SqlError {
        match self {
            Self::Terminal(error)
            | Self::Exhausted { error, .. }
            | Self::CircuitOpen { error, .. } => error,
        }
    }
}

impl From<HandlerError> for SqlPilotError {
    fn from(error: HandlerError) -> Self {
        let message = error.to_string();
        SqlPilotError::handler(message, error.into_classified())
    }
}

/// Delay before retry number `retry` (1-based) under exponential backoff.
///
/// The first retry runs at once; later ones wait 2s, 4s, 8s...
pub fn backoff_delay(retry: u32) -> Duration {
    if retry < 2 {
        Duration::ZERO
    } else {
        Duration::from_secs(1u64 << (retry - 1).min(16))
    }
}

/// Rate-limit clock shared by every call going through one handler.
///
/// Extending the cooldown never shortens it, so concurrent rate-limited
/// callers resume together at the latest deadline.
#[derive(Debug, Clone, Default)]
pub struct SharedCooldown {
    until: Arc<Mutex<Option<Instant>>>,
}

impl SharedCooldown {
    /// Pushes the deadline to at least `now + cooldown`.
    pub fn extend(&self, cooldown: Duration) {
        let target = Instant::now() + cooldown;
        let mut until = self.until.lock().unwrap_or_else(PoisonError::into_inner);
        if until.is_none_or(|current| current < target) {
            *until = Some(target);
        }
    }

    /// Time left before calls may proceed, if any.
    pub fn remaining(&self) -> Option<Duration> {
        let until = *self.until.lock().unwrap_or_else(PoisonError::into_inner);
        until
            .and_then(|deadline| deadline.checked_duration_since(Instant::now()))
            .filter(|left| !left.is_zero())
    }

    /// Sleeps until the cooldown has passed.
    pub async fn wait(&self) {
        if let Some(left) = self.remaining() {
            tracing::info!(wait_secs = left.as_secs(), "Waiting for LLM rate-limit cooldown");
            tokio::time::sleep(left).await;
        }
    }
}

/// How `WaitAndRetry` pauses are produced.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Pacing<'a> {
    /// Fixed delay, overridden by a provider-declared `retry_after`
    Fixed(Duration),
    /// Shared cooldown clock
    Shared(&'a SharedCooldown),
}

async fn pause(strategy: RetryStrategy, retry: u32, error: &SqlError, pacing: Pacing<'_>) {
    let delay = match strategy {
        RetryStrategy::NoRetry | RetryStrategy::ImmediateRetry => Duration::ZERO,
        RetryStrategy::ExponentialBackoff
        | RetryStrategy::CircuitBreaker
        | RetryStrategy::Fallback => backoff_delay(retry),
        RetryStrategy::WaitAndRetry => match pacing {
            Pacing::Fixed(interval) => error.retry_after.unwrap_or(interval),
            Pacing::Shared(cooldown) => {
                cooldown.extend(error.retry_after.unwrap_or(DEFAULT_WAIT_INTERVAL));
                cooldown.wait().await;
                return;
            }
        },
    };

    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// Re-runs `operation` under the policy of an already classified failure.
///
/// `classify` turns each further failure into a [`SqlError`]; the first
/// non-recoverable one ends the loop with [`HandlerError::Terminal`].
pub(crate) async fn retry_classified<T, E, Op, Fut, C>(
    handler: &'static str,
    mut operation: Op,
    classified: SqlError,
    classify: C,
    pacing: Pacing<'_>,
) -> Result<T, HandlerError>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> SqlError,
{
    let strategy = classified.recommended_strategy;
    let max_retries = classified.max_retry_attempts;

    if !classified.is_recoverable || strategy == RetryStrategy::NoRetry || max_retries == 0 {
        tracing::warn!(
            handler,
            error_type = ?classified.error_type,
            code = %classified.code,
            "Failure is not retryable"
        );
        return Err(HandlerError::Terminal(classified.into_terminal()));
    }

    tracing::debug!(handler, strategy = %strategy, max_retries, "Entering retry loop");

    let mut last = classified;
    for retry in 1..=max_retries {
        pause(strategy, retry, &last, pacing).await;
        tracing::debug!(handler, attempt = retry, strategy = %strategy, "Retrying operation");

        match operation().await {
            Ok(value) => {
                tracing::info!(handler, attempt = retry, "Operation succeeded on retry");
                return Ok(value);
            }
            Err(error) => {
                let next = classify(&error);
                tracing::warn!(
                    handler,
                    attempt = retry,
                    error_type = ?next.error_type,
                    "Retry failed"
                );
                if !next.is_recoverable {
                    return Err(HandlerError::Terminal(next));
                }
                last = next;
            }
        }
    }

    if strategy == RetryStrategy::Fallback {
        tracing::error!(handler, "Fallback retries exhausted, no alternate provider configured");
        return Err(HandlerError::Terminal(last.into_terminal()));
    }

    tracing::error!(handler, attempts = max_retries, "Retries exhausted");
    Err(HandlerError::Exhausted {
        attempts: max_retries,
        error: last,
    })
}
