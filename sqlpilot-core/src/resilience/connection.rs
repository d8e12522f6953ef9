//! Connection handler: circuit breaker around database connectivity.

use super::{CircuitBreaker, HandlerError, backoff_delay};
use crate::config::CircuitBreakerConfig;
use crate::diagnostics::{RetryStrategy, SqlError, SqlErrorAnalyzer, SqlErrorType};
use crate::error::SqlPilotError;
use std::future::Future;

/// Gates database calls through a [`CircuitBreaker`].
///
/// Only connection-class failures count against the breaker. A statement
/// that reaches the engine and fails there proves the connection works and
/// is recorded as a success.
#[derive(Debug)]
pub struct ConnectionHandler {
    breaker: CircuitBreaker,
    analyzer: SqlErrorAnalyzer,
}

impl Default for ConnectionHandler {
    fn default() -> Self {
        Self::new(&CircuitBreakerConfig::default())
    }
}

/// Whether the failure means the database could not be reached.
fn is_connection_failure(error: &SqlPilotError) -> bool {
    match error {
        SqlPilotError::Connection { .. } => true,
        SqlPilotError::Handler { classified, .. } => {
            classified.error_type == SqlErrorType::ConnectionFailed
        }
        _ => false,
    }
}

impl ConnectionHandler {
    /// Creates a handler with the given breaker thresholds.
    pub fn new(config: &CircuitBreakerConfig) -> Self {
        Self {
            breaker: CircuitBreaker::new(config.failure_threshold, config.reset_timeout),
            analyzer: SqlErrorAnalyzer::new(),
        }
    }

    /// The underlying breaker.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Classifies a database-side failure.
    pub fn classify(&self, error: &SqlPilotError) -> SqlError {
        match error {
            SqlPilotError::Handler { classified, .. } => (**classified).clone(),
            SqlPilotError::InsufficientPrivileges { required } => {
                SqlError::new(SqlErrorType::PermissionDenied, error.to_string())
                    .with_invalid_element(Some(required.clone()))
            }
            SqlPilotError::Connection { .. } => {
                SqlError::new(SqlErrorType::ConnectionFailed, error.raw_message())
            }
            other => self.analyzer.analyze_error(&other.raw_message(), ""),
        }
    }

    fn open_circuit_error(&self, retry_in: std::time::Duration) -> HandlerError {
        HandlerError::CircuitOpen {
            retry_in,
            error: SqlError::new(
                SqlErrorType::ConnectionFailed,
                format!(
                    "connection circuit is open after {} consecutive failures, next attempt allowed in {}s",
                    self.breaker.consecutive_failures(),
                    retry_in.as_secs() + u64::from(retry_in.subsec_nanos() > 0)
                ),
            ),
        }
    }

    fn record(&self, outcome: Result<(), &SqlPilotError>) {
        match outcome {
            Err(error) if is_connection_failure(error) => self.breaker.record_failure(),
            _ => self.breaker.record_success(),
        }
    }

    /// Runs `operation` once behind the circuit gate.
    ///
    /// Operation errors are returned unchanged; an open circuit fails fast
    /// without calling `operation`.
    ///
    /// # Errors
    /// Returns [`SqlPilotError::Handler`] when the circuit is open, or the
    /// operation's own error.
    pub async fn guard<T, Op, Fut>(&self, operation: Op) -> crate::Result<T>
    where
        Op: FnOnce() -> Fut,
        Fut: Future<Output = crate::Result<T>>,
    {
        if let Err(retry_in) = self.breaker.try_acquire() {
            tracing::warn!(retry_in_secs = retry_in.as_secs(), "Connection circuit open, failing fast");
            return Err(self.open_circuit_error(retry_in).into());
        }

        let result = operation().await;
        self.record(result.as_ref().map(|_| ()));
        result
    }

    /// Re-runs a failed database operation under the circuit breaker.
    ///
    /// Recoverable failures are retried up to `max_retry_attempts` times with
    /// exponential backoff; every attempt passes the circuit gate first.
    ///
    /// # Errors
    /// [`HandlerError::Terminal`] for non-retryable failures,
    /// [`HandlerError::CircuitOpen`] when the gate rejects an attempt and
    /// [`HandlerError::Exhausted`] when the retry budget runs out.
    pub async fn handle<T, Op, Fut>(
        &self,
        mut operation: Op,
        classified: SqlError,
    ) -> Result<T, HandlerError>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = crate::Result<T>>,
    {
        if !classified.is_recoverable
            || classified.recommended_strategy == RetryStrategy::NoRetry
            || classified.max_retry_attempts == 0
        {
            return Err(HandlerError::Terminal(classified.into_terminal()));
        }

        let max_retries = classified.max_retry_attempts;
        let mut last = classified;

        for retry in 1..=max_retries {
            let delay = backoff_delay(retry);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            if let Err(retry_in) = self.breaker.try_acquire() {
                tracing::warn!(attempt = retry, "Connection circuit open, abandoning retries");
                return Err(self.open_circuit_error(retry_in));
            }

            tracing::debug!(attempt = retry, "Retrying database operation");
            let result = operation().await;
            self.record(result.as_ref().map(|_| ()));

            match result {
                Ok(value) => return Ok(value),
                Err(error) => {
                    let next = self.classify(&error);
                    if !next.is_recoverable {
                        return Err(HandlerError::Terminal(next));
                    }
                    last = next;
                }
            }
        }

        Err(HandlerError::Exhausted {
            attempts: max_retries,
            error: last,
        })
    }
}
