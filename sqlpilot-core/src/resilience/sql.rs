//! SQL handler: bounded re-runs of statements hit by transient engine errors.

use super::{DEFAULT_WAIT_INTERVAL, HandlerError, Pacing, retry_classified};
use crate::diagnostics::{RetryStrategy, SqlError, SqlErrorAnalyzer, SqlErrorType};
use crate::error::SqlPilotError;
use std::future::Future;

/// Re-runs statements that failed on a transient engine condition.
///
/// Transient conditions (deadlocks, lock timeouts, dropped connections) are
/// handled as connection-class failures with exponential backoff. Any other
/// failure is a statement problem: it is classified and returned as terminal
/// so the correction loop can deal with it.
#[derive(Debug, Clone)]
pub struct SqlHandler {
    analyzer: SqlErrorAnalyzer,
    max_transient_retries: u32,
}

impl Default for SqlHandler {
    fn default() -> Self {
        Self::new(3)
    }
}

impl SqlHandler {
    /// Creates a handler allowing `max_transient_retries` re-runs.
    pub fn new(max_transient_retries: u32) -> Self {
        Self {
            analyzer: SqlErrorAnalyzer::new(),
            max_transient_retries,
        }
    }

    /// Classifies an execution failure for the retry decision.
    pub fn classify(&self, error: &SqlPilotError, sql: &str, transient: bool) -> SqlError {
        if transient {
            return SqlError::new(SqlErrorType::ConnectionFailed, error.raw_message())
                .with_strategy(RetryStrategy::ExponentialBackoff, self.max_transient_retries);
        }
        self.analyzer
            .analyze_error(&error.raw_message(), sql)
            .into_terminal()
    }

    /// Re-runs a failed statement under its classified policy.
    ///
    /// `is_transient` decides, per failure, whether another re-run is worth it.
    ///
    /// # Errors
    /// Returns the [`HandlerError`] produced once retrying stops; its
    /// classification message is the raw engine text of the last failure.
    pub async fn handle<T, Op, Fut, P>(
        &self,
        sql: &str,
        operation: Op,
        classified: SqlError,
        is_transient: P,
    ) -> Result<T, HandlerError>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = crate::Result<T>>,
        P: Fn(&SqlPilotError) -> bool,
    {
        retry_classified(
            "sql",
            operation,
            classified,
            |error: &SqlPilotError| self.classify(error, sql, is_transient(error)),
            Pacing::Fixed(DEFAULT_WAIT_INTERVAL),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn deadlock() -> SqlPilotError {
        SqlPilotError::query_failed_with_code("deadlock detected", Some("40P01".to_string()))
    }

    fn is_deadlock(error: &SqlPilotError) -> bool {
        matches!(error, SqlPilotError::QueryExecution { code: Some(code), .. } if code == "40P01")
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_is_retried() {
        let handler = SqlHandler::new(3);
        let calls = AtomicU32::new(0);
        let classified = handler.classify(&deadlock(), "SELECT 1", true);
        assert!(classified.is_recoverable);

        let result = handler
            .handle(
                "SELECT 1",
                || {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move { if n < 1 { Err(deadlock()) } else { Ok(1) } }
                },
                classified,
                is_deadlock,
            )
            .await;

        assert_eq!(result.expect("second run succeeds"), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_retries_are_bounded() {
        let handler = SqlHandler::new(2);
        let calls = AtomicU32::new(0);
        let classified = handler.classify(&deadlock(), "SELECT 1", true);

        let result: Result<i32, HandlerError> = handler
            .handle(
                "SELECT 1",
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(deadlock()) }
                },
                classified,
                is_deadlock,
            )
            .await;

        let error = result.expect_err("budget exhausted");
        assert!(matches!(error, HandlerError::Exhausted { attempts: 2, .. }));
        assert_eq!(error.classified().message, "deadlock detected");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_statement_errors_are_not_rerun() {
        let handler = SqlHandler::default();
        let error = SqlPilotError::query_failed("no such column: CustomerName");
        let classified = handler.classify(&error, "SELECT CustomerName FROM Customers", false);
        assert_eq!(classified.error_type, SqlErrorType::InvalidColumn);
        assert!(!classified.is_recoverable);

        let calls = AtomicU32::new(0);
        let result: Result<(), HandlerError> = handler
            .handle(
                "SELECT CustomerName FROM Customers",
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok(()) }
                },
                classified,
                |_| false,
            )
            .await;

        assert!(matches!(result, Err(HandlerError::Terminal(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
