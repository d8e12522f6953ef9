//! Statement execution with a command timeout and transient-error re-runs.

use crate::adapters::DatabaseAdapter;
use crate::diagnostics::SqlErrorAnalyzer;
use crate::error::SqlPilotError;
use crate::models::{QueryRows, SqlExecutionResult};
use crate::resilience::{ConnectionHandler, HandlerError, SqlHandler};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Runs generated SQL and reports the outcome as a [`SqlExecutionResult`].
///
/// Failures are never returned as errors: the correction loop inspects the
/// classified failure on the result instead.
#[derive(Debug, Clone)]
pub struct SqlExecutor {
    connection: Arc<ConnectionHandler>,
    sql_handler: SqlHandler,
    analyzer: SqlErrorAnalyzer,
    query_timeout: Duration,
}

impl SqlExecutor {
    /// Creates an executor gated by `connection`'s circuit breaker.
    pub fn new(
        connection: Arc<ConnectionHandler>,
        max_transient_retries: u32,
        query_timeout: Duration,
    ) -> Self {
        Self {
            connection,
            sql_handler: SqlHandler::new(max_transient_retries),
            analyzer: SqlErrorAnalyzer::new(),
            query_timeout,
        }
    }

    async fn run_once(&self, adapter: &dyn DatabaseAdapter, sql: &str) -> crate::Result<QueryRows> {
        let guarded = self.connection.guard(|| adapter.execute_query(sql));
        match tokio::time::timeout(self.query_timeout, guarded).await {
            Ok(result) => result,
            Err(_) => Err(SqlPilotError::QueryTimeout {
                seconds: self.query_timeout.as_secs(),
            }),
        }
    }

    /// Executes `sql` on `adapter`.
    ///
    /// Transient engine failures are re-run with backoff; every other
    /// failure is classified once and returned on the result.
    pub async fn execute(&self, adapter: &dyn DatabaseAdapter, sql: &str) -> SqlExecutionResult {
        let start_time = Instant::now();

        let outcome = match self.run_once(adapter, sql).await {
            Ok(rows) => Ok(rows),
            Err(error) => {
                let transient = adapter.is_transient_error(&error);
                if transient {
                    tracing::warn!(error = %error, "Transient database error, retrying statement");
                }
                let classified = self.sql_handler.classify(&error, sql, transient);
                self.sql_handler
                    .handle(
                        sql,
                        || self.run_once(adapter, sql),
                        classified,
                        |e: &SqlPilotError| adapter.is_transient_error(e),
                    )
                    .await
            }
        };

        let elapsed_ms = u64::try_from(start_time.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Ok(rows) => {
                tracing::info!(
                    row_count = rows.rows.len(),
                    elapsed_ms,
                    "Query executed"
                );
                SqlExecutionResult::succeeded(rows, elapsed_ms)
            }
            Err(handler_error) => {
                let details = match handler_error {
                    // terminal classifications had their retry budget cleared
                    HandlerError::Terminal(error) => {
                        self.analyzer.analyze_error(&error.message, sql)
                    }
                    HandlerError::Exhausted { error, .. } | HandlerError::CircuitOpen { error, .. } => {
                        error
                    }
                };
                tracing::warn!(
                    error_type = ?details.error_type,
                    code = %details.code,
                    elapsed_ms,
                    "Query failed"
                );
                SqlExecutionResult::failed(details.message.clone(), details, elapsed_ms)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::SqlErrorType;
    use crate::models::{DatabaseSchema, DatabaseType};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` statements with `message`.
    struct FlakyAdapter {
        failures: u32,
        message: &'static str,
        transient: bool,
        calls: AtomicU32,
        delay: Duration,
    }

    impl FlakyAdapter {
        fn new(failures: u32, message: &'static str, transient: bool) -> Self {
            Self {
                failures,
                message,
                transient,
                calls: AtomicU32::new(0),
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl DatabaseAdapter for FlakyAdapter {
        async fn test_connection(&self) -> crate::Result<bool> {
            Ok(true)
        }

        async fn scan_schema(&self) -> crate::Result<DatabaseSchema> {
            Ok(DatabaseSchema::new(Vec::new(), Vec::new()))
        }

        async fn execute_query(&self, _sql: &str) -> crate::Result<QueryRows> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if n < self.failures {
                return Err(SqlPilotError::query_failed(self.message));
            }
            let mut row = serde_json::Map::new();
            row.insert("n".to_string(), serde_json::json!(1));
            Ok(QueryRows {
                columns: vec!["n".to_string()],
                rows: vec![row],
            })
        }

        fn is_transient_error(&self, error: &SqlPilotError) -> bool {
            self.transient && matches!(error, SqlPilotError::QueryExecution { .. })
        }

        fn quote_identifier(&self, name: &str) -> String {
            format!("\"{}\"", name)
        }

        fn database_type(&self) -> DatabaseType {
            DatabaseType::SQLite
        }

        fn connection_descriptor(&self) -> String {
            "test".to_string()
        }
    }

    fn executor() -> SqlExecutor {
        SqlExecutor::new(Arc::new(ConnectionHandler::default()), 3, Duration::from_secs(30))
    }

    #[tokio::test]
    async fn test_statement_error_is_classified_not_retried() {
        let adapter = FlakyAdapter::new(u32::MAX, "no such column: CustomerName", false);
        let result = executor().execute(&adapter, "SELECT CustomerName FROM Customers").await;

        assert!(!result.success);
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.error_message.as_deref(), Some("no such column: CustomerName"));

        let details = result.error_details.expect("classified");
        assert_eq!(details.error_type, SqlErrorType::InvalidColumn);
        assert!(details.is_recoverable);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_error_is_rerun() {
        let adapter = FlakyAdapter::new(2, "database is locked", true);
        let result = executor().execute(&adapter, "SELECT 1").await;

        assert!(result.success);
        assert_eq!(result.row_count(), 1);
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_timeout_is_classified() {
        let mut adapter = FlakyAdapter::new(0, "", false);
        adapter.delay = Duration::from_secs(60);

        let executor =
            SqlExecutor::new(Arc::new(ConnectionHandler::default()), 3, Duration::from_secs(5));
        let result = executor.execute(&adapter, "SELECT 1").await;

        assert!(!result.success);
        let details = result.error_details.expect("classified");
        assert_eq!(details.error_type, SqlErrorType::QueryTimeout);
        assert!(!details.is_recoverable);
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 1);
    }
}
