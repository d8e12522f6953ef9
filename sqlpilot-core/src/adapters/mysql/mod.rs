//! MySQL database adapter with schema scanning and statement execution.
//!
//! # Module Structure
//! - `schema_collection`: Table, column and key collection via INFORMATION_SCHEMA
//! - `execution`: Statement execution and row conversion
//!
//! # Security Guarantees
//! - Sessions are opened with `SET SESSION TRANSACTION READ ONLY`
//! - `max_execution_time` bounds every SELECT server-side
//! - Connection strings are sanitized in error messages

mod execution;
mod schema_collection;

#[cfg(test)]
mod tests;

use super::{ConnectionConfig, DatabaseAdapter, execution_error_parts};
use crate::Result;
use crate::error::{SqlPilotError, redact_database_url};
use crate::models::{DatabaseSchema, DatabaseType, QueryRows};
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{ConnectOptions, Connection, Executor};
use std::str::FromStr;

/// Engine error numbers worth re-running: lock wait timeout, deadlock,
/// server gone away, lost connection.
const TRANSIENT_ERROR_CODES: [&str; 4] = ["1205", "1213", "2006", "2013"];

/// MySQL database adapter.
pub struct MySqlAdapter {
    options: MySqlConnectOptions,
    pub config: ConnectionConfig,
    descriptor: String,
}

impl std::fmt::Debug for MySqlAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlAdapter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl MySqlAdapter {
    /// Creates a new MySQL adapter.
    ///
    /// No connection is opened until the first operation.
    ///
    /// # Errors
    /// Returns error if the connection string is not a valid MySQL URL.
    pub fn new(connection_string: &str, config: ConnectionConfig) -> Result<Self> {
        let options = MySqlConnectOptions::from_str(connection_string).map_err(|e| {
            SqlPilotError::configuration(format!(
                "Invalid MySQL connection string ({}): {}",
                redact_database_url(connection_string),
                e
            ))
        })?;

        Ok(Self {
            options,
            config,
            descriptor: redact_database_url(connection_string),
        })
    }

    /// Opens a fresh connection and applies session safety settings.
    async fn connect(&self) -> Result<MySqlConnection> {
        let mut conn = tokio::time::timeout(self.config.connect_timeout, self.options.connect())
            .await
            .map_err(|_| {
                SqlPilotError::connection_failed(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "connection timed out",
                ))
            })?
            .map_err(SqlPilotError::connection_failed)?;

        let timeout_ms = self.config.query_timeout.as_millis().max(1);
        conn.execute(format!("SET SESSION max_execution_time = {}", timeout_ms).as_str())
            .await
            .map_err(SqlPilotError::connection_failed)?;

        if self.config.read_only {
            conn.execute("SET SESSION TRANSACTION READ ONLY")
                .await
                .map_err(SqlPilotError::connection_failed)?;
        }

        Ok(conn)
    }
}

async fn close(conn: MySqlConnection) {
    if let Err(e) = conn.close().await {
        tracing::debug!("Failed to close MySQL connection cleanly: {}", e);
    }
}

#[async_trait]
impl DatabaseAdapter for MySqlAdapter {
    async fn test_connection(&self) -> Result<bool> {
        let mut conn = self.connect().await?;
        let connectivity_result: std::result::Result<i64, _> =
            sqlx::query_scalar("SELECT 1").fetch_one(&mut conn).await;
        close(conn).await;

        Ok(connectivity_result.map_err(SqlPilotError::connection_failed)? == 1)
    }

    async fn scan_schema(&self) -> Result<DatabaseSchema> {
        let mut conn = self.connect().await?;
        let result = schema_collection::collect_schema(&mut conn).await;
        close(conn).await;
        result
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryRows> {
        let mut conn = self.connect().await?;
        let result = execution::execute(&mut conn, sql).await;
        close(conn).await;
        result
    }

    fn is_transient_error(&self, error: &SqlPilotError) -> bool {
        let Some((code, message)) = execution_error_parts(error) else {
            return false;
        };

        code.is_some_and(|c| TRANSIENT_ERROR_CODES.contains(&c))
            || message.contains("deadlock found")
            || message.contains("lock wait timeout")
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::MySQL
    }

    fn connection_descriptor(&self) -> String {
        self.descriptor.clone()
    }
}
