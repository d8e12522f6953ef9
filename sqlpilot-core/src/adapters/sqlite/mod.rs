//! SQLite database adapter with schema scanning and statement execution.
//!
//! # Module Structure
//! - `connection`: Connection string handling and per-call connections
//! - `schema_collection`: Table, column and foreign-key scanning via sqlite_master
//! - `execution`: Statement execution and row conversion
//!
//! # SQLite-Specific Features
//! - Uses `sqlite_master` for schema introspection
//! - Uses PRAGMA commands for column and foreign-key metadata
//! - Opens the file read-only by default
//!
//! # Security Guarantees
//! - All operations are read-only (SELECT/PRAGMA only)
//! - No network access required

pub mod connection;
pub mod execution;
pub mod schema_collection;

#[cfg(test)]
mod tests;

use super::{ConnectionConfig, DatabaseAdapter, execution_error_parts};
use crate::Result;
use crate::error::SqlPilotError;
use crate::models::{DatabaseSchema, DatabaseType, QueryRows};
use async_trait::async_trait;
use sqlx::sqlite::SqliteConnectOptions;

/// SQLite database adapter.
///
/// Holds connect options only; every operation opens its own connection and
/// closes it before returning.
pub struct SqliteAdapter {
    /// Parsed connect options
    options: SqliteConnectOptions,
    /// Connection configuration
    pub config: ConnectionConfig,
    /// Original connection string (never logged)
    connection_string: String,
}

impl std::fmt::Debug for SqliteAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteAdapter")
            .field("config", &self.config)
            // Note: connection_string is intentionally omitted
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DatabaseAdapter for SqliteAdapter {
    async fn test_connection(&self) -> Result<bool> {
        let mut conn = self.connect().await?;

        let connectivity_result: i32 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&mut conn)
            .await
            .map_err(SqlPilotError::connection_failed)?;

        // sqlite_master must be readable for schema scans
        let schema_access: std::result::Result<i64, _> =
            sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'")
                .fetch_one(&mut conn)
                .await;

        connection::close(conn).await;

        if let Err(e) = schema_access {
            return Err(SqlPilotError::insufficient_privileges(format!(
                "Cannot access sqlite_master: {}",
                e
            )));
        }

        Ok(connectivity_result == 1)
    }

    async fn scan_schema(&self) -> Result<DatabaseSchema> {
        let mut conn = self.connect().await?;
        let result = schema_collection::collect_schema(&mut conn).await;
        connection::close(conn).await;
        result
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryRows> {
        let mut conn = self.connect().await?;
        let result = execution::execute(&mut conn, sql).await;
        connection::close(conn).await;
        result
    }

    fn is_transient_error(&self, error: &SqlPilotError) -> bool {
        let Some((code, message)) = execution_error_parts(error) else {
            return false;
        };

        // SQLITE_BUSY (5) and SQLITE_LOCKED (6), including extended codes
        let busy_code = code
            .and_then(|c| c.parse::<i32>().ok())
            .is_some_and(|c| matches!(c & 0xff, 5 | 6));

        busy_code || message.contains("database is locked") || message.contains("busy")
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::SQLite
    }

    fn connection_descriptor(&self) -> String {
        format!(
            "sqlite:{}",
            self.database_path().unwrap_or_else(|| ":memory:".to_string())
        )
    }
}
