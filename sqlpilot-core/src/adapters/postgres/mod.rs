//! PostgreSQL database adapter with schema scanning and statement execution.
//!
//! # Module Structure
//! - `connection`: Per-call connections with session safety settings
//! - `schema_collection`: Table, column, primary-key and foreign-key collection
//! - `execution`: Statement execution through `row_to_json`
//!
//! # Security Guarantees
//! - Sessions are opened with `default_transaction_read_only = on`
//! - Connection strings are sanitized in error messages
//! - `statement_timeout` bounds every statement server-side

mod connection;
mod execution;
mod schema_collection;


use super::{ConnectionConfig, DatabaseAdapter, execution_error_parts};
use crate::Result;
use crate::error::SqlPilotError;
use crate::models::{DatabaseSchema, DatabaseType, QueryRows};
use async_trait::async_trait;
use sqlx::postgres::PgConnectOptions;

/// SQLSTATE codes worth re-running: serialization failure, deadlock,
/// too many connections, cannot connect now.
const TRANSIENT_SQLSTATES: [&str; 4] = ["40001", "40P01", "53300", "57P03"];

/// PostgreSQL database adapter.
pub struct PostgresAdapter {
    options: PgConnectOptions,
    pub config: ConnectionConfig,
    descriptor: String,
}

impl std::fmt::Debug for PostgresAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresAdapter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DatabaseAdapter for PostgresAdapter {
    async fn test_connection(&self) -> Result<bool> {
        let mut conn = self.connect().await?;

        let connectivity_result: std::result::Result<i32, _> =
            sqlx::query_scalar("SELECT 1").fetch_one(&mut conn).await;

        let schema_access: std::result::Result<bool, _> =
            sqlx::query_scalar("SELECT has_schema_privilege(current_schema(), 'USAGE')")
                .fetch_one(&mut conn)
                .await;

        connection::close(conn).await;

        let connectivity_result = connectivity_result.map_err(SqlPilotError::connection_failed)?;
        match schema_access {
            Ok(true) => Ok(connectivity_result == 1),
            Ok(false) => Err(SqlPilotError::insufficient_privileges(
                "USAGE on the current schema",
            )),
            Err(e) => Err(SqlPilotError::insufficient_privileges(format!(
                "Cannot check schema privileges: {}",
                e
            ))),
        }
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

        match code {
            // Class 08: connection exceptions
            Some(code) => TRANSIENT_SQLSTATES.contains(&code) || code.starts_with("08"),
            None => message.contains("deadlock detected"),
        }
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::PostgreSQL
    }

    fn connection_descriptor(&self) -> String {
        self.descriptor.clone()
    }
}
