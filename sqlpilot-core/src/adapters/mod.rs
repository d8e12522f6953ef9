//! Database adapter trait and factory for schema scans and statement execution.
//!
//! This module defines the capability every database engine must provide to
//! the query pipeline: connectivity checks, schema introspection, read-only
//! statement execution and transient-error detection. The design emphasizes
//! object safety and security.
//!
//! # Module Structure
//! - `config`: Connection configuration and descriptor parsing
//! - Database-specific modules (postgres, mysql, sqlite)

use crate::Result;
use crate::error::SqlPilotError;
use crate::models::{DatabaseSchema, DatabaseType, QueryRows};
use async_trait::async_trait;
use std::sync::Arc;

// Configuration module
pub mod config;

pub use config::ConnectionConfig;

/// Main trait for database adapters with object-safe design.
///
/// # Security Guarantees
/// - Every statement runs on its own connection, closed before returning
/// - Credentials are never stored or logged
/// - Connection strings are sanitized in error messages
///
/// # Object Safety
/// This trait is object-safe, allowing for dynamic dispatch through
/// `Arc<dyn DatabaseAdapter>`.
#[async_trait]
pub trait DatabaseAdapter: Send + Sync {
    /// Tests the database connection without scanning the schema.
    ///
    /// # Errors
    /// Returns error if the connection cannot be opened.
    async fn test_connection(&self) -> Result<bool>;

    /// Scans table, column, key and relationship metadata.
    ///
    /// # Errors
    /// Returns error if:
    /// - Connection fails or times out
    /// - Insufficient privileges for catalog access
    async fn scan_schema(&self) -> Result<DatabaseSchema>;

    /// Runs one statement on a fresh connection and returns its rows.
    ///
    /// # Errors
    /// Returns [`SqlPilotError::QueryExecution`] carrying the raw engine
    /// message when the statement fails.
    async fn execute_query(&self, sql: &str) -> Result<QueryRows>;

    /// Whether a failure is a transient engine condition worth re-running.
    fn is_transient_error(&self, error: &SqlPilotError) -> bool;

    /// Quotes an identifier for this dialect.
    fn quote_identifier(&self, name: &str) -> String;

    /// Returns the database type this adapter handles.
    fn database_type(&self) -> DatabaseType;

    /// Credential-free description of the connection target.
    fn connection_descriptor(&self) -> String;
}

/// Factory function to create database adapters based on connection string.
///
/// # Arguments
/// * `connection_string` - Database connection URL (will be sanitized in errors)
/// * `config` - Timeouts and read-only settings
///
/// # Errors
/// Returns error if:
/// - Connection string format is invalid
/// - Database type is not supported
/// - Required features are not compiled in
pub async fn create_adapter(
    connection_string: &str,
    config: &ConnectionConfig,
) -> Result<Arc<dyn DatabaseAdapter>> {
    config.validate()?;
    let database_type = detect_database_type(connection_string)?;

    tracing::debug!(
        database_type = %database_type,
        target = %redact_database_url(connection_string),
        "Creating database adapter"
    );

    match database_type {
        #[cfg(feature = "postgresql")]
        DatabaseType::PostgreSQL => {
            let adapter = postgres::PostgresAdapter::new(connection_string, config.clone())?;
            Ok(Arc::new(adapter))
        }
        #[cfg(not(feature = "postgresql"))]
        DatabaseType::PostgreSQL => Err(SqlPilotError::unsupported_feature(
            "PostgreSQL adapter",
            "Compile with --features postgresql to enable PostgreSQL support",
        )),
        #[cfg(feature = "mysql")]
        DatabaseType::MySQL => {
            let adapter = mysql::MySqlAdapter::new(connection_string, config.clone())?;
            Ok(Arc::new(adapter))
        }
        #[cfg(not(feature = "mysql"))]
        DatabaseType::MySQL => Err(SqlPilotError::unsupported_feature(
            "MySQL adapter",
            "Compile with --features mysql to enable MySQL support",
        )),
        #[cfg(feature = "sqlite")]
        DatabaseType::SQLite => {
            let adapter = sqlite::SqliteAdapter::new(connection_string, config.clone())?;
            Ok(Arc::new(adapter))
        }
        #[cfg(not(feature = "sqlite"))]
        DatabaseType::SQLite => Err(SqlPilotError::unsupported_feature(
            "SQLite adapter",
            "Compile with --features sqlite to enable SQLite support",
        )),
        DatabaseType::SqlServer => Err(SqlPilotError::unsupported_feature(
            "Query execution",
            DatabaseType::SqlServer.to_string(),
        )),
    }
}

/// Safely redacts credentials from database connection URLs.
///
/// # Note
/// This function delegates to `crate::error::redact_database_url` for consistency.
/// Invalid URLs are fully redacted as "<redacted>" for security.
#[inline]
pub fn redact_database_url(url: &str) -> String {
    crate::error::redact_database_url(url)
}

/// Detects database type from connection string.
///
/// # Errors
/// Returns error if connection string format is unrecognized
pub fn detect_database_type(connection_string: &str) -> Result<DatabaseType> {
    let lower = connection_string.trim().to_lowercase();

    if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
        Ok(DatabaseType::PostgreSQL)
    } else if lower.starts_with("mysql://") || lower.starts_with("mariadb://") {
        Ok(DatabaseType::MySQL)
    } else if lower.starts_with("sqlite:")
        || lower.ends_with(".db")
        || lower.ends_with(".sqlite")
        || lower.ends_with(".sqlite3")
    {
        Ok(DatabaseType::SQLite)
    } else if lower.starts_with("mssql://")
        || lower.starts_with("sqlserver://")
        || lower.contains("initial catalog=")
        || (lower.contains("server=") && lower.contains("database="))
    {
        Ok(DatabaseType::SqlServer)
    } else {
        Err(SqlPilotError::configuration(
            "Unrecognized database connection string format",
        ))
    }
}

/// Maps an engine error into [`SqlPilotError::QueryExecution`], keeping the
/// raw message and the engine error code.
#[cfg(any(feature = "postgresql", feature = "mysql", feature = "sqlite"))]
pub(crate) fn map_execution_error(error: sqlx::Error) -> SqlPilotError {
    match error {
        sqlx::Error::Database(db_error) => SqlPilotError::query_failed_with_code(
            db_error.message(),
            db_error.code().map(|c| c.into_owned()),
        ),
        sqlx::Error::PoolTimedOut => SqlPilotError::query_failed("connection timed out"),
        sqlx::Error::Io(io) => SqlPilotError::query_failed(format!("network error: {}", io)),
        sqlx::Error::Tls(tls) => {
            SqlPilotError::query_failed(format!("connection TLS error: {}", tls))
        }
        other => SqlPilotError::query_failed(other.to_string()),
    }
}

/// Engine error code and lowercase message of an execution failure.
pub(crate) fn execution_error_parts(error: &SqlPilotError) -> Option<(Option<&str>, String)> {
    match error {
        SqlPilotError::QueryExecution { message, code } => {
            Some((code.as_deref(), message.to_lowercase()))
        }
        _ => None,
    }
}

// Database-specific adapter modules
#[cfg(feature = "postgresql")]
pub mod postgres;

#[cfg(feature = "mysql")]
pub mod mysql;

#[cfg(feature = "sqlite")]
pub mod sqlite;
