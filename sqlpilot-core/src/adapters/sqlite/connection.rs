//! SQLite connection handling.
//!
//! SQLite uses file-based databases, so each operation simply opens the file,
//! does its work and closes the handle again.
//!
//! # Connection Modes
//! - File-based: `sqlite:///path/to/database.db` or `sqlite://./relative.db`
//! - Bare paths ending in `.db`, `.sqlite` or `.sqlite3`
//!
//! # Security Features
//! - Opens databases in read-only mode by default
//! - Never creates missing database files

use super::{ConnectionConfig, SqliteAdapter};
use crate::Result;
use crate::error::SqlPilotError;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions, Connection};
use std::str::FromStr;

impl SqliteAdapter {
    /// Creates a new SQLite adapter from a connection string.
    ///
    /// No connection is opened until the first operation.
    ///
    /// # Errors
    /// Returns error if the connection string format is invalid.
    pub fn new(connection_string: &str, config: ConnectionConfig) -> Result<Self> {
        validate_sqlite_connection_string(connection_string)?;

        let normalized = normalize_connection_string(connection_string);
        let mut options = SqliteConnectOptions::from_str(&normalized).map_err(|e| {
            SqlPilotError::configuration(format!("Invalid SQLite connection string: {}", e))
        })?;

        options = options
            .read_only(config.read_only)
            .create_if_missing(false)
            .busy_timeout(config.connect_timeout);

        Ok(Self {
            options,
            config,
            connection_string: connection_string.to_string(),
        })
    }

    /// Gets the database file path.
    pub fn database_path(&self) -> Option<String> {
        let stripped = self
            .connection_string
            .strip_prefix("sqlite://")
            .or_else(|| self.connection_string.strip_prefix("sqlite:"))
            .unwrap_or(&self.connection_string);
        let path = stripped.split('?').next().unwrap_or(stripped);

        if path.is_empty() || path.contains(":memory:") {
            None
        } else {
            Some(path.to_string())
        }
    }

    /// Opens a fresh connection.
    pub(crate) async fn connect(&self) -> Result<SqliteConnection> {
        self.options
            .connect()
            .await
            .map_err(SqlPilotError::connection_failed)
    }
}

/// Closes a connection, logging rather than surfacing close failures.
pub(crate) async fn close(conn: SqliteConnection) {
    if let Err(e) = conn.close().await {
        tracing::debug!("Failed to close SQLite connection cleanly: {}", e);
    }
}

/// Validates SQLite connection string format.
///
/// # Errors
/// Returns error if connection string is invalid
pub fn validate_sqlite_connection_string(connection_string: &str) -> Result<()> {
    if connection_string.ends_with(".db")
        || connection_string.ends_with(".sqlite")
        || connection_string.ends_with(".sqlite3")
        || connection_string.starts_with("sqlite:")
    {
        return Ok(());
    }

    Err(SqlPilotError::configuration(
        "Invalid SQLite connection string format: expected sqlite:// URL or file path",
    ))
}

/// Normalizes connection string to SQLite URL format.
fn normalize_connection_string(connection_string: &str) -> String {
    if connection_string.starts_with("sqlite:") {
        return connection_string.to_string();
    }

    format!("sqlite://{}", connection_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_sqlite_connection_string() {
        assert!(validate_sqlite_connection_string("sqlite:///path/to/db.sqlite").is_ok());
        assert!(validate_sqlite_connection_string("sqlite://./test.db").is_ok());
        assert!(validate_sqlite_connection_string("/path/to/database.db").is_ok());
        assert!(validate_sqlite_connection_string("data.sqlite3").is_ok());

        assert!(validate_sqlite_connection_string("postgres://localhost/db").is_err());
        assert!(validate_sqlite_connection_string("invalid").is_err());
    }

    #[test]
    fn test_normalize_connection_string() {
        assert_eq!(normalize_connection_string("/tmp/a.db"), "sqlite:///tmp/a.db");
        assert_eq!(normalize_connection_string("sqlite://./a.db"), "sqlite://./a.db");
    }

    #[test]
    fn test_database_path() {
        let adapter =
            SqliteAdapter::new("sqlite:///tmp/shop.db?mode=ro", ConnectionConfig::default())
                .expect("valid connection string");
        assert_eq!(adapter.database_path().as_deref(), Some("/tmp/shop.db"));

        let adapter = SqliteAdapter::new("/tmp/shop.db", ConnectionConfig::default())
            .expect("valid path");
        assert_eq!(adapter.database_path().as_deref(), Some("/tmp/shop.db"));
    }
}
