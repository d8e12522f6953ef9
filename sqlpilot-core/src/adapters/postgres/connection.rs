//! PostgreSQL connection handling.
//!
//! # Security Features
//! - Validates connection string format
//! - Applies session safety settings to every connection
//! - Never retains the password outside the connect options

use super::{ConnectionConfig, PostgresAdapter};
use crate::Result;
use crate::error::{SqlPilotError, redact_database_url};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{ConnectOptions, Connection, Executor};
use std::str::FromStr;
use url::Url;

impl PostgresAdapter {
    /// Creates a new PostgreSQL adapter.
    ///
    /// No connection is opened until the first operation.
    ///
    /// # Errors
    /// Returns error if the connection string is not a valid PostgreSQL URL.
    pub fn new(connection_string: &str, config: ConnectionConfig) -> Result<Self> {
        Self::validate_connection_string(connection_string)?;

        let options = PgConnectOptions::from_str(connection_string).map_err(|e| {
            SqlPilotError::configuration(format!(
                "Invalid PostgreSQL connection string ({}): {}",
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

    /// Validates PostgreSQL connection string format.
    pub(crate) fn validate_connection_string(connection_string: &str) -> Result<()> {
        let url = Url::parse(connection_string)
            .map_err(|_| SqlPilotError::configuration("Invalid PostgreSQL connection URL"))?;

        if !matches!(url.scheme(), "postgres" | "postgresql") {
            return Err(SqlPilotError::configuration(
                "Connection string must use postgres:// or postgresql:// scheme",
            ));
        }

        if url.host_str().is_none_or(str::is_empty) {
            return Err(SqlPilotError::configuration(
                "PostgreSQL connection URL must include a host",
            ));
        }

        Ok(())
    }

    /// Opens a fresh connection and applies session safety settings.
    pub(crate) async fn connect(&self) -> Result<PgConnection> {
        let connect = self.options.connect();
        let mut conn = tokio::time::timeout(self.config.connect_timeout, connect)
            .await
            .map_err(|_| {
                SqlPilotError::connection_failed(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "connection timed out",
                ))
            })?
            .map_err(SqlPilotError::connection_failed)?;

        let query_timeout_secs = self.config.query_timeout.as_secs().max(1);
        conn.execute(format!("SET statement_timeout = '{}s'", query_timeout_secs).as_str())
            .await
            .map_err(SqlPilotError::connection_failed)?;

        if self.config.read_only {
            conn.execute("SET default_transaction_read_only = on")
                .await
                .map_err(SqlPilotError::connection_failed)?;
        }

        Ok(conn)
    }
}

/// Closes a connection, logging rather than surfacing close failures.
pub(super) async fn close(conn: PgConnection) {
    if let Err(e) = conn.close().await {
        tracing::debug!("Failed to close PostgreSQL connection cleanly: {}", e);
    }
}
