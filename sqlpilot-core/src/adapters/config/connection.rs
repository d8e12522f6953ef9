//! Database connection configuration.
//!
//! This module provides the `ConnectionConfig` struct describing how the
//! adapters connect, with read-only defaults and descriptor parsing.

use crate::error::SqlPilotError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for database connections.
///
/// # Security
/// This struct intentionally does NOT store passwords or credentials.
/// Credentials stay in the connection string, which is never logged.
///
/// # Example
/// ```rust
/// use sqlpilot_core::adapters::ConnectionConfig;
///
/// let config = ConnectionConfig::from_connection_string("postgres://app:pw@db.internal:5432/shop")
///     .unwrap();
/// assert_eq!(config.host, "db.internal");
/// assert_eq!(config.database.as_deref(), Some("shop"));
/// assert!(!config.to_string().contains("pw"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Database host address (file path for SQLite)
    pub host: String,
    /// Optional port number
    pub port: Option<u16>,
    /// Optional database or catalog name
    pub database: Option<String>,
    /// Optional username (password handled separately)
    pub username: Option<String>,
    /// Connection timeout duration
    pub connect_timeout: Duration,
    /// Per-statement command timeout
    pub query_timeout: Duration,
    /// Whether to enforce read-only sessions where the engine supports it
    pub read_only: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: None,
            database: None,
            username: None,
            connect_timeout: Duration::from_secs(30),
            query_timeout: Duration::from_secs(30),
            read_only: true,
        }
    }
}

impl std::fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ConnectionConfig({}{}{})",
            self.host,
            self.port.map_or_else(String::new, |p| format!(":{}", p)),
            self.database
                .as_ref()
                .map_or_else(String::new, |db| format!("/{}", db))
        )
        // Intentionally omit username and never include credentials
    }
}

impl ConnectionConfig {
    /// Validates connection configuration parameters.
    ///
    /// # Errors
    /// Returns error if configuration values are invalid or unsafe
    pub fn validate(&self) -> crate::Result<()> {
        if self.host.is_empty() {
            return Err(SqlPilotError::configuration("host cannot be empty"));
        }

        if self.port == Some(0) {
            return Err(SqlPilotError::configuration("port must be greater than 0"));
        }

        if self.connect_timeout.is_zero() {
            return Err(SqlPilotError::configuration(
                "connect_timeout must be greater than 0",
            ));
        }

        if self.query_timeout.is_zero() {
            return Err(SqlPilotError::configuration(
                "query_timeout must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Creates a new connection config with safe defaults.
    pub fn new(host: String) -> Self {
        Self {
            host,
            ..Default::default()
        }
    }

    /// Parses host, port, database and user out of a connection descriptor.
    ///
    /// Accepts URLs (`postgres://`, `mysql://`, `sqlite:`) and ADO-style
    /// `Key=Value;` strings (`Server=`, `Database=`, `Initial Catalog=`).
    /// The password is never retained.
    ///
    /// # Errors
    /// Returns a configuration error when no database name can be found.
    pub fn from_connection_string(connection_string: &str) -> crate::Result<Self> {
        let trimmed = connection_string.trim();

        if let Some(path) = trimmed
            .strip_prefix("sqlite://")
            .or_else(|| trimmed.strip_prefix("sqlite:"))
        {
            let path = path.split('?').next().unwrap_or(path);
            let stem = std::path::Path::new(path)
                .file_stem()
                .and_then(|s| s.to_str())
                .filter(|s| !s.is_empty() && *s != ":memory:")
                .ok_or_else(|| SqlPilotError::configuration("SQLite path has no file name"))?;
            return Ok(Self::new(path.to_string()).with_database(stem.to_string()));
        }

        if trimmed.contains("://") {
            let url = url::Url::parse(trimmed)
                .map_err(|e| SqlPilotError::configuration(format!("Invalid connection URL: {}", e)))?;
            let database = url
                .path()
                .trim_start_matches('/')
                .split('/')
                .next()
                .filter(|s| !s.is_empty())
                .ok_or_else(|| SqlPilotError::configuration("Connection URL names no database"))?;

            let mut config = Self::new(url.host_str().unwrap_or("localhost").to_string())
                .with_database(database.to_string());
            if let Some(port) = url.port() {
                config = config.with_port(port);
            }
            if !url.username().is_empty() {
                config = config.with_username(url.username().to_string());
            }
            return Ok(config);
        }

        let mut config = Self::default();
        for pair in trimmed.split(';') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            let value = value.trim().to_string();
            match key.trim().to_lowercase().as_str() {
                "server" | "data source" | "host" => {
                    let (host, port) = match value.split_once(',') {
                        Some((host, port)) => (host.to_string(), port.trim().parse().ok()),
                        None => (value.clone(), None),
                    };
                    config.host = host;
                    config.port = port;
                }
                "database" | "initial catalog" => config.database = Some(value),
                "user id" | "uid" | "user" => config.username = Some(value),
                _ => {}
            }
        }

        if config.database.as_deref().is_none_or(str::is_empty) {
            return Err(SqlPilotError::configuration(
                "Connection string names no database",
            ));
        }
        Ok(config)
    }

    /// Builder method to set port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Builder method to set database.
    pub fn with_database(mut self, database: String) -> Self {
        self.database = Some(database);
        self
    }

    /// Builder method to set username.
    pub fn with_username(mut self, username: String) -> Self {
        self.username = Some(username);
        self
    }

    /// Builder method to set the per-statement timeout.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }
}
