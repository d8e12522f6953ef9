//! Unit tests for SQLite adapter.
//!
//! These tests verify the SQLite adapter functionality that needs no file:
//! - Identifier quoting
//! - Transient-error detection
//! - Connection descriptor redaction

use crate::adapters::{ConnectionConfig, DatabaseAdapter};
use crate::error::SqlPilotError;
use crate::models::DatabaseType;

use super::SqliteAdapter;

fn adapter() -> SqliteAdapter {
    SqliteAdapter::new("sqlite:///tmp/sqlpilot-unit.db", ConnectionConfig::default())
        .expect("valid connection string")
}

// =============================================================================
// Dialect Tests
// =============================================================================

#[test]
fn test_quote_identifier_escapes_quotes() {
    let adapter = adapter();
    assert_eq!(adapter.quote_identifier("Customers"), "\"Customers\"");
    assert_eq!(adapter.quote_identifier("odd\"name"), "\"odd\"\"name\"");
}

#[test]
fn test_database_type() {
    assert_eq!(adapter().database_type(), DatabaseType::SQLite);
}

#[test]
fn test_connection_descriptor() {
    assert_eq!(adapter().connection_descriptor(), "sqlite:/tmp/sqlpilot-unit.db");
}

// =============================================================================
// Transient Error Tests
// =============================================================================

#[test]
fn test_locked_database_is_transient() {
    let adapter = adapter();

    let locked = SqlPilotError::query_failed_with_code("database is locked", Some("5".to_string()));
    assert!(adapter.is_transient_error(&locked));

    // SQLITE_BUSY_SNAPSHOT extended code
    let busy = SqlPilotError::query_failed_with_code("busy snapshot", Some("517".to_string()));
    assert!(adapter.is_transient_error(&busy));
}

#[test]
fn test_semantic_errors_are_not_transient() {
    let adapter = adapter();

    let missing = SqlPilotError::query_failed_with_code("no such column: Foo", Some("1".to_string()));
    assert!(!adapter.is_transient_error(&missing));

    assert!(!adapter.is_transient_error(&SqlPilotError::configuration("database is locked")));
}
