//! SQLite adapter integration tests against a database file.
//!
//! # Coverage
//! - Schema scan: tables, columns, primary and foreign keys
//! - Statement execution and JSON row conversion
//! - Read-only connections refuse writes
//! - Engine errors carry messages the analyzer classifies

#![cfg(feature = "sqlite")]

mod common;

use common::create_shop_database;
use sqlpilot_core::adapters::sqlite::SqliteAdapter;
use sqlpilot_core::{
    ConnectionConfig, DatabaseAdapter, DatabaseType, Result, SqlErrorAnalyzer, SqlErrorType,
    SqlPilotError,
};
use tempfile::TempDir;

async fn shop_adapter(dir: &TempDir) -> Result<SqliteAdapter> {
    let url = create_shop_database(dir.path()).await?;
    SqliteAdapter::new(&url, ConnectionConfig::default())
}

fn execution_message(error: &SqlPilotError) -> String {
    match error {
        SqlPilotError::QueryExecution { message, .. } => message.clone(),
        other => panic!("expected a query execution error, got {other:?}"),
    }
}

// =============================================================================
// Schema scanning
// =============================================================================

/// Tables come back sorted with key flags reconciled.
#[tokio::test]
async fn test_integration_scan_schema() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let adapter = shop_adapter(&dir).await?;

    assert!(adapter.test_connection().await?);
    assert_eq!(adapter.database_type(), DatabaseType::SQLite);

    let schema = adapter.scan_schema().await?;
    assert_eq!(schema.table_names(), vec!["Customers", "Orders", "Products"]);

    let customers = schema.table("customers").unwrap();
    assert_eq!(customers.primary_keys, vec!["Id".to_string()]);
    let id = customers.column("Id").unwrap();
    assert!(id.is_primary_key);
    assert_eq!(id.data_type, "INTEGER");
    assert!(!customers.column("Name").unwrap().is_nullable);
    assert!(customers.column("City").unwrap().is_nullable);

    assert_eq!(schema.relationships.len(), 1);
    let relationship = &schema.relationships[0];
    assert_eq!(relationship.from_table, "Orders");
    assert_eq!(relationship.from_column, "CustomerId");
    assert_eq!(relationship.to_table, "Customers");
    assert_eq!(relationship.to_column, "Id");
    assert!(schema.table("Orders").unwrap().column("CustomerId").unwrap().is_foreign_key);

    let neighbors: Vec<&str> = schema
        .neighbors_of("Orders")
        .into_iter()
        .map(|t| t.name.as_str())
        .collect();
    assert_eq!(neighbors, vec!["Customers"]);
    Ok(())
}

// =============================================================================
// Execution
// =============================================================================

/// Rows are converted to JSON objects keyed by column name.
#[tokio::test]
async fn test_integration_execute_query() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let adapter = shop_adapter(&dir).await?;

    let rows = adapter
        .execute_query("SELECT Id, Name, City FROM Customers ORDER BY Id")
        .await?;
    assert_eq!(rows.columns, vec!["Id", "Name", "City"]);
    assert_eq!(rows.rows.len(), 3);
    assert_eq!(rows.rows[0]["Id"], serde_json::json!(1));
    assert_eq!(rows.rows[0]["Name"], serde_json::json!("Alice"));

    let totals = adapter
        .execute_query("SELECT Total FROM Orders WHERE Id = 3")
        .await?;
    assert_eq!(totals.rows[0]["Total"], serde_json::json!(7.25));

    let empty = adapter
        .execute_query("SELECT Name FROM Customers WHERE City = 'Oslo'")
        .await?;
    assert!(empty.rows.is_empty());
    Ok(())
}

/// The default read-only connection rejects writes.
#[tokio::test]
async fn test_integration_read_only_rejects_writes() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let adapter = shop_adapter(&dir).await?;

    let error = adapter
        .execute_query("DELETE FROM Customers")
        .await
        .unwrap_err();
    assert!(execution_message(&error).to_lowercase().contains("readonly"));

    let rows = adapter.execute_query("SELECT COUNT(*) AS n FROM Customers").await?;
    assert_eq!(rows.rows[0]["n"], serde_json::json!(3));
    Ok(())
}

/// Engine messages classify into the schema-related error types.
#[tokio::test]
async fn test_integration_engine_errors_classify() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let adapter = shop_adapter(&dir).await?;
    let analyzer = SqlErrorAnalyzer::new();

    let sql = "SELECT CustomerName FROM Customers";
    let error = adapter.execute_query(sql).await.unwrap_err();
    let classified = analyzer.analyze_error(&execution_message(&error), sql);
    assert_eq!(classified.error_type, SqlErrorType::InvalidColumn);
    assert_eq!(classified.invalid_element.as_deref(), Some("CustomerName"));
    assert!(classified.is_recoverable);
    assert!(!adapter.is_transient_error(&error));

    let sql = "SELECT * FROM Invoices";
    let error = adapter.execute_query(sql).await.unwrap_err();
    let classified = analyzer.analyze_error(&execution_message(&error), sql);
    assert_eq!(classified.error_type, SqlErrorType::InvalidTable);

    let sql = "SELEC Name FROM Customers";
    let error = adapter.execute_query(sql).await.unwrap_err();
    let classified = analyzer.analyze_error(&execution_message(&error), sql);
    assert_eq!(classified.error_type, SqlErrorType::SyntaxError);
    Ok(())
}

/// Missing files are reported as connection failures.
#[tokio::test]
async fn test_integration_missing_file() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}", dir.path().join("absent.db").display());
    let adapter = SqliteAdapter::new(&url, ConnectionConfig::default())?;

    assert!(adapter.test_connection().await.is_err());
    Ok(())
}
