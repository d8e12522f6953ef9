//! SQLite schema collection implementation.
//!
//! # SQLite System Tables
//! - `sqlite_master`: Contains schema definitions for all database objects
//! - `PRAGMA table_info()`: Returns column information for a table
//! - `PRAGMA foreign_key_list()`: Returns foreign key information

use crate::Result;
use crate::error::SqlPilotError;
use crate::models::{ColumnInfo, DatabaseSchema, RelationshipInfo, TableInfo};
use sqlx::Row;
use sqlx::sqlite::SqliteConnection;

/// Main entry point for schema collection.
pub(crate) async fn collect_schema(conn: &mut SqliteConnection) -> Result<DatabaseSchema> {
    let start_time = std::time::Instant::now();

    let table_rows = sqlx::query(
        r#"
        SELECT name
        FROM sqlite_master
        WHERE type = 'table'
        AND name NOT LIKE 'sqlite_%'
        ORDER BY name
    "#,
    )
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| SqlPilotError::schema_failed("Failed to enumerate tables", e))?;

    let mut tables = Vec::with_capacity(table_rows.len());
    let mut relationships = Vec::new();

    for row in &table_rows {
        let table_name: String = row
            .try_get("name")
            .map_err(|e| SqlPilotError::schema_failed("Failed to parse table name", e))?;

        let (columns, primary_keys) = collect_table_columns(conn, &table_name).await?;
        relationships.extend(collect_table_foreign_keys(conn, &table_name).await?);

        tracing::debug!(
            "Collected table '{}' with {} columns",
            table_name,
            columns.len()
        );

        tables.push(
            TableInfo::new(table_name, None)
                .with_columns(columns)
                .with_primary_keys(primary_keys),
        );
    }

    tracing::info!(
        "SQLite schema scan completed in {:.2}s - found {} tables, {} relationships",
        start_time.elapsed().as_secs_f64(),
        tables.len(),
        relationships.len()
    );

    Ok(DatabaseSchema::new(tables, relationships))
}

/// Collects column metadata and primary-key names for a table.
async fn collect_table_columns(
    conn: &mut SqliteConnection,
    table_name: &str,
) -> Result<(Vec<ColumnInfo>, Vec<String>)> {
    let columns_query = format!("PRAGMA table_info('{}')", table_name.replace('\'', "''"));

    let column_rows = sqlx::query(&columns_query)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| {
            SqlPilotError::schema_failed(
                format!("Failed to collect columns for table '{}'", table_name),
                e,
            )
        })?;

    let mut columns = Vec::with_capacity(column_rows.len());
    // (pk position, name) so composite keys keep their declared order
    let mut primary_keys: Vec<(i32, String)> = Vec::new();

    for row in &column_rows {
        let name: String = row.try_get("name").unwrap_or_default();
        let data_type: String = row.try_get("type").unwrap_or_default();
        let notnull: i32 = row.try_get("notnull").unwrap_or(0);
        let pk: i32 = row.try_get("pk").unwrap_or(0);

        if pk > 0 {
            primary_keys.push((pk, name.clone()));
        }

        // PRIMARY KEY columns are implicitly NOT NULL
        columns.push(ColumnInfo::new(name, data_type).nullable(notnull == 0 && pk == 0));
    }

    primary_keys.sort_by_key(|(position, _)| *position);
    Ok((
        columns,
        primary_keys.into_iter().map(|(_, name)| name).collect(),
    ))
}

/// Collects foreign keys for a table as relationships.
async fn collect_table_foreign_keys(
    conn: &mut SqliteConnection,
    table_name: &str,
) -> Result<Vec<RelationshipInfo>> {
    let fk_query = format!(
        "PRAGMA foreign_key_list('{}')",
        table_name.replace('\'', "''")
    );

    let fk_rows = sqlx::query(&fk_query)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| {
            SqlPilotError::schema_failed(
                format!("Failed to collect foreign keys for table '{}'", table_name),
                e,
            )
        })?;

    let mut relationships = Vec::with_capacity(fk_rows.len());
    for row in &fk_rows {
        let ref_table: String = row.try_get("table").unwrap_or_default();
        let from_col: String = row.try_get("from").unwrap_or_default();
        // `to` is NULL when the reference targets the parent's primary key implicitly
        let to_col: Option<String> = row.try_get("to").unwrap_or(None);

        relationships.push(RelationshipInfo::new(
            table_name,
            from_col,
            ref_table,
            to_col.unwrap_or_default(),
        ));
    }

    Ok(relationships)
}
