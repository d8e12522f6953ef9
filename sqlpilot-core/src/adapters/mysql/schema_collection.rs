//! MySQL schema collection implementation.
//!
//! Scans the connection's current database through INFORMATION_SCHEMA.

use crate::Result;
use crate::error::SqlPilotError;
use crate::models::{ColumnInfo, DatabaseSchema, RelationshipInfo, TableInfo};
use sqlx::Row;
use sqlx::mysql::MySqlConnection;
use std::collections::HashMap;

/// Main entry point for schema collection.
pub(super) async fn collect_schema(conn: &mut MySqlConnection) -> Result<DatabaseSchema> {
    let start_time = std::time::Instant::now();

    let db_name: Option<String> = sqlx::query_scalar("SELECT CAST(DATABASE() AS CHAR)")
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| SqlPilotError::schema_failed("Failed to query current database", e))?;
    let db_name = db_name
        .ok_or_else(|| SqlPilotError::configuration("MySQL connection URL names no database"))?;

    let table_rows = sqlx::query(
        r#"
        SELECT CAST(TABLE_NAME AS CHAR) as TABLE_NAME
        FROM INFORMATION_SCHEMA.TABLES
        WHERE TABLE_SCHEMA = ?
        AND TABLE_TYPE IN ('BASE TABLE', 'VIEW')
        ORDER BY TABLE_NAME
    "#,
    )
    .bind(&db_name)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| SqlPilotError::schema_failed("Failed to enumerate tables", e))?;

    let mut tables: Vec<TableInfo> = Vec::with_capacity(table_rows.len());
    let mut index: HashMap<String, usize> = HashMap::new();
    for row in &table_rows {
        let name: String = row
            .try_get("TABLE_NAME")
            .map_err(|e| SqlPilotError::schema_failed("Failed to parse table name", e))?;
        index.insert(name.clone(), tables.len());
        tables.push(TableInfo::new(name, None));
    }

    let column_rows = sqlx::query(
        r#"
        SELECT
            CAST(c.TABLE_NAME AS CHAR) as TABLE_NAME,
            CAST(c.COLUMN_NAME AS CHAR) as COLUMN_NAME,
            CAST(c.COLUMN_TYPE AS CHAR) as COLUMN_TYPE,
            CAST(c.IS_NULLABLE AS CHAR) as IS_NULLABLE,
            CAST(c.COLUMN_KEY AS CHAR) as COLUMN_KEY
        FROM INFORMATION_SCHEMA.COLUMNS c
        WHERE c.TABLE_SCHEMA = ?
        ORDER BY c.TABLE_NAME, c.ORDINAL_POSITION
    "#,
    )
    .bind(&db_name)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| SqlPilotError::schema_failed("Failed to collect columns", e))?;

    for row in &column_rows {
        let table: String = row.try_get("TABLE_NAME").unwrap_or_default();
        let Some(&position) = index.get(&table) else {
            continue;
        };

        let name: String = row.try_get("COLUMN_NAME").unwrap_or_default();
        let data_type: String = row.try_get("COLUMN_TYPE").unwrap_or_default();
        let is_nullable: String = row.try_get("IS_NULLABLE").unwrap_or_default();
        let column_key: String = row.try_get("COLUMN_KEY").unwrap_or_default();

        if column_key == "PRI" {
            tables[position].primary_keys.push(name.clone());
        }
        tables[position]
            .columns
            .push(ColumnInfo::new(name, data_type).nullable(is_nullable == "YES"));
    }

    let fk_rows = sqlx::query(
        r#"
        SELECT
            CAST(TABLE_NAME AS CHAR) as TABLE_NAME,
            CAST(COLUMN_NAME AS CHAR) as COLUMN_NAME,
            CAST(REFERENCED_TABLE_NAME AS CHAR) as REFERENCED_TABLE_NAME,
            CAST(REFERENCED_COLUMN_NAME AS CHAR) as REFERENCED_COLUMN_NAME
        FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
        WHERE TABLE_SCHEMA = ?
        AND REFERENCED_TABLE_NAME IS NOT NULL
        ORDER BY TABLE_NAME, CONSTRAINT_NAME, ORDINAL_POSITION
    "#,
    )
    .bind(&db_name)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| SqlPilotError::schema_failed("Failed to collect foreign keys", e))?;

    let relationships: Vec<RelationshipInfo> = fk_rows
        .iter()
        .map(|row| {
            RelationshipInfo::new(
                row.try_get::<String, _>("TABLE_NAME").unwrap_or_default(),
                row.try_get::<String, _>("COLUMN_NAME").unwrap_or_default(),
                row.try_get::<String, _>("REFERENCED_TABLE_NAME")
                    .unwrap_or_default(),
                row.try_get::<String, _>("REFERENCED_COLUMN_NAME")
                    .unwrap_or_default(),
            )
        })
        .collect();

    tracing::info!(
        "MySQL schema scan of '{}' completed in {:.2}s - found {} tables, {} relationships",
        db_name,
        start_time.elapsed().as_secs_f64(),
        tables.len(),
        relationships.len()
    );

    Ok(DatabaseSchema::new(tables, relationships))
}
