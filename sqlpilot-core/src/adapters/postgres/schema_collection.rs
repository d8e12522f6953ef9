//! PostgreSQL schema collection implementation.
//!
//! Tables and columns come from `information_schema`; primary and foreign
//! keys come from `pg_constraint`. Each query covers every user schema at
//! once, so a scan costs four round-trips regardless of table count.

use crate::Result;
use crate::error::SqlPilotError;
use crate::models::{ColumnInfo, DatabaseSchema, RelationshipInfo, TableInfo};
use sqlx::Row;
use sqlx::postgres::PgConnection;
use std::collections::HashMap;

/// Maps privilege failures to `InsufficientPrivileges`, everything else to a scan error.
fn scan_error(context: &str, e: sqlx::Error) -> SqlPilotError {
    match &e {
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("42501") => {
            SqlPilotError::insufficient_privileges(format!("{} - insufficient privileges", context))
        }
        _ => SqlPilotError::schema_failed(context.to_string(), e),
    }
}

/// Main entry point for schema collection.
pub(super) async fn collect_schema(conn: &mut PgConnection) -> Result<DatabaseSchema> {
    let start_time = std::time::Instant::now();

    let table_rows = sqlx::query(
        r#"
            SELECT t.table_schema::text AS table_schema, t.table_name::text AS table_name
            FROM information_schema.tables t
            WHERE t.table_type IN ('BASE TABLE', 'VIEW')
            AND t.table_schema NOT IN ('information_schema', 'pg_catalog', 'pg_toast')
            AND has_table_privilege(quote_ident(t.table_schema) || '.' || quote_ident(t.table_name), 'SELECT')
            ORDER BY t.table_schema, t.table_name
        "#,
    )
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| scan_error("Cannot access information_schema.tables", e))?;

    let mut tables: Vec<TableInfo> = Vec::with_capacity(table_rows.len());
    let mut index: HashMap<(String, String), usize> = HashMap::new();
    for row in &table_rows {
        let schema: String = row
            .try_get("table_schema")
            .map_err(|e| SqlPilotError::schema_failed("Failed to parse table schema", e))?;
        let name: String = row
            .try_get("table_name")
            .map_err(|e| SqlPilotError::schema_failed("Failed to parse table name", e))?;
        index.insert((schema.clone(), name.clone()), tables.len());
        tables.push(TableInfo::new(name, Some(schema)));
    }

    let column_rows = sqlx::query(
        r#"
            SELECT
                c.table_schema::text AS table_schema,
                c.table_name::text AS table_name,
                c.column_name::text AS column_name,
                c.data_type::text AS data_type,
                c.is_nullable::text AS is_nullable
            FROM information_schema.columns c
            WHERE c.table_schema NOT IN ('information_schema', 'pg_catalog', 'pg_toast')
            ORDER BY c.table_schema, c.table_name, c.ordinal_position
        "#,
    )
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| scan_error("Cannot access information_schema.columns", e))?;

    for row in &column_rows {
        let schema: String = row.try_get("table_schema").unwrap_or_default();
        let table: String = row.try_get("table_name").unwrap_or_default();
        let Some(&position) = index.get(&(schema, table)) else {
            continue;
        };

        let name: String = row.try_get("column_name").unwrap_or_default();
        let data_type: String = row.try_get("data_type").unwrap_or_default();
        let is_nullable: String = row.try_get("is_nullable").unwrap_or_default();
        tables[position]
            .columns
            .push(ColumnInfo::new(name, data_type).nullable(is_nullable == "YES"));
    }

    let pk_rows = sqlx::query(
        r#"
            SELECT
                ns.nspname::text AS table_schema,
                cl.relname::text AS table_name,
                a.attname::text AS column_name
            FROM pg_constraint con
            JOIN pg_class cl ON con.conrelid = cl.oid
            JOIN pg_namespace ns ON cl.relnamespace = ns.oid
            JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = ANY(con.conkey)
            WHERE con.contype = 'p'
            ORDER BY ns.nspname, cl.relname, array_position(con.conkey, a.attnum)
        "#,
    )
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| scan_error("Failed to collect primary keys", e))?;

    for row in &pk_rows {
        let schema: String = row.try_get("table_schema").unwrap_or_default();
        let table: String = row.try_get("table_name").unwrap_or_default();
        if let Some(&position) = index.get(&(schema, table)) {
            let column: String = row.try_get("column_name").unwrap_or_default();
            tables[position].primary_keys.push(column);
        }
    }

    let fk_rows = sqlx::query(
        r#"
            SELECT
                cl.relname::text AS table_name,
                a.attname::text AS column_name,
                fcl.relname::text AS referenced_table_name,
                fa.attname::text AS referenced_column_name
            FROM pg_constraint con
            JOIN pg_class cl ON con.conrelid = cl.oid
            JOIN pg_namespace ns ON cl.relnamespace = ns.oid
            JOIN pg_class fcl ON con.confrelid = fcl.oid
            JOIN pg_attribute a ON a.attrelid = con.conrelid
            JOIN pg_attribute fa ON fa.attrelid = con.confrelid
            WHERE con.contype = 'f'
            AND ns.nspname NOT IN ('information_schema', 'pg_catalog', 'pg_toast')
            AND a.attnum = ANY(con.conkey)
            AND fa.attnum = ANY(con.confkey)
            AND array_position(con.conkey, a.attnum) = array_position(con.confkey, fa.attnum)
            ORDER BY con.conname, array_position(con.conkey, a.attnum)
        "#,
    )
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| scan_error("Failed to collect foreign keys", e))?;

    let relationships: Vec<RelationshipInfo> = fk_rows
        .iter()
        .map(|row| {
            RelationshipInfo::new(
                row.try_get::<String, _>("table_name").unwrap_or_default(),
                row.try_get::<String, _>("column_name").unwrap_or_default(),
                row.try_get::<String, _>("referenced_table_name")
                    .unwrap_or_default(),
                row.try_get::<String, _>("referenced_column_name")
                    .unwrap_or_default(),
            )
        })
        .collect();

    tracing::info!(
        "PostgreSQL schema scan completed in {:.2}s - found {} tables, {} relationships",
        start_time.elapsed().as_secs_f64(),
        tables.len(),
        relationships.len()
    );

    Ok(DatabaseSchema::new(tables, relationships))
}
