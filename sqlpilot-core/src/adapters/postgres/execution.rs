//! PostgreSQL statement execution.
//!
//! Rows are converted server-side with `row_to_json`, so every column type
//! (numeric, arrays, json) arrives as a JSON value.

use crate::Result;
use crate::adapters::map_execution_error;
use crate::models::QueryRows;
use serde_json::Value as JsonValue;
use sqlx::postgres::PgConnection;

/// Wraps a statement so each row comes back as one JSON object.
pub(super) fn wrap_statement(sql: &str) -> String {
    let inner = sql.trim().trim_end_matches(';');
    format!("SELECT row_to_json(q) AS row_data FROM ({}) q", inner)
}

/// Runs one statement and returns its rows.
pub(super) async fn execute(conn: &mut PgConnection, sql: &str) -> Result<QueryRows> {
    let wrapped = wrap_statement(sql);
    let values: Vec<JsonValue> = sqlx::query_scalar(&wrapped)
        .fetch_all(&mut *conn)
        .await
        .map_err(map_execution_error)?;

    let rows: Vec<serde_json::Map<String, JsonValue>> = values
        .into_iter()
        .filter_map(|value| match value {
            JsonValue::Object(map) => Some(map),
            _ => None,
        })
        .collect();

    let columns = rows
        .first()
        .map(|row| row.keys().cloned().collect())
        .unwrap_or_default();

    Ok(QueryRows { columns, rows })
}
