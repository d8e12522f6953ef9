//! SQLite statement execution and row conversion.

use crate::Result;
use crate::adapters::map_execution_error;
use crate::models::QueryRows;
use serde_json::Value as JsonValue;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Column, Row};

/// Runs one statement and converts every row to a JSON object.
pub(crate) async fn execute(conn: &mut SqliteConnection, sql: &str) -> Result<QueryRows> {
    let rows = sqlx::query(sql)
        .fetch_all(&mut *conn)
        .await
        .map_err(map_execution_error)?;

    let columns = rows
        .first()
        .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default();

    Ok(QueryRows {
        columns,
        rows: rows.iter().map(row_to_json).collect(),
    })
}

fn row_to_json(row: &SqliteRow) -> serde_json::Map<String, JsonValue> {
    let mut map = serde_json::Map::new();
    for column in row.columns() {
        let value = extract_column_value(row, column.ordinal());
        map.insert(column.name().to_string(), value);
    }
    map
}

/// Extract a column value as a JSON value.
fn extract_column_value(row: &SqliteRow, index: usize) -> JsonValue {
    // SQLite is dynamically typed, so we need to try multiple types
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return v.map(JsonValue::String).unwrap_or(JsonValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return v
            .map(|n| JsonValue::Number(n.into()))
            .unwrap_or(JsonValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return v
            .and_then(serde_json::Number::from_f64)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
        return v.map(JsonValue::Bool).unwrap_or(JsonValue::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(index) {
        return v
            .map(|bytes| JsonValue::String(format!("<{} bytes>", bytes.len())))
            .unwrap_or(JsonValue::Null);
    }

    JsonValue::Null
}
